use chrono::{DateTime, Days, Local, TimeZone, Utc};
use daybook_core::{Comment, Note};
use std::fmt;

/// Short timeline label: "just now", "N min ago", "today", "yesterday", or
/// the weekday name.
pub(crate) fn note_time<Tz: TimeZone>(timestamp: i64, now: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    let Some(at) = now.timezone().timestamp_millis_opt(timestamp).single() else {
        return "unknown".to_string();
    };
    if let Some(recent) = recent_label(&at, now) {
        return recent;
    }

    match day_label(&at, now) {
        Some(label) => label.to_string(),
        None => at.format("%A").to_string(),
    }
}

/// Comment label: recent comments are relative, today and yesterday carry the
/// clock time, anything older the full date.
pub(crate) fn comment_time<Tz: TimeZone>(at: &DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    let at = at.with_timezone(&now.timezone());
    if let Some(recent) = recent_label(&at, now) {
        return recent;
    }

    match day_label(&at, now) {
        Some(label) => format!("{label} {}", at.format("%H:%M")),
        None => at.format("%Y-%m-%d %H:%M").to_string(),
    }
}

pub(crate) fn note_line(note: &Note, now: &DateTime<Local>) -> String {
    let mut line = format!(
        "{:>6}  {:<10}  {:<6}",
        note.id.to_string(),
        note_time(note.timestamp, now),
        note.mood.as_str()
    );
    if note.favorite {
        line.push_str("  *");
    }
    if note.likecount > 0 || note.liked {
        let marker = if note.liked { "liked" } else { "likes" };
        line.push_str(&format!("  {marker}:{}", note.likecount));
    }

    line.push_str("  ");
    line.push_str(note.text.lines().next().unwrap_or_default());
    for tag in &note.tags {
        line.push_str(&format!(" #{tag}"));
    }
    if !note.images.is_empty() {
        line.push_str(&format!(" [{} image(s)]", note.images.len()));
    }
    if !note.comments.is_empty() {
        line.push_str(&format!(" ({} comment(s))", note.comments.len()));
    }
    line
}

pub(crate) fn comment_line(comment: &Comment, now: &DateTime<Local>) -> String {
    format!(
        "{}  {}  {}",
        comment.id,
        comment_time(&comment.timestamp, now),
        comment.text
    )
}

fn recent_label<Tz: TimeZone>(at: &DateTime<Tz>, now: &DateTime<Tz>) -> Option<String> {
    let elapsed = now.clone().signed_duration_since(at.clone());
    if elapsed.num_seconds() < 0 {
        return None;
    }
    if elapsed.num_minutes() < 1 {
        return Some("just now".to_string());
    }
    if elapsed.num_hours() < 1 {
        return Some(format!("{} min ago", elapsed.num_minutes()));
    }
    None
}

fn day_label<Tz: TimeZone>(at: &DateTime<Tz>, now: &DateTime<Tz>) -> Option<&'static str> {
    let day = at.date_naive();
    let today = now.date_naive();
    if day == today {
        Some("today")
    } else if today.checked_sub_days(Days::new(1)) == Some(day) {
        Some("yesterday")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};

    fn at(offset: &FixedOffset, y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        offset
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .expect("valid instant")
    }

    #[test]
    fn note_labels_step_from_relative_to_weekday() {
        let tz = FixedOffset::east_opt(8 * 3600).expect("offset");
        let now = at(&tz, 2026, 5, 20, 15, 0);
        let millis = |instant: DateTime<FixedOffset>| instant.timestamp_millis();

        assert_eq!(note_time(millis(now - Duration::seconds(20)), &now), "just now");
        assert_eq!(note_time(millis(now - Duration::minutes(42)), &now), "42 min ago");
        assert_eq!(note_time(millis(at(&tz, 2026, 5, 20, 1, 0)), &now), "today");
        assert_eq!(note_time(millis(at(&tz, 2026, 5, 19, 23, 0)), &now), "yesterday");
        assert_eq!(note_time(millis(at(&tz, 2026, 5, 17, 9, 0)), &now), "Sunday");
    }

    #[test]
    fn comment_labels_carry_clock_time() {
        let tz = FixedOffset::east_opt(0).expect("offset");
        let now = at(&tz, 2026, 5, 20, 15, 0);
        let utc = |instant: DateTime<FixedOffset>| instant.with_timezone(&Utc);

        assert_eq!(comment_time(&utc(now - Duration::minutes(5)), &now), "5 min ago");
        assert_eq!(comment_time(&utc(at(&tz, 2026, 5, 20, 9, 5)), &now), "today 09:05");
        assert_eq!(
            comment_time(&utc(at(&tz, 2026, 5, 19, 21, 30)), &now),
            "yesterday 21:30"
        );
        assert_eq!(
            comment_time(&utc(at(&tz, 2026, 4, 2, 7, 0)), &now),
            "2026-04-02 07:00"
        );
    }
}
