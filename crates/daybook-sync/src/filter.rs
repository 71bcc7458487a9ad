use chrono::{Datelike, Days, Local, NaiveDate, TimeZone};
use daybook_core::{Comment, DaybookError, Note};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    #[default]
    All,
    Today,
    Yesterday,
    Week,
    Month,
}

impl TimeWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::All => "all",
            TimeWindow::Today => "today",
            TimeWindow::Yesterday => "yesterday",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
        }
    }

    fn admits(self, day: NaiveDate, today: NaiveDate) -> bool {
        match self {
            TimeWindow::All => true,
            TimeWindow::Today => day == today,
            TimeWindow::Yesterday => today.checked_sub_days(Days::new(1)) == Some(day),
            TimeWindow::Week => today
                .checked_sub_days(Days::new(7))
                .is_some_and(|start| day >= start),
            TimeWindow::Month => day >= month_back(today),
        }
    }
}

impl FromStr for TimeWindow {
    type Err = DaybookError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(TimeWindow::All),
            "today" => Ok(TimeWindow::Today),
            "yesterday" => Ok(TimeWindow::Yesterday),
            "week" => Ok(TimeWindow::Week),
            "month" => Ok(TimeWindow::Month),
            other => Err(DaybookError::usage(format!(
                "unknown time window '{other}'; expected all, today, yesterday, week or month"
            ))),
        }
    }
}

/// Declarative view filter. Tags are OR-matched; the favorite flag is
/// AND-matched with everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub time: TimeWindow,
    pub tags: Vec<String>,
    pub favorite: bool,
}

impl Filter {
    pub fn toggle_tag(&mut self, tag: &str) {
        if let Some(index) = self.tags.iter().position(|existing| existing == tag) {
            self.tags.remove(index);
        } else {
            self.tags.push(tag.to_string());
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.time == TimeWindow::All && self.tags.is_empty() && !self.favorite
    }

    pub fn matches<Tz: TimeZone>(&self, note: &Note, today: NaiveDate, tz: &Tz) -> bool {
        if self.time != TimeWindow::All {
            let Some(day) = tz
                .timestamp_millis_opt(note.timestamp)
                .single()
                .map(|instant| instant.date_naive())
            else {
                return false;
            };
            if !self.time.admits(day, today) {
                return false;
            }
        }

        if !self.tags.is_empty() && !self.tags.iter().any(|tag| note.has_tag(tag)) {
            return false;
        }

        !self.favorite || note.favorite
    }
}

/// Visible subset of `notes` in their original order, evaluated against a
/// fixed reference day.
pub fn project_in<'a, Tz: TimeZone>(
    notes: &'a [Note],
    filter: &Filter,
    today: NaiveDate,
    tz: &Tz,
) -> Vec<&'a Note> {
    notes
        .iter()
        .filter(|note| filter.matches(note, today, tz))
        .collect()
}

pub fn project<'a>(notes: &'a [Note], filter: &Filter) -> Vec<&'a Note> {
    project_in(notes, filter, Local::now().date_naive(), &Local)
}

/// Every tag in use, sorted and deduplicated.
pub fn all_tags(notes: &[Note]) -> Vec<String> {
    notes
        .iter()
        .flat_map(|note| note.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentOrder {
    #[default]
    Newest,
    Oldest,
}

pub fn sorted_comments(note: &Note, order: CommentOrder) -> Vec<Comment> {
    let mut comments = note.comments.clone();
    comments.sort_by(|left, right| match order {
        CommentOrder::Newest => right.timestamp.cmp(&left.timestamp),
        CommentOrder::Oldest => left.timestamp.cmp(&right.timestamp),
    });
    comments
}

// Calendar-month step back that keeps the day of month and lets overflow
// roll into the following month: Mar 31 lands on Mar 3 (or Mar 2 in a leap
// year), not Feb 28.
fn month_back(today: NaiveDate) -> NaiveDate {
    let (year, month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.checked_add_days(Days::new(u64::from(today.day0()))))
        .unwrap_or(today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use daybook_core::{Mood, NewNote, NoteId};
    use pretty_assertions::assert_eq;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn note_at(id: i64, when: NaiveDate, tags: &[&str], favorite: bool) -> Note {
        let instant = Utc
            .from_utc_datetime(&when.and_hms_opt(12, 0, 0).expect("noon"))
            .timestamp_millis();
        NewNote {
            text: format!("note {id}"),
            images: Vec::new(),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            mood: Mood::Cloudy,
            timestamp: instant,
            favorite,
        }
        .into_note(NoteId::Server(id))
    }

    fn ids(notes: &[&Note]) -> Vec<NoteId> {
        notes.iter().map(|note| note.id.clone()).collect()
    }

    #[test]
    fn week_window_keeps_last_seven_days() {
        let today = day(2026, 5, 20);
        let notes = vec![
            note_at(1, today, &[], false),
            note_at(2, today - Duration::days(1), &[], false),
            note_at(3, today - Duration::days(8), &[], false),
        ];
        let filter = Filter {
            time: TimeWindow::Week,
            ..Filter::default()
        };

        let visible = project_in(&notes, &filter, today, &Utc);
        assert_eq!(ids(&visible), vec![NoteId::Server(1), NoteId::Server(2)]);
    }

    #[test]
    fn today_and_yesterday_compare_calendar_days() {
        let today = day(2026, 1, 1);
        let notes = vec![
            note_at(1, today, &[], false),
            note_at(2, day(2025, 12, 31), &[], false),
        ];

        let todays = Filter {
            time: TimeWindow::Today,
            ..Filter::default()
        };
        let yesterdays = Filter {
            time: TimeWindow::Yesterday,
            ..Filter::default()
        };
        assert_eq!(ids(&project_in(&notes, &todays, today, &Utc)), vec![NoteId::Server(1)]);
        assert_eq!(
            ids(&project_in(&notes, &yesterdays, today, &Utc)),
            vec![NoteId::Server(2)]
        );
    }

    #[test]
    fn month_back_rolls_overflow_forward() {
        assert_eq!(month_back(day(2026, 3, 31)), day(2026, 3, 3));
        assert_eq!(month_back(day(2028, 3, 31)), day(2028, 3, 2));
        assert_eq!(month_back(day(2026, 1, 15)), day(2025, 12, 15));
        assert_eq!(month_back(day(2026, 5, 31)), day(2026, 5, 1));
    }

    #[test]
    fn month_window_uses_unnormalized_anchor() {
        let today = day(2026, 3, 31);
        let notes = vec![
            note_at(1, day(2026, 3, 3), &[], false),
            note_at(2, day(2026, 3, 2), &[], false),
        ];
        let filter = Filter {
            time: TimeWindow::Month,
            ..Filter::default()
        };
        assert_eq!(ids(&project_in(&notes, &filter, today, &Utc)), vec![NoteId::Server(1)]);
    }

    #[test]
    fn tags_or_match_and_favorite_and_matches() {
        let today = day(2026, 5, 20);
        let notes = vec![
            note_at(1, today, &["work"], true),
            note_at(2, today, &["home"], false),
            note_at(3, today, &["misc"], true),
            note_at(4, today, &["home", "work"], true),
        ];

        let mut filter = Filter::default();
        filter.toggle_tag("work");
        filter.toggle_tag("home");
        assert_eq!(
            ids(&project_in(&notes, &filter, today, &Utc)),
            vec![NoteId::Server(1), NoteId::Server(2), NoteId::Server(4)]
        );

        filter.favorite = true;
        assert_eq!(
            ids(&project_in(&notes, &filter, today, &Utc)),
            vec![NoteId::Server(1), NoteId::Server(4)]
        );

        filter.toggle_tag("home");
        assert_eq!(filter.tags, vec!["work".to_string()]);
    }

    #[test]
    fn empty_filter_is_identity_and_projection_is_idempotent() {
        let today = day(2026, 5, 20);
        let notes = vec![
            note_at(3, today, &["a"], false),
            note_at(1, today - Duration::days(40), &[], true),
            note_at(2, today - Duration::days(2), &["b"], false),
        ];

        let mut filter = Filter {
            time: TimeWindow::Week,
            tags: vec!["b".to_string()],
            favorite: false,
        };
        let first = project_in(&notes, &filter, today, &Utc);
        let second = project_in(&notes, &filter, today, &Utc);
        assert_eq!(first, second);

        filter.reset();
        assert!(filter.is_empty());
        let all: Vec<&Note> = notes.iter().collect();
        assert_eq!(project_in(&notes, &filter, today, &Utc), all);
    }

    #[test]
    fn tag_catalogue_is_sorted_and_unique() {
        let today = day(2026, 5, 20);
        let notes = vec![
            note_at(1, today, &["work", "alpha"], false),
            note_at(2, today, &["work"], false),
        ];
        assert_eq!(all_tags(&notes), vec!["alpha".to_string(), "work".to_string()]);
    }

    #[test]
    fn comments_sort_both_ways() {
        let today = day(2026, 5, 20);
        let mut note = note_at(1, today, &[], false);
        let mut older = Comment::new("older").expect("comment");
        older.timestamp = Utc::now() - Duration::hours(2);
        let newer = Comment::new("newer").expect("comment");
        note.comments = vec![older.clone(), newer.clone()];

        assert_eq!(
            sorted_comments(&note, CommentOrder::Newest),
            vec![newer.clone(), older.clone()]
        );
        assert_eq!(sorted_comments(&note, CommentOrder::Oldest), vec![older, newer]);
    }
}
