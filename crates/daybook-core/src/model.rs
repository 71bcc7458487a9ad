use crate::error::{DaybookError, DaybookResult};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_IMAGES: usize = 9;
pub const MAX_TAGS: usize = 5;
pub const MAX_RAW_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
pub const TEMP_ID_PREFIX: &str = "temp_";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identity of a note. Server ids are assigned by the store; temp ids are
/// minted locally for an unconfirmed compose and always carry `temp_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoteId {
    Server(i64),
    Temp(String),
}

impl NoteId {
    pub fn mint_temp(sequence: u64) -> Self {
        Self::Temp(format!("{TEMP_ID_PREFIX}{}_{sequence}", now_millis()))
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    pub fn as_server(&self) -> Option<i64> {
        match self {
            Self::Server(id) => Some(*id),
            Self::Temp(_) => None,
        }
    }

    pub fn parse(input: &str) -> DaybookResult<Self> {
        let trimmed = input.trim();
        if trimmed.starts_with(TEMP_ID_PREFIX) {
            return Ok(Self::Temp(trimmed.to_string()));
        }

        trimmed
            .parse::<i64>()
            .map(Self::Server)
            .map_err(|_| DaybookError::usage(format!("'{trimmed}' is not a note id")))
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Temp(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Sunny,
    #[default]
    Cloudy,
    Rainy,
    Snowy,
    Windy,
}

impl Mood {
    pub const ALL: [Mood; 5] = [
        Mood::Sunny,
        Mood::Cloudy,
        Mood::Rainy,
        Mood::Snowy,
        Mood::Windy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Sunny => "sunny",
            Mood::Cloudy => "cloudy",
            Mood::Rainy => "rainy",
            Mood::Snowy => "snowy",
            Mood::Windy => "windy",
        }
    }
}

impl FromStr for Mood {
    type Err = DaybookError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim().to_ascii_lowercase();
        Mood::ALL
            .into_iter()
            .find(|mood| mood.as_str() == needle)
            .ok_or_else(|| DaybookError::validation(format!("unknown mood '{value}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Comment {
    pub fn new(text: &str) -> DaybookResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DaybookError::validation("comment text cannot be empty"));
        }

        Ok(Self {
            id: format!("comment_{}_{}", now_millis(), random_base36(9)),
            text: text.to_string(),
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_mood")]
    pub mood: Mood,
    #[serde(default, deserialize_with = "null_as_default")]
    pub favorite: bool,
    #[serde(default, deserialize_with = "non_negative_count")]
    pub likecount: u32,
    /// Device-local; overwritten from the liked ledger on every load.
    #[serde(default)]
    pub liked: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments: Vec<Comment>,
    pub timestamp: i64,
}

impl Note {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|existing| existing == tag)
    }
}

/// Compose-time input. Text is kept as typed so a failed compose can hand
/// the exact draft back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub mood: Mood,
}

impl NoteDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn add_tag(&mut self, raw: &str) -> DaybookResult<bool> {
        push_tag(&mut self.tags, raw)
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|existing| existing != tag);
        before != self.tags.len()
    }

    pub fn add_image(&mut self, reference: impl Into<String>) -> DaybookResult<()> {
        if self.images.len() >= MAX_IMAGES {
            return Err(DaybookError::validation(format!(
                "a note can carry at most {MAX_IMAGES} images"
            )));
        }
        self.images.push(reference.into());
        Ok(())
    }

    pub fn validate(&self) -> DaybookResult<()> {
        if self.text.trim().is_empty() {
            return Err(DaybookError::validation("note text cannot be empty"));
        }
        if self.images.len() > MAX_IMAGES {
            return Err(DaybookError::validation(format!(
                "a note can carry at most {MAX_IMAGES} images"
            )));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(DaybookError::validation(format!(
                "a note can carry at most {MAX_TAGS} tags"
            )));
        }
        Ok(())
    }

    pub fn to_new_note(&self, timestamp: i64) -> NewNote {
        NewNote {
            text: self.text.trim().to_string(),
            images: self.images.clone(),
            tags: self.tags.clone(),
            mood: self.mood,
            timestamp,
            favorite: false,
        }
    }
}

/// Row shape sent to `create`: client-only fields (id, liked, counters,
/// comments) are absent by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNote {
    pub text: String,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub mood: Mood,
    pub timestamp: i64,
    pub favorite: bool,
}

impl NewNote {
    pub fn validate(&self) -> DaybookResult<()> {
        if self.text.trim().is_empty() {
            return Err(DaybookError::validation("note text cannot be empty"));
        }
        Ok(())
    }

    pub fn into_note(self, id: NoteId) -> Note {
        Note {
            id,
            text: self.text,
            images: self.images,
            tags: self.tags,
            mood: self.mood,
            favorite: self.favorite,
            likecount: 0,
            liked: false,
            comments: Vec::new(),
            timestamp: self.timestamp,
        }
    }
}

/// Partial update. Only named fields are replaced; `comments` must always be
/// the full desired collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likecount: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

impl NotePatch {
    pub fn favorite(value: bool) -> Self {
        Self {
            favorite: Some(value),
            ..Self::default()
        }
    }

    pub fn tags(tags: Vec<String>) -> Self {
        Self {
            tags: Some(tags),
            ..Self::default()
        }
    }

    pub fn comments(comments: Vec<Comment>) -> Self {
        Self {
            comments: Some(comments),
            ..Self::default()
        }
    }

    pub fn likecount(count: u32) -> Self {
        Self {
            likecount: Some(count),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply_to(&self, note: &mut Note) {
        if let Some(text) = &self.text {
            note.text = text.clone();
        }
        if let Some(images) = &self.images {
            note.images = images.clone();
        }
        if let Some(tags) = &self.tags {
            note.tags = tags.clone();
        }
        if let Some(mood) = self.mood {
            note.mood = mood;
        }
        if let Some(favorite) = self.favorite {
            note.favorite = favorite;
        }
        if let Some(likecount) = self.likecount {
            note.likecount = likecount;
        }
        if let Some(comments) = &self.comments {
            note.comments = comments.clone();
        }
    }
}

/// Trims and strips one leading `#`. Returns `None` for an empty tag.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// Adds a normalized tag. Duplicates and empty input are a no-op (`false`);
/// a sixth tag is rejected.
pub fn push_tag(tags: &mut Vec<String>, raw: &str) -> DaybookResult<bool> {
    let Some(tag) = normalize_tag(raw) else {
        return Ok(false);
    };
    if tags.contains(&tag) {
        return Ok(false);
    }
    if tags.len() >= MAX_TAGS {
        return Err(DaybookError::validation(format!(
            "a note can carry at most {MAX_TAGS} tags"
        )));
    }

    tags.push(tag);
    Ok(true)
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_mood<'de, D>(deserializer: D) -> Result<Mood, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .and_then(|value| value.parse::<Mood>().ok())
        .unwrap_or_default())
}

fn non_negative_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .clamp(0, i64::from(u32::MAX)) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn server_rows_with_nulls_decode_to_defaults() {
        let note: Note = serde_json::from_value(json!({
            "id": 5,
            "text": "hello",
            "images": null,
            "tags": null,
            "mood": null,
            "favorite": null,
            "likecount": null,
            "comments": null,
            "timestamp": 1_700_000_000_000i64
        }))
        .expect("decode note");

        assert_eq!(note.id, NoteId::Server(5));
        assert!(note.images.is_empty());
        assert!(note.tags.is_empty());
        assert_eq!(note.mood, Mood::Cloudy);
        assert!(!note.favorite);
        assert_eq!(note.likecount, 0);
        assert!(!note.liked);
        assert!(note.comments.is_empty());
    }

    #[test]
    fn unknown_mood_and_negative_count_are_tolerated() {
        let note: Note = serde_json::from_value(json!({
            "id": 1,
            "text": "x",
            "mood": "ecstatic",
            "likecount": -3,
            "timestamp": 0
        }))
        .expect("decode note");

        assert_eq!(note.mood, Mood::Cloudy);
        assert_eq!(note.likecount, 0);
    }

    #[test]
    fn note_ids_parse_and_display() {
        assert_eq!(NoteId::parse("42").expect("server id"), NoteId::Server(42));
        let temp = NoteId::parse("temp_1700_0").expect("temp id");
        assert!(temp.is_temp());
        assert_eq!(temp.to_string(), "temp_1700_0");
        assert!(NoteId::parse("abc").is_err());

        let minted = NoteId::mint_temp(7);
        assert!(minted.to_string().starts_with(TEMP_ID_PREFIX));
        assert!(minted.to_string().ends_with("_7"));
    }

    #[test]
    fn tag_normalization_strips_one_marker() {
        assert_eq!(normalize_tag("  #work "), Some("work".to_string()));
        assert_eq!(normalize_tag("##double"), Some("#double".to_string()));
        assert_eq!(normalize_tag(" # "), None);
    }

    #[test]
    fn sixth_tag_is_rejected_and_duplicates_are_ignored() {
        let mut draft = NoteDraft::new("hi");
        for tag in ["a", "b", "c", "d", "e"] {
            assert!(draft.add_tag(tag).expect("add tag"));
        }
        assert!(!draft.add_tag("#a").expect("duplicate"));

        let error = draft.add_tag("f").expect_err("sixth tag");
        assert_eq!(error.kind, crate::ErrorKind::Validation);
        assert_eq!(draft.tags.len(), MAX_TAGS);
    }

    #[test]
    fn draft_validation_rejects_blank_text_and_too_many_images() {
        assert!(NoteDraft::new("   ").validate().is_err());

        let mut draft = NoteDraft::new("ok");
        for index in 0..MAX_IMAGES {
            draft.add_image(format!("https://img/{index}")).expect("image");
        }
        assert!(draft.add_image("one-too-many").is_err());
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn patch_serializes_only_named_fields() {
        let patch = NotePatch::favorite(true);
        assert_eq!(
            serde_json::to_value(&patch).expect("encode"),
            json!({"favorite": true})
        );
        assert!(NotePatch::default().is_empty());
    }

    #[test]
    fn comment_ids_carry_prefix_and_random_suffix() {
        let comment = Comment::new("  nice ").expect("comment");
        assert_eq!(comment.text, "nice");
        assert!(comment.id.starts_with("comment_"));
        assert_eq!(comment.id.rsplit('_').next().map(str::len), Some(9));
        assert!(Comment::new(" ").is_err());
    }
}
