use crate::error::{DaybookError, DaybookResult};
use crate::model::{NewNote, Note, NoteId, NotePatch};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which backend a process talks to. `Auto` probes the remote store at
/// startup and falls back to the local one when it is unreachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    #[default]
    Auto,
    Remote,
    Local,
}

impl StoreMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreMode::Auto => "auto",
            StoreMode::Remote => "remote",
            StoreMode::Local => "local",
        }
    }
}

impl FromStr for StoreMode {
    type Err = DaybookError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(StoreMode::Auto),
            "remote" => Ok(StoreMode::Remote),
            "local" => Ok(StoreMode::Local),
            other => Err(DaybookError::usage(format!(
                "unknown store mode '{other}'; expected auto, remote or local"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePage {
    pub data: Vec<Note>,
    /// True when the page came back full. A store whose size is an exact
    /// multiple of the page size therefore reports one extra, empty page.
    pub has_more: bool,
}

impl NotePage {
    pub fn from_rows(data: Vec<Note>, page_size: usize) -> Self {
        let has_more = data.len() == page_size;
        Self { data, has_more }
    }
}

/// Capability interface over wherever notes are persisted. The sync layer
/// only ever talks to this trait, never to a concrete backend.
pub trait NoteStore {
    /// Establishes connectivity. Idempotent; concurrent callers share one
    /// attempt.
    fn init(&self) -> DaybookResult<()>;

    fn create(&self, note: &NewNote) -> DaybookResult<Note>;

    /// At most `limit` notes ordered by timestamp descending, skipping the
    /// first `offset`.
    fn range_query(&self, offset: usize, limit: usize) -> DaybookResult<NotePage>;

    /// Notes ordered by timestamp descending, offset `page * page_size`.
    fn page_query(&self, page: usize, page_size: usize) -> DaybookResult<NotePage> {
        self.range_query(page.saturating_mul(page_size), page_size)
    }

    fn update(&self, id: &NoteId, patch: &NotePatch) -> DaybookResult<Note>;

    /// Deleting an id that does not exist succeeds.
    fn delete(&self, id: &NoteId) -> DaybookResult<()>;

    fn clear(&self) -> DaybookResult<()>;

    /// Moves the shared like counter by one in the requested direction and
    /// returns the note as stored afterwards.
    fn toggle_like(&self, id: &NoteId, want_liked: bool) -> DaybookResult<Note>;

    /// Short label used in logs and status output.
    fn label(&self) -> &'static str;
}

/// Blob bucket for uploaded images. Returns a resolvable URL for the stored
/// object.
pub trait BlobStore {
    fn put(&self, filename: &str, content_type: &str, bytes: Vec<u8>) -> DaybookResult<String>;
}

impl<T: NoteStore + ?Sized> NoteStore for Box<T> {
    fn init(&self) -> DaybookResult<()> {
        (**self).init()
    }

    fn create(&self, note: &NewNote) -> DaybookResult<Note> {
        (**self).create(note)
    }

    fn range_query(&self, offset: usize, limit: usize) -> DaybookResult<NotePage> {
        (**self).range_query(offset, limit)
    }

    fn page_query(&self, page: usize, page_size: usize) -> DaybookResult<NotePage> {
        (**self).page_query(page, page_size)
    }

    fn update(&self, id: &NoteId, patch: &NotePatch) -> DaybookResult<Note> {
        (**self).update(id, patch)
    }

    fn delete(&self, id: &NoteId) -> DaybookResult<()> {
        (**self).delete(id)
    }

    fn clear(&self) -> DaybookResult<()> {
        (**self).clear()
    }

    fn toggle_like(&self, id: &NoteId, want_liked: bool) -> DaybookResult<Note> {
        (**self).toggle_like(id, want_liked)
    }

    fn label(&self) -> &'static str {
        (**self).label()
    }
}
