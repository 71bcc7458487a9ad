mod error;
mod model;
mod store;

pub use error::{DaybookError, DaybookResult, ErrorKind, ExitCode};
pub use model::{
    Comment, MAX_IMAGES, MAX_RAW_IMAGE_BYTES, MAX_TAGS, Mood, NewNote, Note, NoteDraft, NoteId,
    NotePatch, TEMP_ID_PREFIX, normalize_tag, now_millis, push_tag, random_base36,
};
pub use store::{BlobStore, NotePage, NoteStore, StoreMode};
