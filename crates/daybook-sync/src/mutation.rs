use daybook_core::{Comment, DaybookResult, NewNote, Note, NoteDraft, NoteId, NotePatch, NoteStore};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Favorite,
    Like,
    Tags,
    Comments,
    Delete,
}

/// Absolute before/after values for one optimistic edit. Both directions
/// are idempotent, so re-applying after a refresh or reverting after a
/// failure never double-counts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Change {
    Favorite {
        before: bool,
        after: bool,
    },
    Like {
        before_liked: bool,
        before_count: u32,
        after_liked: bool,
        after_count: u32,
    },
    Tags {
        before: Vec<String>,
        after: Vec<String>,
    },
    Comments {
        before: Vec<Comment>,
        after: Vec<Comment>,
    },
}

impl Change {
    pub(crate) fn kind(&self) -> MutationKind {
        match self {
            Change::Favorite { .. } => MutationKind::Favorite,
            Change::Like { .. } => MutationKind::Like,
            Change::Tags { .. } => MutationKind::Tags,
            Change::Comments { .. } => MutationKind::Comments,
        }
    }

    pub(crate) fn apply(&self, note: &mut Note) {
        match self {
            Change::Favorite { after, .. } => note.favorite = *after,
            Change::Like {
                after_liked,
                after_count,
                ..
            } => {
                note.liked = *after_liked;
                note.likecount = *after_count;
            }
            Change::Tags { after, .. } => note.tags = after.clone(),
            Change::Comments { after, .. } => note.comments = after.clone(),
        }
    }

    pub(crate) fn revert(&self, note: &mut Note) {
        match self {
            Change::Favorite { before, .. } => note.favorite = *before,
            Change::Like {
                before_liked,
                before_count,
                ..
            } => {
                note.liked = *before_liked;
                note.likecount = *before_count;
            }
            Change::Tags { before, .. } => note.tags = before.clone(),
            Change::Comments { before, .. } => note.comments = before.clone(),
        }
    }

    /// Liked flag this change leaves behind, when it touches the ledger.
    pub(crate) fn liked_after(&self) -> Option<bool> {
        match self {
            Change::Like { after_liked, .. } => Some(*after_liked),
            _ => None,
        }
    }

    pub(crate) fn liked_before(&self) -> Option<bool> {
        match self {
            Change::Like { before_liked, .. } => Some(*before_liked),
            _ => None,
        }
    }

    pub(crate) fn confirm(&self, store: &dyn NoteStore, id: &NoteId) -> DaybookResult<Note> {
        match self {
            Change::Favorite { after, .. } => store.update(id, &NotePatch::favorite(*after)),
            Change::Like { after_liked, .. } => store.toggle_like(id, *after_liked),
            Change::Tags { after, .. } => store.update(id, &NotePatch::tags(after.clone())),
            Change::Comments { after, .. } => {
                store.update(id, &NotePatch::comments(after.clone()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Command {
    Create {
        temp_id: NoteId,
        note: NewNote,
        draft: NoteDraft,
    },
    Mutate {
        id: NoteId,
        change: Change,
    },
    Delete {
        id: NoteId,
    },
}

impl Command {
    pub(crate) fn target(&self) -> &NoteId {
        match self {
            Command::Create { temp_id, .. } => temp_id,
            Command::Mutate { id, .. } | Command::Delete { id } => id,
        }
    }

    pub(crate) fn retarget(&mut self, from: &NoteId, to: &NoteId) {
        match self {
            Command::Mutate { id, .. } | Command::Delete { id } if *id == *from => {
                *id = to.clone();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::Mood;

    fn note() -> Note {
        NewNote {
            text: "n".to_string(),
            images: Vec::new(),
            tags: vec!["a".to_string()],
            mood: Mood::Cloudy,
            timestamp: 1,
            favorite: false,
        }
        .into_note(NoteId::Server(1))
    }

    #[test]
    fn apply_and_revert_are_idempotent() {
        let change = Change::Like {
            before_liked: false,
            before_count: 3,
            after_liked: true,
            after_count: 4,
        };
        let mut target = note();
        target.likecount = 3;

        change.apply(&mut target);
        change.apply(&mut target);
        assert!(target.liked);
        assert_eq!(target.likecount, 4);

        change.revert(&mut target);
        change.revert(&mut target);
        assert!(!target.liked);
        assert_eq!(target.likecount, 3);
    }

    #[test]
    fn retarget_only_touches_matching_commands() {
        let temp = NoteId::Temp("temp_1_0".to_string());
        let mut mutate = Command::Mutate {
            id: temp.clone(),
            change: Change::Favorite {
                before: false,
                after: true,
            },
        };
        let mut other = Command::Delete {
            id: NoteId::Server(9),
        };

        mutate.retarget(&temp, &NoteId::Server(10));
        other.retarget(&temp, &NoteId::Server(10));
        assert_eq!(mutate.target(), &NoteId::Server(10));
        assert_eq!(other.target(), &NoteId::Server(9));
    }
}
