use chrono::Local;
use daybook_core::{
    DaybookError, DaybookResult, ExitCode, MAX_IMAGES, Mood, Note, NoteDraft, NoteId,
};
use daybook_media::{ImageFile, preview, upload};
use daybook_sync::{CommentOrder, SettleReport, SyncCoordinator, SyncEvent};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::render::{comment_line, note_line};
use crate::{CommentCommand, GlobalOptions, Session, TagCommand, print_json, with_session};

#[derive(Debug, Serialize)]
struct MutationOutput<'a> {
    note: &'a Note,
    confirmed: usize,
    rolled_back: usize,
}

/// Attachments are uploaded before the create is sent, so a rejected create
/// leaves its uploaded blobs behind in the bucket. The error then carries the
/// draft text so nothing typed is lost.
pub(crate) fn cmd_compose(
    text: String,
    tags: Vec<String>,
    mood: Mood,
    images: Vec<PathBuf>,
    globals: &GlobalOptions,
) -> DaybookResult<ExitCode> {
    if images.len() > MAX_IMAGES {
        return Err(DaybookError::validation(format!(
            "a note can carry at most {MAX_IMAGES} images"
        )));
    }

    with_session(globals, |session| {
        let mut draft = NoteDraft::new(text);
        draft.mood = mood;
        for tag in &tags {
            draft.add_tag(tag)?;
        }
        draft.validate()?;
        for path in &images {
            draft.add_image(attach_image(session, path)?)?;
        }

        let mut sync = session.coordinator();
        let temp_id = sync.compose(draft)?;
        debug!(temp_id = %temp_id, "composed note");

        let (report, events) = match settle(&mut sync) {
            Ok(outcome) => outcome,
            Err(mut err) => {
                if let Some(draft) = sync.take_restored_draft() {
                    warn!(images = draft.images.len(), "note was not saved; uploaded images stay in the bucket");
                    err.message = format!("{}; unsaved draft: {:?}", err.message, draft.text);
                }
                return Err(err);
            }
        };
        let id = events
            .iter()
            .find_map(|event| match event {
                SyncEvent::Created { id, .. } => Some(id.clone()),
                _ => None,
            })
            .unwrap_or(temp_id);
        let note = require(&sync, &id)?;

        emit(globals, note, report, "Saved")
    })
}

pub(crate) fn cmd_favorite(raw_id: &str, globals: &GlobalOptions) -> DaybookResult<ExitCode> {
    with_session(globals, |session| {
        let id = NoteId::parse(raw_id)?;
        let mut sync = loaded(session, &id)?;
        sync.toggle_favorite(&id)?;
        let (report, _) = settle(&mut sync)?;
        let note = require(&sync, &id)?;
        let verb = if note.favorite {
            "Favorited"
        } else {
            "Unfavorited"
        };
        emit(globals, note, report, verb)
    })
}

pub(crate) fn cmd_like(raw_id: &str, globals: &GlobalOptions) -> DaybookResult<ExitCode> {
    with_session(globals, |session| {
        let id = NoteId::parse(raw_id)?;
        let mut sync = loaded(session, &id)?;
        let liked = sync.toggle_like(&id)?;
        let (report, _) = settle(&mut sync)?;
        let note = require(&sync, &id)?;
        emit(globals, note, report, if liked { "Liked" } else { "Unliked" })
    })
}

pub(crate) fn cmd_tag(command: TagCommand, globals: &GlobalOptions) -> DaybookResult<ExitCode> {
    with_session(globals, |session| {
        let (raw_id, changed_verb) = match &command {
            TagCommand::Add { id, .. } => (id.as_str(), "Tagged"),
            TagCommand::Remove { id, .. } => (id.as_str(), "Untagged"),
        };
        let id = NoteId::parse(raw_id)?;
        let mut sync = loaded(session, &id)?;

        let changed = match &command {
            TagCommand::Add { tag, .. } => sync.add_tag(&id, tag)?,
            TagCommand::Remove { tag, .. } => sync.remove_tag(&id, tag)?,
        };
        let (report, _) = settle(&mut sync)?;
        let note = require(&sync, &id)?;
        emit(globals, note, report, if changed { changed_verb } else { "Unchanged" })
    })
}

pub(crate) fn cmd_comment(command: CommentCommand, globals: &GlobalOptions) -> DaybookResult<ExitCode> {
    with_session(globals, |session| match command {
        CommentCommand::Add { id, text } => {
            let id = NoteId::parse(&id)?;
            let mut sync = loaded(session, &id)?;
            let comment = sync.add_comment(&id, &text)?;
            let (report, _) = settle(&mut sync)?;
            let note = require(&sync, &id)?;

            if globals.json {
                print_json(&json!({
                    "ok": true,
                    "result": {
                        "comment": comment,
                        "note": note,
                        "confirmed": report.confirmed,
                    }
                }))?;
            } else {
                println!("Comment added to note {id}: {}", comment.id);
            }
            Ok(ExitCode::Success)
        }
        CommentCommand::Remove { id, comment_id } => {
            let id = NoteId::parse(&id)?;
            let mut sync = loaded(session, &id)?;
            if !sync.remove_comment(&id, &comment_id)? {
                return Err(DaybookError::usage(format!(
                    "note {id} has no comment '{comment_id}'"
                )));
            }
            let (report, _) = settle(&mut sync)?;
            let note = require(&sync, &id)?;
            emit(globals, note, report, "Comment removed from")
        }
        CommentCommand::List { id, oldest } => {
            let id = NoteId::parse(&id)?;
            let sync = loaded(session, &id)?;
            let order = if oldest {
                CommentOrder::Oldest
            } else {
                CommentOrder::Newest
            };
            let comments = sync.sorted_comments(&id, order)?;

            if globals.json {
                print_json(&json!({"ok": true, "result": comments}))?;
            } else if comments.is_empty() {
                println!("No comments on note {id}.");
            } else {
                let now = Local::now();
                for comment in &comments {
                    println!("{}", comment_line(comment, &now));
                }
            }
            Ok(ExitCode::Success)
        }
    })
}

pub(crate) fn cmd_delete(raw_id: &str, globals: &GlobalOptions) -> DaybookResult<ExitCode> {
    with_session(globals, |session| {
        let id = NoteId::parse(raw_id)?;
        let mut sync = loaded(session, &id)?;
        sync.delete_note(&id)?;
        let (report, _) = settle(&mut sync)?;

        if globals.json {
            print_json(&json!({
                "ok": true,
                "result": {"deleted": id, "confirmed": report.confirmed}
            }))?;
        } else {
            println!("Deleted note {id}");
        }
        Ok(ExitCode::Success)
    })
}

pub(crate) fn cmd_clear(globals: &GlobalOptions) -> DaybookResult<ExitCode> {
    if !globals.yes {
        return Err(DaybookError::usage(
            "clear deletes every note in the store; clear requires --yes",
        ));
    }

    with_session(globals, |session| {
        let mut sync = session.coordinator();
        sync.clear_all()?;

        if globals.json {
            print_json(&json!({"ok": true, "result": {"cleared": true, "store": session.backend.label()}}))?;
        } else {
            println!("Cleared every note from the {} store", session.backend.label());
        }
        Ok(ExitCode::Success)
    })
}

/// Uploads the image, falling back to an inline preview when the blob store
/// refuses it.
fn attach_image(session: &Session, path: &Path) -> DaybookResult<String> {
    let file = ImageFile::read(path)?;
    match upload(
        session.backend.blobs.as_ref(),
        &file,
        Some(session.profile.upload_max_dimension),
    ) {
        Ok(url) => Ok(url),
        Err(err) => {
            warn!(image = %path.display(), error = %err, "upload failed; attaching inline preview");
            Ok(preview(&file))
        }
    }
}

/// Loads pages until the note is in the collection.
fn loaded<'a>(session: &'a Session, id: &NoteId) -> DaybookResult<SyncCoordinator<'a>> {
    let mut sync = session.coordinator();
    sync.load_first_page()?;
    while sync.note(id).is_none() {
        if !sync.has_more() {
            return Err(DaybookError::usage(format!("note {id} not found")));
        }
        sync.load_more()?;
    }
    Ok(sync)
}

fn require<'s>(sync: &'s SyncCoordinator<'_>, id: &NoteId) -> DaybookResult<&'s Note> {
    sync.note(id)
        .ok_or_else(|| DaybookError::usage(format!("note {id} not found")))
}

/// Confirms every queued change. The first rollback becomes the command's
/// error so its exit code reaches the shell.
fn settle(sync: &mut SyncCoordinator<'_>) -> DaybookResult<(SettleReport, Vec<SyncEvent>)> {
    let report = sync.settle();
    let events = sync.drain_events();
    debug!(confirmed = report.confirmed, rolled_back = report.rolled_back, "settled");

    let failure = events.iter().find_map(|event| match event {
        SyncEvent::RolledBack { error, .. } | SyncEvent::ComposeFailed { error, .. } => {
            Some(error.clone())
        }
        _ => None,
    });
    match failure {
        Some(err) => Err(err),
        None => Ok((report, events)),
    }
}

fn emit(globals: &GlobalOptions, note: &Note, report: SettleReport, verb: &str) -> DaybookResult<ExitCode> {
    if globals.json {
        let output = MutationOutput {
            note,
            confirmed: report.confirmed,
            rolled_back: report.rolled_back,
        };
        print_json(&json!({"ok": true, "result": output}))?;
    } else {
        println!("{verb} note {}", note.id);
        println!("{}", note_line(note, &Local::now()));
    }
    Ok(ExitCode::Success)
}
