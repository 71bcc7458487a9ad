use chrono::Local;
use daybook_core::{DaybookResult, ExitCode};
use daybook_sync::{Filter, LoadState, TimeWindow};
use serde_json::json;
use tracing::warn;

use crate::render::note_line;
use crate::{GlobalOptions, print_json, with_session};

pub(crate) fn cmd_feed(
    time: TimeWindow,
    tags: Vec<String>,
    favorite: bool,
    pages: usize,
    globals: &GlobalOptions,
) -> DaybookResult<ExitCode> {
    with_session(globals, |session| {
        let mut sync = session.coordinator();
        sync.load_first_page()?;
        for _ in 1..pages.max(1) {
            if !sync.has_more() {
                break;
            }
            if let Err(err) = sync.load_more() {
                warn!(error = %err, "stopped paging");
                break;
            }
        }

        let filter = Filter {
            time,
            tags,
            favorite,
        };
        let visible = sync.visible(&filter);

        if globals.json {
            print_json(&json!({
                "ok": true,
                "result": {
                    "store": session.backend.label(),
                    "state": sync.load_state(),
                    "has_more": sync.has_more(),
                    "loaded": sync.notes().len(),
                    "notes": visible,
                }
            }))?;
        } else {
            if sync.load_state() == &LoadState::Offline {
                println!("Backend unreachable; showing the cached timeline.");
            }
            if visible.is_empty() {
                println!("No notes found.");
            } else {
                let now = Local::now();
                for note in &visible {
                    println!("{}", note_line(note, &now));
                }
            }
            if sync.has_more() {
                println!("More notes available; pass --pages to load them.");
            }
        }

        Ok(ExitCode::Success)
    })
}

pub(crate) fn cmd_tags(globals: &GlobalOptions) -> DaybookResult<ExitCode> {
    with_session(globals, |session| {
        let mut sync = session.coordinator();
        sync.load_first_page()?;
        let tags = sync.all_tags();

        if globals.json {
            print_json(&json!({"ok": true, "result": tags}))?;
        } else if tags.is_empty() {
            println!("No tags found.");
        } else {
            for tag in tags {
                println!("#{tag}");
            }
        }

        Ok(ExitCode::Success)
    })
}
