mod ledger;
mod local;

use daybook_core::{DaybookError, ErrorKind};
use rusqlite::{Connection, Error as SqlError, ErrorCode};
use std::path::Path;

pub use ledger::{CacheLedger, LIKED_KEY, SNAPSHOT_KEY};
pub use local::{LocalBlobStore, LocalNoteStore};

fn open_connection(db_path: &Path, kind: ErrorKind) -> Result<Connection, DaybookError> {
    let conn = Connection::open(db_path)
        .map_err(|err| sqlite_error(kind, "open state database", db_path, err))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         CREATE TABLE IF NOT EXISTS cache_entries (
             scope TEXT NOT NULL,
             key TEXT NOT NULL,
             payload_json TEXT NOT NULL,
             updated_at TEXT NOT NULL,
             PRIMARY KEY (scope, key)
         );
         CREATE TABLE IF NOT EXISTS local_notes (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             scope TEXT NOT NULL,
             timestamp INTEGER NOT NULL,
             payload_json TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS local_notes_feed
             ON local_notes (scope, timestamp DESC, id DESC);",
    )
    .map_err(|err| sqlite_error(kind, "initialize schema", db_path, err))?;
    Ok(conn)
}

fn sqlite_error(kind: ErrorKind, action: &str, db_path: &Path, err: SqlError) -> DaybookError {
    if let SqlError::SqliteFailure(code, message) = &err
        && (code.code == ErrorCode::DatabaseCorrupt || code.code == ErrorCode::NotADatabase)
    {
        let detail = message.as_deref().unwrap_or("sqlite reported corruption");
        return DaybookError::new(
            kind,
            format!(
                "failed to {action}: state database '{}' is corrupted ({detail}); remove '.daybook/state.db' to start with an empty local cache",
                db_path.display()
            ),
        );
    }

    DaybookError::new(
        kind,
        format!(
            "failed to {action} using state database '{}': {}",
            db_path.display(),
            err
        ),
    )
}

fn scope_key(profile: &str) -> String {
    let mut output = String::with_capacity(profile.len());
    for ch in profile.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            output.push(ch);
        } else {
            output.push('_');
        }
    }

    if output.is_empty() {
        "default".to_string()
    } else {
        output
    }
}
