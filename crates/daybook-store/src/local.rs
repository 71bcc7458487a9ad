use crate::{open_connection, scope_key, sqlite_error};
use daybook_core::{
    BlobStore, DaybookError, DaybookResult, ErrorKind, NewNote, Note, NoteId, NotePage, NotePatch,
    NoteStore,
};
use daybook_fs::WorkspacePaths;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Local-durable fallback that honours the same contract as the remote
/// adapter. Ids come from an autoincrement column, so they are never reused.
#[derive(Debug, Clone)]
pub struct LocalNoteStore {
    db_path: PathBuf,
    scope: String,
}

impl LocalNoteStore {
    pub fn new(db_path: impl Into<PathBuf>, profile: &str) -> Self {
        Self {
            db_path: db_path.into(),
            scope: scope_key(profile),
        }
    }

    pub fn from_workspace(paths: &WorkspacePaths, profile: &str) -> Self {
        Self::new(paths.state_db_path.clone(), profile)
    }

    fn connection(&self) -> DaybookResult<Connection> {
        open_connection(&self.db_path, ErrorKind::Io)
    }

    fn encode(&self, note: &Note) -> DaybookResult<String> {
        let mut stored = note.clone();
        stored.liked = false;
        serde_json::to_string(&stored)
            .map_err(|err| DaybookError::io(format!("failed to encode local note: {err}")))
    }

    fn decode(&self, id: i64, payload: &str) -> DaybookResult<Note> {
        let mut note = serde_json::from_str::<Note>(payload).map_err(|err| {
            DaybookError::io(format!(
                "failed to parse local note {id} in '{}': {}",
                self.db_path.display(),
                err
            ))
        })?;
        note.id = NoteId::Server(id);
        Ok(note)
    }

    fn load_in(&self, tx: &Transaction<'_>, id: i64) -> DaybookResult<Note> {
        let payload = tx
            .query_row(
                "SELECT payload_json FROM local_notes WHERE scope = ?1 AND id = ?2",
                params![self.scope, id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|err| sqlite_error(ErrorKind::Io, "load local note", &self.db_path, err))?
            .ok_or_else(|| DaybookError::remote(format!("note {id} does not exist")))?;
        self.decode(id, &payload)
    }

    fn rewrite<F>(&self, id: &NoteId, action: &str, change: F) -> DaybookResult<Note>
    where
        F: FnOnce(&mut Note),
    {
        let server_id = id.as_server().ok_or_else(|| {
            DaybookError::usage(format!("note {id} has not been confirmed yet"))
        })?;

        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|err| sqlite_error(ErrorKind::Io, "start transaction", &self.db_path, err))?;

        let mut note = self.load_in(&tx, server_id)?;
        change(&mut note);
        let payload = self.encode(&note)?;
        tx.execute(
            "UPDATE local_notes SET payload_json = ?1, timestamp = ?2 WHERE scope = ?3 AND id = ?4",
            params![payload, note.timestamp, self.scope, server_id],
        )
        .map_err(|err| sqlite_error(ErrorKind::Io, action, &self.db_path, err))?;
        tx.commit()
            .map_err(|err| sqlite_error(ErrorKind::Io, "commit transaction", &self.db_path, err))?;

        Ok(note)
    }
}

impl NoteStore for LocalNoteStore {
    fn init(&self) -> DaybookResult<()> {
        self.connection().map(|_| ())
    }

    fn create(&self, note: &NewNote) -> DaybookResult<Note> {
        note.validate()?;

        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|err| sqlite_error(ErrorKind::Io, "start transaction", &self.db_path, err))?;
        tx.execute(
            "INSERT INTO local_notes (scope, timestamp, payload_json) VALUES (?1, ?2, '{}')",
            params![self.scope, note.timestamp],
        )
        .map_err(|err| sqlite_error(ErrorKind::Io, "insert local note", &self.db_path, err))?;

        let id = tx.last_insert_rowid();
        let stored = note.clone().into_note(NoteId::Server(id));
        let payload = self.encode(&stored)?;
        tx.execute(
            "UPDATE local_notes SET payload_json = ?1 WHERE id = ?2",
            params![payload, id],
        )
        .map_err(|err| sqlite_error(ErrorKind::Io, "insert local note", &self.db_path, err))?;
        tx.commit()
            .map_err(|err| sqlite_error(ErrorKind::Io, "commit transaction", &self.db_path, err))?;

        debug!(id, "created local note");
        Ok(stored)
    }

    fn range_query(&self, offset: usize, limit: usize) -> DaybookResult<NotePage> {
        if limit == 0 {
            return Err(DaybookError::usage("page size must be greater than zero"));
        }

        let conn = self.connection()?;
        let mut statement = conn
            .prepare(
                "SELECT id, payload_json FROM local_notes WHERE scope = ?1
                 ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3",
            )
            .map_err(|err| sqlite_error(ErrorKind::Io, "prepare page query", &self.db_path, err))?;

        let rows = statement
            .query_map(
                params![self.scope, limit as i64, offset as i64],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(|err| sqlite_error(ErrorKind::Io, "query local notes", &self.db_path, err))?;

        let mut notes = Vec::new();
        for row in rows {
            let (id, payload) =
                row.map_err(|err| sqlite_error(ErrorKind::Io, "read local note row", &self.db_path, err))?;
            notes.push(self.decode(id, &payload)?);
        }

        Ok(NotePage::from_rows(notes, limit))
    }

    fn update(&self, id: &NoteId, patch: &NotePatch) -> DaybookResult<Note> {
        if patch.is_empty() {
            return Err(DaybookError::usage("update requires at least one field"));
        }
        self.rewrite(id, "update local note", |note| patch.apply_to(note))
    }

    fn delete(&self, id: &NoteId) -> DaybookResult<()> {
        let Some(server_id) = id.as_server() else {
            return Ok(());
        };

        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM local_notes WHERE scope = ?1 AND id = ?2",
            params![self.scope, server_id],
        )
        .map_err(|err| sqlite_error(ErrorKind::Io, "delete local note", &self.db_path, err))?;
        Ok(())
    }

    fn clear(&self) -> DaybookResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM local_notes WHERE scope = ?1",
            params![self.scope],
        )
        .map_err(|err| sqlite_error(ErrorKind::Io, "clear local notes", &self.db_path, err))?;
        Ok(())
    }

    fn toggle_like(&self, id: &NoteId, want_liked: bool) -> DaybookResult<Note> {
        self.rewrite(id, "update like counter", |note| {
            note.likecount = if want_liked {
                note.likecount.saturating_add(1)
            } else {
                note.likecount.saturating_sub(1)
            };
        })
    }

    fn label(&self) -> &'static str {
        "local"
    }
}

/// Blob bucket backed by the workspace attachments directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    dir: PathBuf,
}

impl LocalBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_workspace(paths: &WorkspacePaths) -> Self {
        Self::new(paths.attachments_dir.clone())
    }
}

impl BlobStore for LocalBlobStore {
    fn put(&self, filename: &str, _content_type: &str, bytes: Vec<u8>) -> DaybookResult<String> {
        if filename.trim().is_empty() || filename.contains(['/', '\\']) || filename.starts_with('.') {
            return Err(DaybookError::usage(format!(
                "'{filename}' is not a valid attachment name"
            )));
        }

        fs::create_dir_all(&self.dir).map_err(|err| {
            DaybookError::io(format!(
                "failed to create attachments directory '{}': {}",
                self.dir.display(),
                err
            ))
        })?;

        let path = self.dir.join(filename);
        fs::write(&path, bytes).map_err(|err| {
            DaybookError::io(format!(
                "failed to write attachment '{}': {}",
                path.display(),
                err
            ))
        })?;

        Ok(format!("file://{}", path.display()))
    }
}
