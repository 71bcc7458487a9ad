use crate::{open_connection, scope_key, sqlite_error};
use chrono::Utc;
use daybook_core::{DaybookError, DaybookResult, ErrorKind, Note, NoteId};
use daybook_fs::WorkspacePaths;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const LIKED_KEY: &str = "liked_ids";
pub const SNAPSHOT_KEY: &str = "notes_snapshot";

/// Device-local cache: the liked-id set and the last confirmed first page.
///
/// The `try_*` methods report failures as `Cache` errors. The plain methods
/// are the best-effort surface the coordinator uses: failures are logged and
/// treated as an empty cache.
#[derive(Debug, Clone)]
pub struct CacheLedger {
    db_path: PathBuf,
    scope: String,
}

impl CacheLedger {
    pub fn new(db_path: impl Into<PathBuf>, profile: &str) -> Self {
        Self {
            db_path: db_path.into(),
            scope: scope_key(profile),
        }
    }

    pub fn from_workspace(paths: &WorkspacePaths, profile: &str) -> Self {
        Self::new(paths.state_db_path.clone(), profile)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn try_load_liked(&self) -> DaybookResult<BTreeSet<NoteId>> {
        Ok(self
            .read_entry::<Vec<NoteId>>(LIKED_KEY)?
            .unwrap_or_default()
            .into_iter()
            .collect())
    }

    /// Rewrites the whole set.
    pub fn try_save_liked(&self, liked: &BTreeSet<NoteId>) -> DaybookResult<()> {
        let ids: Vec<&NoteId> = liked.iter().collect();
        self.write_entry(LIKED_KEY, &ids)
    }

    pub fn try_load_snapshot(&self) -> DaybookResult<Vec<Note>> {
        Ok(self.read_entry::<Vec<Note>>(SNAPSHOT_KEY)?.unwrap_or_default())
    }

    pub fn try_save_snapshot(&self, notes: &[Note]) -> DaybookResult<()> {
        self.write_entry(SNAPSHOT_KEY, &notes)
    }

    pub fn try_clear(&self) -> DaybookResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM cache_entries WHERE scope = ?1",
            params![self.scope],
        )
        .map_err(|err| sqlite_error(ErrorKind::Cache, "clear cache", &self.db_path, err))?;
        Ok(())
    }

    pub fn load_liked(&self) -> BTreeSet<NoteId> {
        self.try_load_liked().unwrap_or_else(|err| {
            warn!(error = %err, "liked ledger unreadable; starting empty");
            BTreeSet::new()
        })
    }

    pub fn save_liked(&self, liked: &BTreeSet<NoteId>) {
        if let Err(err) = self.try_save_liked(liked) {
            warn!(error = %err, "failed to persist liked ledger");
        }
    }

    pub fn load_snapshot(&self) -> Vec<Note> {
        self.try_load_snapshot().unwrap_or_else(|err| {
            warn!(error = %err, "first-page snapshot unreadable; ignoring it");
            Vec::new()
        })
    }

    pub fn save_snapshot(&self, notes: &[Note]) {
        if let Err(err) = self.try_save_snapshot(notes) {
            warn!(error = %err, "failed to persist first-page snapshot");
        }
    }

    pub fn clear(&self) {
        if let Err(err) = self.try_clear() {
            warn!(error = %err, "failed to clear local cache");
        }
    }

    fn read_entry<T: DeserializeOwned>(&self, key: &str) -> DaybookResult<Option<T>> {
        let conn = self.connection()?;
        let payload = conn
            .query_row(
                "SELECT payload_json FROM cache_entries WHERE scope = ?1 AND key = ?2",
                params![self.scope, key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|err| sqlite_error(ErrorKind::Cache, "read cache entry", &self.db_path, err))?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        serde_json::from_str::<T>(&payload).map(Some).map_err(|err| {
            DaybookError::cache(format!(
                "failed to parse cache entry '{key}' in '{}': {}",
                self.db_path.display(),
                err
            ))
        })
    }

    fn write_entry<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> DaybookResult<()> {
        let payload = serde_json::to_string(value)
            .map_err(|err| DaybookError::cache(format!("failed to encode cache entry '{key}': {err}")))?;

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO cache_entries (scope, key, payload_json, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(scope, key) DO UPDATE SET payload_json = excluded.payload_json, updated_at = excluded.updated_at",
            params![self.scope, key, payload, Utc::now().to_rfc3339()],
        )
        .map_err(|err| sqlite_error(ErrorKind::Cache, "write cache entry", &self.db_path, err))?;
        Ok(())
    }

    fn connection(&self) -> DaybookResult<Connection> {
        open_connection(&self.db_path, ErrorKind::Cache)
    }
}
