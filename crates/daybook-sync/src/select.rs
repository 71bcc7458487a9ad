use daybook_core::{BlobStore, DaybookResult, NoteStore, StoreMode};
use tracing::{debug, info};

/// A note store together with the blob store that lives next to it.
pub struct Backend {
    pub notes: Box<dyn NoteStore>,
    pub blobs: Box<dyn BlobStore>,
}

impl Backend {
    pub fn new(notes: Box<dyn NoteStore>, blobs: Box<dyn BlobStore>) -> Self {
        Self { notes, blobs }
    }

    pub fn label(&self) -> &'static str {
        self.notes.label()
    }
}

/// Picks the backend for a session. `Auto` probes the remote store and falls
/// back to the local one only when the probe fails to connect or times out;
/// any other error is reported as is.
pub fn select_store<R, L>(mode: StoreMode, remote: R, local: L) -> DaybookResult<Backend>
where
    R: FnOnce() -> DaybookResult<Backend>,
    L: FnOnce() -> DaybookResult<Backend>,
{
    match mode {
        StoreMode::Local => {
            let backend = local()?;
            backend.notes.init()?;
            Ok(backend)
        }
        StoreMode::Remote => {
            let backend = remote()?;
            backend.notes.init()?;
            debug!(store = backend.label(), "remote store ready");
            Ok(backend)
        }
        StoreMode::Auto => {
            let backend = remote()?;
            match backend.notes.init() {
                Ok(()) => Ok(backend),
                Err(err) if err.is_connection_failure() => {
                    info!(error = %err, "backend unreachable; using the local store");
                    let fallback = local()?;
                    fallback.notes.init()?;
                    Ok(fallback)
                }
                Err(err) => Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::{DaybookError, ErrorKind, NewNote, Note, NoteId, NotePage, NotePatch};

    struct Probe {
        label: &'static str,
        init: Result<(), DaybookError>,
    }

    impl NoteStore for Probe {
        fn init(&self) -> DaybookResult<()> {
            self.init.clone()
        }

        fn create(&self, _note: &NewNote) -> DaybookResult<Note> {
            Err(DaybookError::usage("unused"))
        }

        fn range_query(&self, _offset: usize, _limit: usize) -> DaybookResult<NotePage> {
            Ok(NotePage::default())
        }

        fn update(&self, _id: &NoteId, _patch: &NotePatch) -> DaybookResult<Note> {
            Err(DaybookError::usage("unused"))
        }

        fn delete(&self, _id: &NoteId) -> DaybookResult<()> {
            Ok(())
        }

        fn clear(&self) -> DaybookResult<()> {
            Ok(())
        }

        fn toggle_like(&self, _id: &NoteId, _want_liked: bool) -> DaybookResult<Note> {
            Err(DaybookError::usage("unused"))
        }

        fn label(&self) -> &'static str {
            self.label
        }
    }

    struct NoBlobs;

    impl BlobStore for NoBlobs {
        fn put(&self, filename: &str, _content_type: &str, _bytes: Vec<u8>) -> DaybookResult<String> {
            Ok(format!("memory://{filename}"))
        }
    }

    fn remote(init: Result<(), DaybookError>) -> DaybookResult<Backend> {
        Ok(Backend::new(
            Box::new(Probe {
                label: "remote",
                init,
            }),
            Box::new(NoBlobs),
        ))
    }

    fn local() -> DaybookResult<Backend> {
        Ok(Backend::new(
            Box::new(Probe {
                label: "local",
                init: Ok(()),
            }),
            Box::new(NoBlobs),
        ))
    }

    #[test]
    fn auto_falls_back_only_on_connection_failures() {
        let store = select_store(
            StoreMode::Auto,
            || remote(Err(DaybookError::connection("refused"))),
            local,
        )
        .expect("fallback");
        assert_eq!(store.label(), "local");

        let store = select_store(
            StoreMode::Auto,
            || remote(Err(DaybookError::timeout("slow"))),
            local,
        )
        .expect("fallback");
        assert_eq!(store.label(), "local");

        let err = select_store(
            StoreMode::Auto,
            || remote(Err(DaybookError::remote("bad key [http_status=401]"))),
            local,
        )
        .err()
        .expect("remote error surfaces");
        assert_eq!(err.kind, ErrorKind::Remote);

        let store = select_store(StoreMode::Auto, || remote(Ok(())), local).expect("remote");
        assert_eq!(store.label(), "remote");
    }

    #[test]
    fn forced_remote_never_touches_local() {
        let err = select_store(
            StoreMode::Remote,
            || remote(Err(DaybookError::connection("refused"))),
            || panic!("local store must not be built"),
        )
        .err()
        .expect("connection error");
        assert_eq!(err.kind, ErrorKind::Connection);
    }

    #[test]
    fn forced_local_skips_the_probe() {
        let store = select_store(
            StoreMode::Local,
            || panic!("remote store must not be built"),
            local,
        )
        .expect("local");
        assert_eq!(store.label(), "local");
    }
}
