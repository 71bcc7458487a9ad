use crate::filter::{CommentOrder, Filter, all_tags, project, sorted_comments};
use crate::mutation::{Change, Command, MutationKind};
use daybook_core::{
    Comment, DaybookError, DaybookResult, Note, NoteDraft, NoteId, NotePage, NoteStore, now_millis,
    push_tag,
};
use daybook_store::CacheLedger;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info, warn};

const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum LoadState {
    Idle,
    /// Showing the cold-start snapshot while the first page is in flight.
    Cached,
    Ready,
    /// The last refresh failed but an earlier collection is still shown.
    Offline,
    Failed(DaybookError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Created {
        temp_id: NoteId,
        id: NoteId,
    },
    Confirmed {
        id: NoteId,
        kind: MutationKind,
    },
    RolledBack {
        id: NoteId,
        kind: MutationKind,
        error: DaybookError,
    },
    ComposeFailed {
        temp_id: NoteId,
        error: DaybookError,
    },
    OfflineFallback {
        error: DaybookError,
    },
    PageFailed {
        page: usize,
        error: DaybookError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettleReport {
    pub confirmed: usize,
    pub rolled_back: usize,
}

/// Owns the in-memory feed and reconciles optimistic edits against a
/// [`NoteStore`].
///
/// Every edit is applied to the collection immediately and queued; the
/// queue is confirmed in FIFO order by [`settle`](Self::settle), so edits on
/// one note reach the store in the order they were made. A failed
/// confirmation restores the value captured before the edit.
pub struct SyncCoordinator<'a> {
    store: &'a dyn NoteStore,
    cache: &'a CacheLedger,
    page_size: usize,
    notes: Vec<Note>,
    liked: BTreeSet<NoteId>,
    cursor: usize,
    /// Net confirmed creates minus deletes since page 0 was fetched. Rows
    /// past the loaded range move by this much on the server.
    offset_shift: isize,
    has_more: bool,
    paging: Option<usize>,
    load_state: LoadState,
    queue: VecDeque<Command>,
    temp_sequence: u64,
    events: Vec<SyncEvent>,
    restored_draft: Option<NoteDraft>,
}

impl<'a> SyncCoordinator<'a> {
    pub fn new(store: &'a dyn NoteStore, cache: &'a CacheLedger) -> Self {
        Self {
            store,
            cache,
            page_size: DEFAULT_PAGE_SIZE,
            notes: Vec::new(),
            liked: cache.load_liked(),
            cursor: 0,
            offset_shift: 0,
            has_more: false,
            paging: None,
            load_state: LoadState::Idle,
            queue: VecDeque::new(),
            temp_sequence: 0,
            events: Vec::new(),
            restored_draft: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn store_label(&self) -> &'static str {
        self.store.label()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    pub fn visible(&self, filter: &Filter) -> Vec<&Note> {
        project(&self.notes, filter)
    }

    pub fn all_tags(&self) -> Vec<String> {
        all_tags(&self.notes)
    }

    pub fn sorted_comments(&self, id: &NoteId, order: CommentOrder) -> DaybookResult<Vec<Comment>> {
        Ok(sorted_comments(self.require(id)?, order))
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        std::mem::take(&mut self.events)
    }

    /// The draft of the most recent compose whose create was rejected.
    pub fn take_restored_draft(&mut self) -> Option<NoteDraft> {
        self.restored_draft.take()
    }

    /// Fetches page 0 and replaces the collection once it arrives. On a cold
    /// start the cached snapshot is shown first. A failure is suppressed
    /// whenever something is already on screen.
    pub fn load_first_page(&mut self) -> DaybookResult<()> {
        if self.notes.is_empty() {
            let snapshot = self.cache.load_snapshot();
            if !snapshot.is_empty() {
                debug!(notes = snapshot.len(), "showing cached first page");
                self.notes = snapshot;
                self.annotate_all();
                self.overlay_pending();
                self.load_state = LoadState::Cached;
            }
        }

        match self.store.page_query(0, self.page_size) {
            Ok(page) => {
                debug!(rows = page.data.len(), has_more = page.has_more, "loaded first page");
                self.cache.save_snapshot(&page.data);
                self.notes = page.data;
                self.annotate_all();
                self.overlay_pending();
                self.cursor = 0;
                self.offset_shift = 0;
                self.has_more = page.has_more;
                self.paging = None;
                self.load_state = LoadState::Ready;
                Ok(())
            }
            Err(err) if !self.notes.is_empty() => {
                info!(error = %err, store = self.store.label(), "refresh failed; keeping the current feed");
                self.events.push(SyncEvent::OfflineFallback { error: err });
                self.load_state = LoadState::Offline;
                Ok(())
            }
            Err(err) => {
                self.load_state = LoadState::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Marks the next page as in flight and returns its index, or `None`
    /// when a page is already loading or the feed is exhausted.
    pub fn request_more(&mut self) -> Option<usize> {
        if self.paging.is_some() || !self.has_more {
            return None;
        }
        let page = self.cursor + 1;
        self.paging = Some(page);
        Some(page)
    }

    /// Appends a fetched page. Ids already present or queued for deletion
    /// are skipped. On failure the collection and cursor stay put so the
    /// same page is retried.
    pub fn complete_more(
        &mut self,
        page: usize,
        result: DaybookResult<NotePage>,
    ) -> DaybookResult<usize> {
        if self.paging != Some(page) {
            debug!(page, "ignoring stale page");
            return Ok(0);
        }
        self.paging = None;

        match result {
            Ok(fetched) => {
                let mut appended = 0;
                for mut note in fetched.data {
                    if self.note(&note.id).is_some() || self.delete_queued(&note.id) {
                        continue;
                    }
                    note.liked = self.liked.contains(&note.id);
                    self.notes.push(note);
                    appended += 1;
                }
                self.cursor = page;
                self.has_more = fetched.has_more;
                debug!(page, appended, has_more = self.has_more, "appended page");
                Ok(appended)
            }
            Err(err) => {
                warn!(page, error = %err, "failed to load more notes");
                self.events.push(SyncEvent::PageFailed {
                    page,
                    error: err.clone(),
                });
                Err(err)
            }
        }
    }

    pub fn load_more(&mut self) -> DaybookResult<usize> {
        let Some(page) = self.request_more() else {
            return Ok(0);
        };
        let result = self.store.range_query(self.page_offset(page), self.page_size);
        self.complete_more(page, result)
    }

    /// Server offset of `page`, corrected for notes this session added or
    /// removed ahead of it.
    fn page_offset(&self, page: usize) -> usize {
        let nominal = page.saturating_mul(self.page_size) as isize;
        nominal.saturating_add(self.offset_shift).max(0) as usize
    }

    fn delete_queued(&self, id: &NoteId) -> bool {
        self.queue
            .iter()
            .any(|command| matches!(command, Command::Delete { id: target } if target == id))
    }

    /// Inserts the draft at the head of the feed under a temporary id and
    /// queues the create.
    pub fn compose(&mut self, draft: NoteDraft) -> DaybookResult<NoteId> {
        draft.validate()?;

        self.temp_sequence += 1;
        let temp_id = NoteId::mint_temp(self.temp_sequence);
        let note = draft.to_new_note(now_millis());
        self.notes
            .insert(0, note.clone().into_note(temp_id.clone()));
        self.queue.push_back(Command::Create {
            temp_id: temp_id.clone(),
            note,
            draft,
        });
        Ok(temp_id)
    }

    pub fn toggle_favorite(&mut self, id: &NoteId) -> DaybookResult<()> {
        let note = self.require(id)?;
        let change = Change::Favorite {
            before: note.favorite,
            after: !note.favorite,
        };
        self.submit(id, change);
        Ok(())
    }

    /// Returns the new liked state.
    pub fn toggle_like(&mut self, id: &NoteId) -> DaybookResult<bool> {
        let note = self.require(id)?;
        let after_liked = !note.liked;
        let after_count = if after_liked {
            note.likecount.saturating_add(1)
        } else {
            note.likecount.saturating_sub(1)
        };
        let change = Change::Like {
            before_liked: note.liked,
            before_count: note.likecount,
            after_liked,
            after_count,
        };
        self.submit(id, change);
        Ok(after_liked)
    }

    /// Returns `false` when the tag was empty or already present.
    pub fn add_tag(&mut self, id: &NoteId, raw: &str) -> DaybookResult<bool> {
        let before = self.require(id)?.tags.clone();
        let mut after = before.clone();
        if !push_tag(&mut after, raw)? {
            return Ok(false);
        }
        self.submit(id, Change::Tags { before, after });
        Ok(true)
    }

    pub fn remove_tag(&mut self, id: &NoteId, tag: &str) -> DaybookResult<bool> {
        let before = self.require(id)?.tags.clone();
        let after: Vec<String> = before.iter().filter(|t| *t != tag).cloned().collect();
        if after.len() == before.len() {
            return Ok(false);
        }
        self.submit(id, Change::Tags { before, after });
        Ok(true)
    }

    pub fn add_comment(&mut self, id: &NoteId, text: &str) -> DaybookResult<Comment> {
        let before = self.require(id)?.comments.clone();
        let comment = Comment::new(text)?;
        let mut after = before.clone();
        after.push(comment.clone());
        self.submit(id, Change::Comments { before, after });
        Ok(comment)
    }

    pub fn remove_comment(&mut self, id: &NoteId, comment_id: &str) -> DaybookResult<bool> {
        let before = self.require(id)?.comments.clone();
        let after: Vec<Comment> = before
            .iter()
            .filter(|comment| comment.id != comment_id)
            .cloned()
            .collect();
        if after.len() == before.len() {
            return Ok(false);
        }
        self.submit(id, Change::Comments { before, after });
        Ok(true)
    }

    /// Removes the note immediately. An unconfirmed note is dropped together
    /// with its queued create and never reaches the store.
    pub fn delete_note(&mut self, id: &NoteId) -> DaybookResult<()> {
        self.require(id)?;
        self.notes.retain(|note| &note.id != id);
        self.queue.retain(|command| command.target() != id);

        if id.is_temp() {
            self.forget_liked(id);
            return Ok(());
        }

        self.queue.push_back(Command::Delete { id: id.clone() });
        Ok(())
    }

    /// Wipes the store, then the feed, the liked ledger and the snapshot.
    /// Not optimistic: nothing local changes if the store refuses.
    pub fn clear_all(&mut self) -> DaybookResult<()> {
        self.store.clear()?;
        self.notes.clear();
        self.queue.clear();
        self.liked.clear();
        self.cache.clear();
        self.cursor = 0;
        self.offset_shift = 0;
        self.has_more = false;
        self.paging = None;
        self.load_state = LoadState::Ready;
        Ok(())
    }

    /// Confirms every queued command. Edits discarded because an earlier
    /// edit they were built on failed count as rolled back.
    pub fn settle(&mut self) -> SettleReport {
        let mut report = SettleReport::default();
        let first_event = self.events.len();
        while let Some(confirmed) = self.settle_next() {
            if confirmed {
                report.confirmed += 1;
            }
        }
        report.rolled_back = self.events[first_event..]
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    SyncEvent::RolledBack { .. } | SyncEvent::ComposeFailed { .. }
                )
            })
            .count();
        report
    }

    /// Confirms the oldest queued command. Returns `None` when the queue is
    /// empty, otherwise whether the store accepted it.
    pub fn settle_next(&mut self) -> Option<bool> {
        let command = self.queue.pop_front()?;
        Some(match command {
            Command::Create {
                temp_id,
                note,
                draft,
            } => match self.store.create(&note) {
                Ok(stored) => {
                    self.adopt_created(&temp_id, stored);
                    true
                }
                Err(err) => {
                    self.reject_create(&temp_id, draft, err);
                    false
                }
            },
            Command::Mutate { id, change } => match change.confirm(self.store, &id) {
                Ok(stored) => {
                    debug!(id = %id, kind = ?change.kind(), "mutation confirmed");
                    self.adopt_stored(stored);
                    self.events.push(SyncEvent::Confirmed {
                        id,
                        kind: change.kind(),
                    });
                    true
                }
                Err(err) => {
                    self.roll_back(&id, &change, err);
                    false
                }
            },
            Command::Delete { id } => match self.store.delete(&id) {
                Ok(()) => {
                    debug!(id = %id, "delete confirmed");
                    self.offset_shift -= 1;
                    self.forget_liked(&id);
                    self.events.push(SyncEvent::Confirmed {
                        id,
                        kind: MutationKind::Delete,
                    });
                    true
                }
                Err(err) => {
                    warn!(id = %id, error = %err, "delete rejected; reloading feed");
                    self.events.push(SyncEvent::RolledBack {
                        id,
                        kind: MutationKind::Delete,
                        error: err,
                    });
                    if let Err(reload) = self.load_first_page() {
                        warn!(error = %reload, "reload after failed delete also failed");
                    }
                    false
                }
            },
        })
    }

    fn require(&self, id: &NoteId) -> DaybookResult<&Note> {
        self.note(id)
            .ok_or_else(|| DaybookError::usage(format!("note {id} is not in the loaded feed")))
    }

    fn submit(&mut self, id: &NoteId, change: Change) {
        self.apply_change(id, &change);
        self.queue.push_back(Command::Mutate {
            id: id.clone(),
            change,
        });
    }

    fn apply_change(&mut self, id: &NoteId, change: &Change) {
        if let Some(note) = self.notes.iter_mut().find(|note| &note.id == id) {
            change.apply(note);
        }
        if let Some(liked) = change.liked_after() {
            self.set_liked(id, liked);
        }
    }

    /// Restores the value captured before `change`. Later queued edits of
    /// the same kind on the note were computed from the rejected value, so
    /// they are discarded with it rather than confirmed.
    fn roll_back(&mut self, id: &NoteId, change: &Change, err: DaybookError) {
        let kind = change.kind();
        warn!(id = %id, kind = ?kind, error = %err, "rolling back optimistic change");
        if let Some(note) = self.notes.iter_mut().find(|note| &note.id == id) {
            change.revert(note);
        }
        if let Some(liked) = change.liked_before() {
            self.set_liked(id, liked);
        }

        let before = self.queue.len();
        self.queue.retain(|command| {
            !matches!(
                command,
                Command::Mutate { id: target, change: queued }
                    if target == id && queued.kind() == kind
            )
        });
        let discarded = before - self.queue.len();
        if discarded > 0 {
            warn!(id = %id, kind = ?kind, discarded, "discarding edits built on the rejected change");
        }

        self.reapply_queued(id);
        for _ in 0..=discarded {
            self.events.push(SyncEvent::RolledBack {
                id: id.clone(),
                kind,
                error: err.clone(),
            });
        }
    }

    fn adopt_created(&mut self, temp_id: &NoteId, mut stored: Note) {
        let id = stored.id.clone();
        debug!(temp_id = %temp_id, id = %id, "create confirmed");
        self.offset_shift += 1;

        for command in self.queue.iter_mut() {
            command.retarget(temp_id, &id);
        }
        if self.liked.remove(temp_id) {
            self.liked.insert(id.clone());
            self.cache.save_liked(&self.liked);
        }

        stored.liked = self.liked.contains(&id);
        let already_present = self.note(&id).is_some();
        match self.notes.iter().position(|note| &note.id == temp_id) {
            Some(index) if !already_present => self.notes[index] = stored,
            Some(index) => {
                self.notes.remove(index);
            }
            None if !already_present => self.notes.insert(0, stored),
            None => {}
        }
        self.reapply_queued(&id);

        self.events.push(SyncEvent::Created {
            temp_id: temp_id.clone(),
            id,
        });
    }

    fn reject_create(&mut self, temp_id: &NoteId, draft: NoteDraft, err: DaybookError) {
        warn!(temp_id = %temp_id, error = %err, "create rejected; restoring draft");
        self.notes.retain(|note| &note.id != temp_id);
        self.queue.retain(|command| command.target() != temp_id);
        self.forget_liked(temp_id);
        self.restored_draft = Some(draft);
        self.events.push(SyncEvent::ComposeFailed {
            temp_id: temp_id.clone(),
            error: err,
        });
    }

    /// Replaces the local copy with the stored row, then lays any still
    /// queued edits for it back on top.
    fn adopt_stored(&mut self, mut stored: Note) {
        let id = stored.id.clone();
        stored.liked = self.liked.contains(&id);
        if let Some(note) = self.notes.iter_mut().find(|note| note.id == id) {
            *note = stored;
        }
        self.reapply_queued(&id);
    }

    fn reapply_queued(&mut self, id: &NoteId) {
        let changes: Vec<Change> = self
            .queue
            .iter()
            .filter_map(|command| match command {
                Command::Mutate { id: target, change } if target == id => Some(change.clone()),
                _ => None,
            })
            .collect();
        for change in &changes {
            self.apply_change(id, change);
        }
    }

    /// Puts unconfirmed work back on top of a freshly fetched collection.
    fn overlay_pending(&mut self) {
        let mut drafts = Vec::new();
        let mut deleted = Vec::new();
        let mut changes = Vec::new();
        for command in &self.queue {
            match command {
                Command::Create { temp_id, note, .. } => {
                    drafts.push(note.clone().into_note(temp_id.clone()));
                }
                Command::Delete { id } => deleted.push(id.clone()),
                Command::Mutate { id, change } => changes.push((id.clone(), change.clone())),
            }
        }

        self.notes.retain(|note| !deleted.contains(&note.id));
        for mut draft in drafts {
            draft.liked = self.liked.contains(&draft.id);
            self.notes.insert(0, draft);
        }
        for (id, change) in &changes {
            if let Some(note) = self.notes.iter_mut().find(|note| &note.id == id) {
                change.apply(note);
            }
        }
    }

    fn annotate_all(&mut self) {
        for note in &mut self.notes {
            note.liked = self.liked.contains(&note.id);
        }
    }

    fn set_liked(&mut self, id: &NoteId, liked: bool) {
        let changed = if liked {
            self.liked.insert(id.clone())
        } else {
            self.liked.remove(id)
        };
        if changed {
            self.cache.save_liked(&self.liked);
        }
    }

    fn forget_liked(&mut self, id: &NoteId) {
        self.set_liked(id, false);
    }
}
