//! Async interval tracking service.
//!
//! [`Tracker`] owns the store and the live-update [`Broadcaster`]. Every
//! operation runs its store work on the blocking pool behind one lock, so the
//! overlap check and the write it guards are never interleaved with another
//! write. After a write that changed something, the owning user's subscribers
//! are notified.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, info};

use tm_core::{
    Analytics, Entry, EntryId, EntryOutcome, EntryPatch, ExportRecord, ImportSummary, NewEntry,
    NewRunningEntry, NewTag, RunningEntry, Span, StartOutcome, StopOutcome, Tag, TagId,
    TagOutcome, TagPatch, UserId,
};
use tm_db::{Database, DbError};
use tm_live::{Broadcaster, SubscriberId, Subscription};

/// Errors from the tracking service.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Db(#[from] DbError),

    /// The blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Join(#[from] JoinError),

    /// A previous store task panicked while holding the lock.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Interval tracking service.
///
/// Cheap to clone; clones share the store and the subscriber registry.
#[derive(Clone)]
pub struct Tracker {
    db: Arc<Mutex<Database>>,
    live: Broadcaster,
}

impl Tracker {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            live: Broadcaster::new(),
        }
    }

    /// Opens (or creates) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, TrackerError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, TrackerError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub const fn broadcaster(&self) -> &Broadcaster {
        &self.live
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, TrackerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T, DbError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut db = db.lock().map_err(|_| TrackerError::Poisoned)?;
            Ok(f(&mut *db)?)
        })
        .await?
    }

    fn changed(&self, user_id: UserId, what: &'static str) {
        let delivered = self.live.notify(user_id);
        debug!(%user_id, what, delivered, "data changed");
    }

    // ========== Users and tags ==========

    pub async fn create_user(&self) -> Result<UserId, TrackerError> {
        let user_id = self.with_db(Database::create_user).await?;
        info!(%user_id, "created user");
        Ok(user_id)
    }

    pub async fn list_tags(&self, user_id: UserId) -> Result<Vec<Tag>, TrackerError> {
        self.with_db(move |db| db.list_tags(user_id)).await
    }

    pub async fn create_tag(&self, user_id: UserId, tag: NewTag) -> Result<Tag, TrackerError> {
        let tag = self.with_db(move |db| db.create_tag(user_id, &tag)).await?;
        self.changed(user_id, "tag");
        Ok(tag)
    }

    pub async fn update_tag(
        &self,
        user_id: UserId,
        tag_id: TagId,
        patch: TagPatch,
    ) -> Result<TagOutcome, TrackerError> {
        let outcome = self
            .with_db(move |db| db.update_tag(user_id, tag_id, &patch))
            .await?;
        if matches!(outcome, TagOutcome::Updated(_)) {
            self.changed(user_id, "tag");
        }
        Ok(outcome)
    }

    // ========== Entries ==========

    /// Lists entries starting at or after `since`, newest first.
    pub async fn list_entries(
        &self,
        user_id: UserId,
        since: Option<i64>,
    ) -> Result<Vec<Entry>, TrackerError> {
        self.with_db(move |db| db.list_entries(user_id, since)).await
    }

    /// Read-only overlap lookup; `exclude` skips the entry being edited.
    pub async fn find_overlap(
        &self,
        user_id: UserId,
        candidate: Span,
        exclude: Option<EntryId>,
    ) -> Result<Option<Entry>, TrackerError> {
        self.with_db(move |db| db.find_overlapping_entry(user_id, candidate, exclude))
            .await
    }

    pub async fn create_entry(
        &self,
        user_id: UserId,
        entry: NewEntry,
    ) -> Result<EntryOutcome, TrackerError> {
        let outcome = self
            .with_db(move |db| db.create_entry(user_id, &entry))
            .await?;
        if outcome.is_accepted() {
            self.changed(user_id, "entry");
        }
        Ok(outcome)
    }

    pub async fn update_entry(
        &self,
        user_id: UserId,
        entry_id: EntryId,
        patch: EntryPatch,
    ) -> Result<EntryOutcome, TrackerError> {
        let outcome = self
            .with_db(move |db| db.update_entry(user_id, entry_id, &patch))
            .await?;
        if outcome.is_accepted() {
            self.changed(user_id, "entry");
        }
        Ok(outcome)
    }

    /// Deletes all committed entries of a user, returning how many were removed.
    pub async fn delete_all_entries(&self, user_id: UserId) -> Result<usize, TrackerError> {
        let deleted = self
            .with_db(move |db| db.delete_all_entries(user_id))
            .await?;
        if deleted > 0 {
            info!(%user_id, deleted, "deleted entries");
            self.changed(user_id, "entries");
        }
        Ok(deleted)
    }

    // ========== Running entry ==========

    pub async fn running_entry(&self, user_id: UserId) -> Result<Option<RunningEntry>, TrackerError> {
        self.with_db(move |db| db.running_entry(user_id)).await
    }

    /// Starts a running entry, replacing any existing one.
    pub async fn start_running(
        &self,
        user_id: UserId,
        entry: NewRunningEntry,
    ) -> Result<StartOutcome, TrackerError> {
        let outcome = self
            .with_db(move |db| db.start_running_entry(user_id, &entry))
            .await?;
        if matches!(outcome, StartOutcome::Started(_)) {
            self.changed(user_id, "running");
        }
        Ok(outcome)
    }

    /// Discards the running entry without committing it.
    pub async fn discard_running(&self, user_id: UserId) -> Result<bool, TrackerError> {
        let deleted = self
            .with_db(move |db| db.delete_running_entry(user_id))
            .await?;
        if deleted {
            self.changed(user_id, "running");
        }
        Ok(deleted)
    }

    /// Commits the running entry as `[start, end_time_utc)`.
    pub async fn stop_running(
        &self,
        user_id: UserId,
        end_time_utc: i64,
    ) -> Result<StopOutcome, TrackerError> {
        let outcome = self
            .with_db(move |db| db.stop_running_entry(user_id, end_time_utc))
            .await?;
        if matches!(outcome, StopOutcome::Committed(_)) {
            self.changed(user_id, "running");
        }
        Ok(outcome)
    }

    // ========== Analytics ==========

    /// Aggregates the user's entries relative to the current time.
    ///
    /// `utc_offset` is UTC minus local time, in seconds.
    pub async fn analytics(&self, user_id: UserId, utc_offset: i64) -> Result<Analytics, TrackerError> {
        self.analytics_at(user_id, utc_offset, Utc::now().timestamp())
            .await
    }

    /// Aggregates the user's entries relative to `now` (Unix seconds).
    pub async fn analytics_at(
        &self,
        user_id: UserId,
        utc_offset: i64,
        now: i64,
    ) -> Result<Analytics, TrackerError> {
        let (entries, tags) = self
            .with_db(move |db| Ok((db.list_entries(user_id, None)?, db.list_tags(user_id)?)))
            .await?;
        debug!(%user_id, entries = entries.len(), "aggregating analytics");
        Ok(tm_core::aggregate(&entries, &tags, now, utc_offset))
    }

    // ========== Bulk transfer ==========

    pub async fn export(&self, user_id: UserId) -> Result<Vec<ExportRecord>, TrackerError> {
        self.with_db(move |db| db.export_entries(user_id)).await
    }

    pub async fn import(
        &self,
        user_id: UserId,
        records: Vec<ExportRecord>,
    ) -> Result<ImportSummary, TrackerError> {
        let summary = self
            .with_db(move |db| db.import_entries(user_id, &records))
            .await?;
        if summary.tags_created > 0 || summary.entries_created > 0 {
            self.changed(user_id, "import");
        }
        Ok(summary)
    }

    // ========== Live updates ==========

    pub fn subscribe(&self, user_id: UserId) -> Subscription {
        self.live.subscribe(user_id)
    }

    pub fn unsubscribe(&self, user_id: UserId, id: SubscriberId) -> bool {
        self.live.unsubscribe(user_id, id)
    }
}
