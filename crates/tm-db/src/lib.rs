//! Interval store for timeops.
//!
//! Provides persistence for users, tags, committed entries, and running
//! entries using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization (`tm-tracker` keeps it
//! behind a `Mutex`).
//!
//! # Consistency
//!
//! Every write that must validate before committing (entry create/update,
//! running entry start/stop, import) runs its check and its write inside one
//! `IMMEDIATE` transaction. The write lock is taken before the check reads, so
//! two connections cannot both pass an overlap check and then both commit.
//!
//! # Schema
//!
//! Times are stored as INTEGER Unix seconds. Committed entries carry a
//! `CHECK (end_time_utc > start_time_utc)` constraint and an index on
//! `(user_id, start_time_utc)` for range scans. `running_entries` is keyed by
//! `user_id`, which makes "at most one running entry per user" a schema fact.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use thiserror::Error;
use tracing::debug;

use tm_core::{
    Color, DEFAULT_TAG_NAME, Entry, EntryId, EntryOutcome, EntryPatch, ExportRecord, ExportTag,
    ImportSummary, NewEntry, NewRunningEntry, NewTag, RunningEntry, Span, StartOutcome,
    StopOutcome, Tag, TagId, TagOutcome, TagPatch, UserId, ValidationError, check_timestamp,
    find_overlap,
};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The user does not exist.
    #[error("unknown user {0}")]
    UnknownUser(UserId),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

const ENTRY_COLUMNS: &str = "id, user_id, name, start_time_utc, end_time_utc, tag_id";

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                color TEXT NOT NULL DEFAULT 'slate',
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_tags_user ON tags(user_id);

            -- Committed intervals: [start_time_utc, end_time_utc) in Unix seconds
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                start_time_utc INTEGER NOT NULL,
                end_time_utc INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                CHECK (end_time_utc > start_time_utc),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id)
            );

            CREATE INDEX IF NOT EXISTS idx_entries_user_start ON entries(user_id, start_time_utc);

            -- At most one open-ended interval per user
            CREATE TABLE IF NOT EXISTS running_entries (
                user_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                start_time_utc INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id)
            );
            ",
        )?;
        Ok(())
    }

    fn write_transaction(&mut self) -> Result<Transaction<'_>, DbError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    // ========== Users ==========

    /// Creates a user together with the default tag every user starts with.
    pub fn create_user(&mut self) -> Result<UserId, DbError> {
        let tx = self.write_transaction()?;
        tx.execute(
            "INSERT INTO users (created_at) VALUES (?)",
            [format_timestamp(Utc::now())],
        )?;
        let user_id = UserId::new(tx.last_insert_rowid());
        insert_tag(&tx, user_id, DEFAULT_TAG_NAME, Color::default())?;
        tx.commit()?;
        debug!(%user_id, "created user");
        Ok(user_id)
    }

    pub fn user_exists(&self, user_id: UserId) -> Result<bool, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM users WHERE id = ?",
                [user_id.get()],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    // ========== Tags ==========

    /// Lists a user's tags ordered by ID.
    pub fn list_tags(&self, user_id: UserId) -> Result<Vec<Tag>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, color FROM tags WHERE user_id = ? ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([user_id.get()], tag_from_row)?;
        let mut tags = Vec::new();
        for row in rows {
            tags.push(row?);
        }
        Ok(tags)
    }

    pub fn create_tag(&mut self, user_id: UserId, tag: &NewTag) -> Result<Tag, DbError> {
        if !self.user_exists(user_id)? {
            return Err(DbError::UnknownUser(user_id));
        }
        let color = tag.color.unwrap_or_default();
        let id = insert_tag(&self.conn, user_id, &tag.name, color)?;
        Ok(Tag {
            id,
            user_id,
            name: tag.name.clone(),
            color,
        })
    }

    /// Updates a tag owned by `user_id`. Tags owned by anyone else are `NotFound`.
    pub fn update_tag(
        &mut self,
        user_id: UserId,
        tag_id: TagId,
        patch: &TagPatch,
    ) -> Result<TagOutcome, DbError> {
        let tx = self.write_transaction()?;
        let Some(existing) = tag_in(&tx, user_id, tag_id)? else {
            return Ok(TagOutcome::NotFound);
        };
        let updated = Tag {
            name: patch.name.clone().unwrap_or(existing.name),
            color: patch.color.unwrap_or(existing.color),
            ..existing
        };
        tx.execute(
            "UPDATE tags SET name = ?, color = ? WHERE id = ? AND user_id = ?",
            params![updated.name, updated.color.as_str(), tag_id.get(), user_id.get()],
        )?;
        tx.commit()?;
        Ok(TagOutcome::Updated(updated))
    }

    // ========== Entries ==========

    /// Lists a user's entries starting at or after `since`, newest first.
    pub fn list_entries(
        &self,
        user_id: UserId,
        since: Option<i64>,
    ) -> Result<Vec<Entry>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {ENTRY_COLUMNS}
            FROM entries
            WHERE user_id = ? AND start_time_utc >= ?
            ORDER BY start_time_utc DESC, id DESC
            "
        ))?;
        let rows = stmt.query_map(
            params![user_id.get(), since.unwrap_or(i64::MIN)],
            entry_from_row,
        )?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Looks up one entry, scoped to its owner.
    pub fn entry(&self, user_id: UserId, entry_id: EntryId) -> Result<Option<Entry>, DbError> {
        entry_in(&self.conn, user_id, entry_id)
    }

    /// Returns the first committed entry that `candidate` would overlap.
    ///
    /// Pure read. `exclude` skips the entry being updated.
    pub fn find_overlapping_entry(
        &self,
        user_id: UserId,
        candidate: Span,
        exclude: Option<EntryId>,
    ) -> Result<Option<Entry>, DbError> {
        overlapping_entry(&self.conn, user_id, candidate, exclude)
    }

    /// Commits a new entry unless it overlaps an existing one.
    pub fn create_entry(
        &mut self,
        user_id: UserId,
        entry: &NewEntry,
    ) -> Result<EntryOutcome, DbError> {
        let span = match entry.span() {
            Ok(span) => span,
            Err(err) => return Ok(EntryOutcome::Invalid(err)),
        };

        let tx = self.write_transaction()?;
        if tag_in(&tx, user_id, entry.tag_id)?.is_none() {
            return Ok(EntryOutcome::UnknownTag(entry.tag_id));
        }
        if let Some(conflict) = overlapping_entry(&tx, user_id, span, None)? {
            return Ok(EntryOutcome::Conflict(conflict));
        }
        let id = insert_entry(&tx, user_id, &entry.name, span, entry.tag_id)?;
        tx.commit()?;

        Ok(EntryOutcome::Accepted(Entry {
            id,
            user_id,
            name: entry.name.clone(),
            start_time_utc: span.start(),
            end_time_utc: span.end(),
            tag_id: entry.tag_id,
        }))
    }

    /// Applies `patch` to an entry owned by `user_id`.
    ///
    /// When the patch moves either edge, the merged interval is re-checked
    /// against every other entry of the user before anything is written.
    pub fn update_entry(
        &mut self,
        user_id: UserId,
        entry_id: EntryId,
        patch: &EntryPatch,
    ) -> Result<EntryOutcome, DbError> {
        let tx = self.write_transaction()?;
        let Some(existing) = entry_in(&tx, user_id, entry_id)? else {
            return Ok(EntryOutcome::NotFound);
        };
        if let Some(tag_id) = patch.tag_id {
            if tag_in(&tx, user_id, tag_id)?.is_none() {
                return Ok(EntryOutcome::UnknownTag(tag_id));
            }
        }

        let merged = patch.apply(&existing);
        if patch.touches_times() {
            let span = match merged.span() {
                Ok(span) => span,
                Err(err) => return Ok(EntryOutcome::Invalid(err)),
            };
            if let Some(conflict) = overlapping_entry(&tx, user_id, span, Some(entry_id))? {
                return Ok(EntryOutcome::Conflict(conflict));
            }
        }

        tx.execute(
            "
            UPDATE entries
            SET name = ?, start_time_utc = ?, end_time_utc = ?, tag_id = ?
            WHERE id = ? AND user_id = ?
            ",
            params![
                merged.name,
                merged.start_time_utc,
                merged.end_time_utc,
                merged.tag_id.get(),
                entry_id.get(),
                user_id.get(),
            ],
        )?;
        tx.commit()?;
        Ok(EntryOutcome::Accepted(merged))
    }

    /// Deletes every committed entry of a user, returning how many were removed.
    pub fn delete_all_entries(&mut self, user_id: UserId) -> Result<usize, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM entries WHERE user_id = ?", [user_id.get()])?;
        Ok(deleted)
    }

    // ========== Running entry ==========

    pub fn running_entry(&self, user_id: UserId) -> Result<Option<RunningEntry>, DbError> {
        running_in(&self.conn, user_id)
    }

    /// Replaces any running entry of the user with a new one.
    pub fn start_running_entry(
        &mut self,
        user_id: UserId,
        entry: &NewRunningEntry,
    ) -> Result<StartOutcome, DbError> {
        if let Err(err) = check_timestamp(entry.start_time_utc) {
            return Ok(StartOutcome::Invalid(err));
        }
        let tx = self.write_transaction()?;
        if tag_in(&tx, user_id, entry.tag_id)?.is_none() {
            return Ok(StartOutcome::UnknownTag(entry.tag_id));
        }
        let replaced = tx.execute(
            "DELETE FROM running_entries WHERE user_id = ?",
            [user_id.get()],
        )?;
        tx.execute(
            "INSERT INTO running_entries (user_id, name, start_time_utc, tag_id) VALUES (?, ?, ?, ?)",
            params![user_id.get(), entry.name, entry.start_time_utc, entry.tag_id.get()],
        )?;
        tx.commit()?;
        debug!(%user_id, replaced = replaced > 0, "started running entry");

        Ok(StartOutcome::Started(RunningEntry {
            user_id,
            name: entry.name.clone(),
            start_time_utc: entry.start_time_utc,
            tag_id: entry.tag_id,
        }))
    }

    /// Removes the running entry without committing it. Returns whether one existed.
    pub fn delete_running_entry(&mut self, user_id: UserId) -> Result<bool, DbError> {
        let deleted = self.conn.execute(
            "DELETE FROM running_entries WHERE user_id = ?",
            [user_id.get()],
        )?;
        Ok(deleted > 0)
    }

    /// Commits the running entry as `[start, end_time_utc)` and clears it.
    ///
    /// The promoted interval goes through the same overlap check as any new
    /// entry; on rejection the running entry is left untouched.
    pub fn stop_running_entry(
        &mut self,
        user_id: UserId,
        end_time_utc: i64,
    ) -> Result<StopOutcome, DbError> {
        let tx = self.write_transaction()?;
        let Some(running) = running_in(&tx, user_id)? else {
            return Ok(StopOutcome::NotRunning);
        };
        let span = match Span::new(running.start_time_utc, end_time_utc) {
            Ok(span) => span,
            Err(ValidationError::EmptyInterval { .. }) => {
                return Ok(StopOutcome::EmptyInterval {
                    start_time_utc: running.start_time_utc,
                    end_time_utc,
                });
            }
            Err(err) => return Ok(StopOutcome::Invalid(err)),
        };
        if let Some(conflict) = overlapping_entry(&tx, user_id, span, None)? {
            return Ok(StopOutcome::Conflict(conflict));
        }

        let id = insert_entry(&tx, user_id, &running.name, span, running.tag_id)?;
        tx.execute(
            "DELETE FROM running_entries WHERE user_id = ?",
            [user_id.get()],
        )?;
        tx.commit()?;

        Ok(StopOutcome::Committed(Entry {
            id,
            user_id,
            name: running.name,
            start_time_utc: span.start(),
            end_time_utc: span.end(),
            tag_id: running.tag_id,
        }))
    }

    // ========== Bulk transfer ==========

    /// Exports every entry of a user with its tag, oldest first.
    pub fn export_entries(&self, user_id: UserId) -> Result<Vec<ExportRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT e.name, e.start_time_utc, e.end_time_utc, t.name, t.color
            FROM entries e
            JOIN tags t ON t.id = e.tag_id
            WHERE e.user_id = ?
            ORDER BY e.start_time_utc ASC, e.id ASC
            ",
        )?;
        let rows = stmt.query_map([user_id.get()], |row| {
            Ok(ExportRecord {
                name: row.get(0)?,
                start_time_utc: row.get(1)?,
                end_time_utc: row.get(2)?,
                tag: ExportTag {
                    name: row.get(3)?,
                    color: color_from_row(row, 4)?,
                },
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Imports records for a user, reusing tags by name.
    ///
    /// Records that are empty, out of range, or overlap an already committed entry (including
    /// one imported earlier in the same batch) are skipped and reported in
    /// [`ImportSummary::errors`]; they never abort the batch.
    pub fn import_entries(
        &mut self,
        user_id: UserId,
        records: &[ExportRecord],
    ) -> Result<ImportSummary, DbError> {
        if !self.user_exists(user_id)? {
            return Err(DbError::UnknownUser(user_id));
        }

        let mut tag_ids: HashMap<String, TagId> = HashMap::new();
        for tag in self.list_tags(user_id)? {
            tag_ids.entry(tag.name).or_insert(tag.id);
        }

        let mut summary = ImportSummary::default();
        let tx = self.write_transaction()?;

        for record in records {
            let name = import_tag_name(&record.tag);
            if !tag_ids.contains_key(name) {
                let id = insert_tag(&tx, user_id, name, record.tag.color)?;
                tag_ids.insert(name.to_string(), id);
                summary.tags_created += 1;
            }
        }

        for record in records {
            let Some(&tag_id) = tag_ids.get(import_tag_name(&record.tag)) else {
                continue;
            };
            let span = match Span::new(record.start_time_utc, record.end_time_utc) {
                Ok(span) => span,
                Err(ValidationError::EmptyInterval { .. }) => {
                    summary.errors.push(format!(
                        "Entry \"{}\" has an empty interval ({} - {})",
                        record.name,
                        format_unix(record.start_time_utc),
                        format_unix(record.end_time_utc),
                    ));
                    continue;
                }
                Err(err) => {
                    summary.errors.push(format!("Entry \"{}\" is invalid: {err}", record.name));
                    continue;
                }
            };
            if let Some(conflict) = overlapping_entry(&tx, user_id, span, None)? {
                summary.errors.push(format!(
                    "Entry \"{}\" overlaps with existing entry \"{}\" ({} - {})",
                    record.name,
                    conflict.name,
                    format_unix(conflict.start_time_utc),
                    format_unix(conflict.end_time_utc),
                ));
                continue;
            }
            insert_entry(&tx, user_id, &record.name, span, tag_id)?;
            summary.entries_created += 1;
        }

        tx.commit()?;
        debug!(
            %user_id,
            tags_created = summary.tags_created,
            entries_created = summary.entries_created,
            skipped = summary.errors.len(),
            "imported entries"
        );
        Ok(summary)
    }
}

fn import_tag_name(tag: &ExportTag) -> &str {
    if tag.name.trim().is_empty() {
        DEFAULT_TAG_NAME
    } else {
        &tag.name
    }
}

fn insert_tag(conn: &Connection, user_id: UserId, name: &str, color: Color) -> Result<TagId, DbError> {
    conn.execute(
        "INSERT INTO tags (user_id, name, color) VALUES (?, ?, ?)",
        params![user_id.get(), name, color.as_str()],
    )?;
    Ok(TagId::new(conn.last_insert_rowid()))
}

fn insert_entry(
    conn: &Connection,
    user_id: UserId,
    name: &str,
    span: Span,
    tag_id: TagId,
) -> Result<EntryId, DbError> {
    conn.execute(
        "
        INSERT INTO entries (user_id, name, start_time_utc, end_time_utc, tag_id)
        VALUES (?, ?, ?, ?, ?)
        ",
        params![user_id.get(), name, span.start(), span.end(), tag_id.get()],
    )?;
    Ok(EntryId::new(conn.last_insert_rowid()))
}

fn tag_in(conn: &Connection, user_id: UserId, tag_id: TagId) -> Result<Option<Tag>, DbError> {
    Ok(conn
        .query_row(
            "SELECT id, user_id, name, color FROM tags WHERE id = ? AND user_id = ?",
            [tag_id.get(), user_id.get()],
            tag_from_row,
        )
        .optional()?)
}

fn entry_in(conn: &Connection, user_id: UserId, entry_id: EntryId) -> Result<Option<Entry>, DbError> {
    Ok(conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ? AND user_id = ?"),
            [entry_id.get(), user_id.get()],
            entry_from_row,
        )
        .optional()?)
}

fn running_in(conn: &Connection, user_id: UserId) -> Result<Option<RunningEntry>, DbError> {
    Ok(conn
        .query_row(
            "SELECT user_id, name, start_time_utc, tag_id FROM running_entries WHERE user_id = ?",
            [user_id.get()],
            |row| {
                Ok(RunningEntry {
                    user_id: UserId::new(row.get(0)?),
                    name: row.get(1)?,
                    start_time_utc: row.get(2)?,
                    tag_id: TagId::new(row.get(3)?),
                })
            },
        )
        .optional()?)
}

/// Narrows the scan to entries intersecting `candidate` through the
/// `(user_id, start_time_utc)` index, then lets the core classifier decide.
fn overlapping_entry(
    conn: &Connection,
    user_id: UserId,
    candidate: Span,
    exclude: Option<EntryId>,
) -> Result<Option<Entry>, DbError> {
    let mut stmt = conn.prepare_cached(&format!(
        "
        SELECT {ENTRY_COLUMNS}
        FROM entries
        WHERE user_id = ? AND start_time_utc < ? AND end_time_utc > ?
        ORDER BY start_time_utc ASC, id ASC
        "
    ))?;
    let rows = stmt.query_map(
        params![user_id.get(), candidate.end(), candidate.start()],
        entry_from_row,
    )?;
    let mut nearby = Vec::new();
    for row in rows {
        nearby.push(row?);
    }
    Ok(find_overlap(&nearby, candidate, exclude).cloned())
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: EntryId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        name: row.get(2)?,
        start_time_utc: row.get(3)?,
        end_time_utc: row.get(4)?,
        tag_id: TagId::new(row.get(5)?),
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: TagId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        name: row.get(2)?,
        color: color_from_row(row, 3)?,
    })
}

fn color_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<Color> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn format_unix(seconds: i64) -> String {
    DateTime::from_timestamp(seconds, 0).map_or_else(|| seconds.to_string(), format_timestamp)
}
