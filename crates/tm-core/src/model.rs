//! Tags, entries, running entries, and the outcomes of writing them.

use serde::{Deserialize, Serialize};

use crate::types::{Color, EntryId, Span, TagId, UserId, ValidationError};

/// Name given to the tag every new user starts with.
pub const DEFAULT_TAG_NAME: &str = "No Project";

/// A user-owned label used to categorize entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub user_id: UserId,
    pub name: String,
    pub color: Color,
}

/// Fields for a new tag. A missing color falls back to [`Color::default`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewTag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

/// Partial tag update; `None` keeps the stored value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

/// A committed, closed interval.
///
/// Invariant: `end_time_utc > start_time_utc`. For one user, committed entries
/// never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub user_id: UserId,
    pub name: String,
    pub start_time_utc: i64,
    pub end_time_utc: i64,
    pub tag_id: TagId,
}

impl Entry {
    /// Length in seconds, saturating for rows written outside [`Span`].
    pub const fn duration_secs(&self) -> i64 {
        self.end_time_utc.saturating_sub(self.start_time_utc)
    }

    /// The stored range as a [`Span`].
    pub fn span(&self) -> Result<Span, ValidationError> {
        Span::new(self.start_time_utc, self.end_time_utc)
    }
}

/// Fields for a new committed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub name: String,
    pub start_time_utc: i64,
    pub end_time_utc: i64,
    pub tag_id: TagId,
}

impl NewEntry {
    pub fn span(&self) -> Result<Span, ValidationError> {
        Span::new(self.start_time_utc, self.end_time_utc)
    }
}

/// Partial entry update; `None` keeps the stored value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_utc: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time_utc: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<TagId>,
}

impl EntryPatch {
    /// Whether the patch moves either edge of the interval.
    pub const fn touches_times(&self) -> bool {
        self.start_time_utc.is_some() || self.end_time_utc.is_some()
    }

    /// Merges the patch over `entry`, returning the entry as it would be stored.
    pub fn apply(&self, entry: &Entry) -> Entry {
        Entry {
            id: entry.id,
            user_id: entry.user_id,
            name: self.name.clone().unwrap_or_else(|| entry.name.clone()),
            start_time_utc: self.start_time_utc.unwrap_or(entry.start_time_utc),
            end_time_utc: self.end_time_utc.unwrap_or(entry.end_time_utc),
            tag_id: self.tag_id.unwrap_or(entry.tag_id),
        }
    }
}

/// The single in-progress interval a user may have. It has no end time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningEntry {
    pub user_id: UserId,
    pub name: String,
    pub start_time_utc: i64,
    pub tag_id: TagId,
}

/// Fields for starting a running entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRunningEntry {
    pub name: String,
    pub start_time_utc: i64,
    pub tag_id: TagId,
}

/// Result of creating or updating a committed entry.
///
/// Only the `Accepted` variant wrote anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Accepted(Entry),
    /// The candidate overlaps this already committed entry.
    Conflict(Entry),
    /// The target entry does not exist or belongs to another user.
    NotFound,
    /// The referenced tag does not exist or belongs to another user.
    UnknownTag(TagId),
    Invalid(ValidationError),
}

impl EntryOutcome {
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Result of starting a running entry. Starting never conflicts; it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(RunningEntry),
    UnknownTag(TagId),
    /// The start time is out of range; nothing changed.
    Invalid(ValidationError),
}

/// Result of promoting the running entry into a committed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The running entry was removed and this entry committed in its place.
    Committed(Entry),
    /// The finished interval would overlap this entry; nothing changed.
    Conflict(Entry),
    NotRunning,
    /// The end time is not after the running entry's start; nothing changed.
    EmptyInterval { start_time_utc: i64, end_time_utc: i64 },
    /// The end time is out of range; nothing changed.
    Invalid(ValidationError),
}

/// Result of updating a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    Updated(Tag),
    NotFound,
}

/// Tag reference carried by an exported entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTag {
    pub name: String,
    #[serde(default)]
    pub color: Color,
}

/// A committed entry detached from row IDs, for bulk transfer between users
/// or databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub name: String,
    pub start_time_utc: i64,
    pub end_time_utc: i64,
    pub tag: ExportTag,
}

/// What a bulk import did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub tags_created: usize,
    pub entries_created: usize,
    /// One line per skipped record or tag.
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> Entry {
        Entry {
            id: EntryId::new(1),
            user_id: UserId::new(1),
            name: "Review".to_string(),
            start_time_utc: 100,
            end_time_utc: 200,
            tag_id: TagId::new(3),
        }
    }

    #[test]
    fn patch_without_times_does_not_touch_times() {
        let patch = EntryPatch {
            name: Some("Renamed".to_string()),
            ..EntryPatch::default()
        };
        assert!(!patch.touches_times());
        let merged = patch.apply(&entry());
        assert_eq!(merged.name, "Renamed");
        assert_eq!(merged.start_time_utc, 100);
        assert_eq!(merged.end_time_utc, 200);
    }

    #[test]
    fn patch_merges_single_edge_with_stored_value() {
        let patch = EntryPatch {
            end_time_utc: Some(500),
            ..EntryPatch::default()
        };
        assert!(patch.touches_times());
        let merged = patch.apply(&entry());
        assert_eq!(merged.span().unwrap(), Span::new(100, 500).unwrap());
        assert_eq!(merged.name, "Review");
        assert_eq!(merged.tag_id, TagId::new(3));
    }

    #[test]
    fn merged_patch_can_invert_the_interval() {
        let patch = EntryPatch {
            start_time_utc: Some(250),
            ..EntryPatch::default()
        };
        assert!(patch.apply(&entry()).span().is_err());
    }

    #[test]
    fn export_record_defaults_missing_color() {
        let json = r#"{
            "name": "Standup",
            "start_time_utc": 10,
            "end_time_utc": 20,
            "tag": {"name": "Meetings"}
        }"#;
        let record: ExportRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.tag.color, Color::Slate);
    }
}
