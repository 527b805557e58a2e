//! Core domain logic for timeops.
//!
//! This crate contains the fundamental types and pure logic for:
//! - Overlap consistency: deciding whether a candidate interval may be committed
//! - Analytics: day/week/month buckets and per-tag totals over entry history

pub mod analytics;
pub mod model;
pub mod overlap;
pub mod types;

pub use analytics::{
    Analytics, Anchors, MAX_UTC_OFFSET, Row, aggregate, check_utc_offset, format_hhmm,
};
pub use model::{
    DEFAULT_TAG_NAME, Entry, EntryOutcome, EntryPatch, ExportRecord, ExportTag, ImportSummary,
    NewEntry, NewRunningEntry, NewTag, RunningEntry, StartOutcome, StopOutcome, Tag, TagOutcome,
    TagPatch,
};
pub use overlap::{OverlapKind, classify, find_overlap};
pub use types::{
    Color, EntryId, MAX_TIMESTAMP, MIN_TIMESTAMP, Span, TagId, UserId, ValidationError,
    check_timestamp,
};
