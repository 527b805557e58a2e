//! Overlap consistency for committed entries.
//!
//! A candidate interval is accepted for a user only if it shares no instant
//! with any of that user's other committed entries. Ranges are half-open, so
//! an entry ending at `t` and another starting at `t` merely touch.

use crate::model::Entry;
use crate::types::{EntryId, Span};

/// How a candidate interval collides with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapKind {
    /// `existing.start <= candidate.start < existing.end`
    StartInside,
    /// `existing.start < candidate.end <= existing.end`
    EndInside,
    /// `candidate.start <= existing.start && candidate.end >= existing.end`
    Contains,
}

/// Classifies how `candidate` overlaps `existing`, or `None` when they are disjoint.
///
/// When several cases hold, the first in declaration order wins.
pub const fn classify(candidate: Span, existing: Span) -> Option<OverlapKind> {
    let (cs, ce) = (candidate.start(), candidate.end());
    let (es, ee) = (existing.start(), existing.end());

    if es <= cs && cs < ee {
        Some(OverlapKind::StartInside)
    } else if es < ce && ce <= ee {
        Some(OverlapKind::EndInside)
    } else if cs <= es && ce >= ee {
        Some(OverlapKind::Contains)
    } else {
        None
    }
}

/// Returns the first entry that `candidate` would overlap.
///
/// `exclude` skips one entry, used when the candidate is the new shape of that
/// same entry. Entries with a corrupt (empty) stored range never match.
pub fn find_overlap<'a, I>(entries: I, candidate: Span, exclude: Option<EntryId>) -> Option<&'a Entry>
where
    I: IntoIterator<Item = &'a Entry>,
{
    entries
        .into_iter()
        .filter(|entry| Some(entry.id) != exclude)
        .find(|entry| {
            entry
                .span()
                .is_ok_and(|existing| classify(candidate, existing).is_some())
        })
}
