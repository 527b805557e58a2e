//! Core type definitions with validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// An identifier was not a positive integer.
    #[error("invalid {field}: {value}")]
    InvalidId { field: &'static str, value: String },

    /// Unknown tag color.
    #[error("unknown color: {value} (expected one of {})", Color::names())]
    UnknownColor { value: String },

    /// The interval does not end after it starts.
    #[error("end time {end} must be after start time {start}")]
    EmptyInterval { start: i64, end: i64 },

    /// A timestamp lies outside years 1 through 9999.
    #[error("timestamp {value} is out of range (years 1 through 9999)")]
    TimestampOutOfRange { value: i64 },

    /// A UTC offset beyond fourteen hours either way.
    #[error("UTC offset {value} is out of range (at most 50400 seconds either way)")]
    UtcOffsetOutOfRange { value: i64 },
}

/// 0001-01-01T00:00:00Z in Unix seconds.
pub const MIN_TIMESTAMP: i64 = -62_135_596_800;
/// 9999-12-31T23:59:59Z in Unix seconds.
pub const MAX_TIMESTAMP: i64 = 253_402_300_799;

/// Rejects timestamps outside [`MIN_TIMESTAMP`]..=[`MAX_TIMESTAMP`].
pub const fn check_timestamp(value: i64) -> Result<i64, ValidationError> {
    if value < MIN_TIMESTAMP || value > MAX_TIMESTAMP {
        return Err(ValidationError::TimestampOutOfRange { value });
    }
    Ok(value)
}

/// Generates an integer ID newtype with common trait implementations.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw row ID.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw row ID.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().parse::<i64>() {
                    Ok(id) if id > 0 => Ok(Self(id)),
                    _ => Err(ValidationError::InvalidId {
                        field: $field_name,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

define_id!(
    /// Identifies a user. Every other record is owned by exactly one user.
    UserId, "user ID"
);

define_id!(
    /// Identifies a tag.
    TagId, "tag ID"
);

define_id!(
    /// Identifies a committed entry.
    EntryId, "entry ID"
);

/// Fixed tag color palette.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    #[default]
    Slate,
    Red,
    Amber,
    Lime,
    Emerald,
    Cyan,
    Blue,
    Violet,
    Fuchsia,
}

impl Color {
    /// Every palette color, in display order.
    pub const ALL: [Self; 9] = [
        Self::Slate,
        Self::Red,
        Self::Amber,
        Self::Lime,
        Self::Emerald,
        Self::Cyan,
        Self::Blue,
        Self::Violet,
        Self::Fuchsia,
    ];

    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Slate => "slate",
            Self::Red => "red",
            Self::Amber => "amber",
            Self::Lime => "lime",
            Self::Emerald => "emerald",
            Self::Cyan => "cyan",
            Self::Blue => "blue",
            Self::Violet => "violet",
            Self::Fuchsia => "fuchsia",
        }
    }

    fn names() -> String {
        Self::ALL
            .iter()
            .map(Self::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Color {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|color| color.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownColor {
                value: s.to_string(),
            })
    }
}

/// A half-open time range `[start, end)` in Unix seconds.
///
/// Construction guarantees `end > start`, so a `Span` is never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    start: i64,
    end: i64,
}

impl Span {
    /// Creates a span, rejecting out-of-range times and empty or inverted
    /// ranges.
    pub fn new(start: i64, end: i64) -> Result<Self, ValidationError> {
        check_timestamp(start)?;
        check_timestamp(end)?;
        if end <= start {
            return Err(ValidationError::EmptyInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub const fn start(self) -> i64 {
        self.start
    }

    pub const fn end(self) -> i64 {
        self.end
    }

    /// Length in seconds.
    pub const fn duration_secs(self) -> i64 {
        self.end.saturating_sub(self.start)
    }
}
