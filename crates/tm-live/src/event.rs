//! The change signal pushed to live subscribers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A change signal delivered to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LiveEvent {
    /// The user's entries, running entry, or tags changed.
    DataUpdate,
}

impl LiveEvent {
    /// Event name as written on the wire.
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::DataUpdate => "data-update",
        }
    }

}

impl fmt::Display for LiveEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_event_name() {
        let json = serde_json::to_string(&LiveEvent::DataUpdate).unwrap();
        assert_eq!(json, "\"data-update\"");
        assert_eq!(LiveEvent::DataUpdate.to_string(), "data-update");
    }
}
