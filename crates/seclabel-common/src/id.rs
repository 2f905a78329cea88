//! Security session identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque security session ID.
///
/// Sessions are internal to the daemon and own no wire format, so ids are
/// only ever generated, never parsed from external input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session ID.
    ///
    /// The ID is a 12-character hex string derived from a UUID v4.
    #[must_use]
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let hex = hex::encode(&uuid.as_bytes()[..6]);
        Self(hex)
    }

    /// Get the session ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let id1 = SessionId::generate();
        let id2 = SessionId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn generated_ids_are_short_hex() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), 12);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
