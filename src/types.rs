//! Basic type definitions for the chat relay
//!
//! Provides newtype wrappers for type safety:
//! - `SessionId`: UUID-based identifier that survives renames

use uuid::Uuid;

/// Unique session identifier (newtype pattern)
///
/// Display names can change through `\rename`; the id never does, so
/// events carry it instead of the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 hex characters, used to disambiguate colliding names
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_unique() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_short_id_length() {
        let id = SessionId::new();
        let short = id.short();
        assert_eq!(short.len(), 8);
        assert!(id.0.simple().to_string().starts_with(&short));
    }
}
