//! Strongly-typed identifiers for the cadre runtime.
//!
//! Actors are tracked in an arena keyed by stable identifiers rather than by
//! object references, so parents and children refer to each other through
//! these ids. Each identifier type is a thin wrapper around a UUID with a
//! phantom type parameter to keep different kinds of ids apart.
//!
//! # Examples
//!
//! ```
//! use cadre_core::id::ActorId;
//! use std::str::FromStr;
//!
//! let actor_id = ActorId::new();
//! let parsed = ActorId::from_str(&actor_id.to_string()).unwrap();
//! assert_eq!(actor_id, parsed);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::{Ord, PartialOrd};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A type-safe identifier based on UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Id<T> {
    uuid: Uuid,
    #[serde(skip)]
    _marker: std::marker::PhantomData<T>,
}

impl<T> Id<T> {
    /// Create a new random identifier.
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Create an identifier from a specific UUID.
    ///
    /// # Examples
    ///
    /// ```
    /// use cadre_core::id::ActorId;
    /// use uuid::Uuid;
    ///
    /// let uuid = Uuid::new_v4();
    /// let id = ActorId::from_uuid(uuid);
    /// assert_eq!(id.uuid(), uuid);
    /// ```
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The first eight hex digits of the id, used to keep log lines readable.
    pub fn short(&self) -> String {
        let mut simple = self.uuid.simple().to_string();
        simple.truncate(8);
        simple
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl<T> FromStr for Id<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_uuid(Uuid::parse_str(s)?))
    }
}

/// Marker type for actors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorMarker;
/// Identifier for an actor record in the actor system arena.
pub type ActorId = Id<ActorMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_new() {
        let id1 = ActorId::new();
        let id2 = ActorId::new();
        assert_ne!(id1, id2, "Generated IDs should be unique");
    }

    #[test]
    fn test_id_from_str() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id = ActorId::from_str(uuid_str).unwrap();
        assert_eq!(id.to_string(), uuid_str);
        assert_eq!(id.short(), "550e8400");
    }

    #[test]
    fn test_id_from_str_invalid() {
        assert!(ActorId::from_str("not-a-uuid").is_err());
    }

    #[test]
    fn test_id_serde() {
        let id = ActorId::new();
        let serialized = serde_json::to_string(&id).unwrap();
        let deserialized: ActorId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(id, deserialized);
    }
}
