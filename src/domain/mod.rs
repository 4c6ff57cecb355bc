//! Domain identifiers for the places-search layer.
//!
//! Newtype wrappers keep provider place ids and billing session ids from being
//! mixed up with each other or with free-form query text.

pub mod events;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one billing session with the places provider.
///
/// Rendered as a version-4-shaped UUID, which is what the provider expects in
/// the `sessiontoken` parameter. Only the 122 random bits matter for billing;
/// the version and variant nibbles are fixed by [`SessionId::from_random_bytes`].
///
/// # Examples
///
/// ```rust
/// use bazaar_places::domain::SessionId;
///
/// let id = SessionId::from_random_bytes([0xAB; 16]);
/// let text = id.to_string();
/// assert_eq!(text.len(), 36);
/// assert_eq!(&text[14..15], "4");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Builds an id from 16 bytes of randomness, stamping the v4 version and
    /// RFC 4122 variant bits.
    #[must_use]
    pub fn from_random_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Opaque provider identifier of a place.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(String);

impl PlaceId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlaceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PlaceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_v4_shape() {
        let id = SessionId::from_random_bytes([0u8; 16]);
        assert_eq!(id.as_uuid().get_version_num(), 4);
        assert_eq!(id.as_uuid().get_variant(), uuid::Variant::RFC4122);
        assert_eq!(id.to_string(), "00000000-0000-4000-8000-000000000000");
    }

    #[test]
    fn session_ids_from_different_bytes_differ() {
        let a = SessionId::from_random_bytes([1u8; 16]);
        let b = SessionId::from_random_bytes([2u8; 16]);
        assert_ne!(a, b);
    }

    #[test]
    fn place_id_serializes_as_plain_string() {
        let id = PlaceId::from("ChIJ-abc");
        assert_eq!(id.as_str(), "ChIJ-abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ChIJ-abc\"");
        let back: PlaceId = serde_json::from_str("\"ChIJ-abc\"").unwrap();
        assert_eq!(back, id);
    }
}
