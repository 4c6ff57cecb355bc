use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::PlaceId;

/// One autocomplete candidate as shown in the result list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub description: String,
    pub place_id: PlaceId,
    pub main_text: String,
    pub secondary_text: String,
}

impl Suggestion {
    #[must_use]
    pub fn new(description: impl Into<String>, place_id: impl Into<PlaceId>) -> Self {
        let description = description.into();
        let (main_text, secondary_text) = description
            .split_once(", ")
            .map_or_else(
                || (description.clone(), String::new()),
                |(main, rest)| (main.to_string(), rest.to_string()),
            );

        Self {
            description,
            place_id: place_id.into(),
            main_text,
            secondary_text,
        }
    }
}

/// A suggestion stored in the query cache, stamped with its insertion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedSuggestion {
    #[serde(flatten)]
    pub suggestion: Suggestion,
    pub cached_at: DateTime<Utc>,
}

impl CachedSuggestion {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now - self.cached_at >= ttl
    }
}

impl From<CachedSuggestion> for Suggestion {
    fn from(cached: CachedSuggestion) -> Self {
        cached.suggestion
    }
}

/// Final product of a selection: a coordinate paired with the text the user picked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestion_splits_description_for_display() {
        let s = Suggestion::new("Amsterdam, North Holland, Netherlands", "p1");
        assert_eq!(s.main_text, "Amsterdam");
        assert_eq!(s.secondary_text, "North Holland, Netherlands");

        let bare = Suggestion::new("Atlantis", "p2");
        assert_eq!(bare.main_text, "Atlantis");
        assert!(bare.secondary_text.is_empty());
    }

    #[test]
    fn expiry_is_inclusive_of_ttl() {
        let now = Utc::now();
        let cached = CachedSuggestion {
            suggestion: Suggestion::new("Paris, France", "p"),
            cached_at: now,
        };
        let ttl = TimeDelta::hours(24);

        assert!(!cached.is_expired(now + TimeDelta::hours(23), ttl));
        assert!(cached.is_expired(now + ttl, ttl));
    }
}
