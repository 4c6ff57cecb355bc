pub mod geo;
pub mod place;

pub use geo::{BoundingBox, GeoPoint};
pub use place::{CachedSuggestion, ResolvedLocation, Suggestion};
