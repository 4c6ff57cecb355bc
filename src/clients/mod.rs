pub mod places;

pub use places::{PlacesApi, PlacesClient, PlacesError};
