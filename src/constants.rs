pub mod places {

    pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";

    pub const SEARCH_RADIUS_KM: f64 = 50.0;

    pub const DETAILS_FIELDS: &str = "geometry,formatted_address";

    pub const USER_AGENT: &str = "BazaarPlaces/0.1";
}

pub mod cache {

    pub const TTL_HOURS: u64 = 24;

    pub const MAX_ENTRIES: usize = 100;
}

pub mod limits {

    pub const MAX_DISPLAYED_RESULTS: usize = 10;
}
