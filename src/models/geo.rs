use serde::{Deserialize, Serialize};

/// Kilometres per degree of latitude (equirectangular approximation).
const KM_PER_DEGREE_LAT: f64 = 110.574;

/// Kilometres per degree of longitude at the equator.
const KM_PER_DEGREE_LNG_EQUATOR: f64 = 111.320;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// `lat,lng` as the provider expects it.
    #[must_use]
    pub fn to_param(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Box of roughly `radius_km` in every direction around `center`.
    ///
    /// Uses degree approximations rather than great-circle math; accuracy only
    /// needs to be good enough for a provider-side search filter.
    #[must_use]
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE_LAT;
        let lng_delta =
            radius_km / (KM_PER_DEGREE_LNG_EQUATOR * center.latitude.to_radians().cos());

        Self {
            south: center.latitude - lat_delta,
            west: center.longitude - lng_delta,
            north: center.latitude + lat_delta,
            east: center.longitude + lng_delta,
        }
    }

    /// `south,west|north,east`
    #[must_use]
    pub fn to_param(&self) -> String {
        format!("{},{}|{},{}", self.south, self.west, self.north, self.east)
    }

    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.south..=self.north).contains(&point.latitude)
            && (self.west..=self.east).contains(&point.longitude)
    }
}
