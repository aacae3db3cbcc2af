use serde::{Deserialize, Serialize};

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }

    /// `lat,lon`, the order Google Maps expects.
    pub fn lat_lon(&self) -> String {
        format!("{},{}", self.lat, self.lon)
    }

    /// `lon,lat`, the order OSRM expects.
    pub fn lon_lat(&self) -> String {
        format!("{},{}", self.lon, self.lat)
    }
}
