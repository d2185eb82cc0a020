//! Common types used across the platform

use serde::{Deserialize, Serialize};
use std::fmt;

/// Geographic location
///
/// Value type: two locations are equal when their coordinates and city name
/// match, independent of how the record was obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub country: String,
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.latitude == other.latitude
            && self.longitude == other.longitude
            && self.city == other.city
    }
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, city: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            latitude,
            longitude,
            city: city.into(),
            country: country.into(),
        }
    }

    /// Cache key with coordinates rounded to four decimals (~11 m)
    pub fn cache_key(&self) -> String {
        format!("{:.4},{:.4}", self.latitude, self.longitude)
    }

    /// The 1° grid cell this location falls into
    pub fn region(&self) -> RegionKey {
        RegionKey {
            lat_cell: self.latitude.floor() as i16,
            lon_cell: self.longitude.floor() as i16,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.city, self.country)
    }
}

/// Identifies the 1° latitude/longitude cell a trained model covers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RegionKey {
    pub lat_cell: i16,
    pub lon_cell: i16,
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell({},{})", self.lat_cell, self.lon_cell)
    }
}
