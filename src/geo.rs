use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Mean Earth radius in kilometers, shared by every distance computation
/// in the system so radius filtering and ETA estimation never diverge.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Rejects out-of-range pairs and the (0, 0) origin, which upstream
    /// clients send as an invalid-location sentinel when GPS has no fix.
    pub fn validate(&self) -> Result<(), Error> {
        let in_range = self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude);

        if !in_range || (self.latitude == 0.0 && self.longitude == 0.0) {
            return Err(Error::InvalidLocation {
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }

        Ok(())
    }
}

/// Great-circle (haversine) distance between two coordinates in kilometers.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Straight-line travel estimate in whole minutes at an assumed average
/// speed. Not a road ETA; good enough to order candidates and feed the
/// phase controller.
pub fn eta_minutes(distance_km: f64, average_speed_kmh: f64) -> i64 {
    if average_speed_kmh <= 0.0 {
        return 0;
    }
    (distance_km / average_speed_kmh * 60.0).round().max(0.0) as i64
}
