//! Great-circle distance checks against an allowed circular area.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum GeofenceError {
    #[error("latitude out of range: {0}")]
    Latitude(f64),
    #[error("longitude out of range: {0}")]
    Longitude(f64),
    #[error("invalid radius: {0}")]
    Radius(f64),
}

/// A point on the globe in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    #[must_use]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// # Errors
    /// Returns an error when either coordinate is out of range or not finite.
    pub fn validate(&self) -> Result<(), GeofenceError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(GeofenceError::Latitude(self.lat));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(GeofenceError::Longitude(self.lon));
        }
        Ok(())
    }
}

/// Allowed login area enrolled as a factor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeofenceArea {
    pub center: Position,
    pub radius_meters: f64,
}

impl GeofenceArea {
    /// # Errors
    /// Returns an error for an invalid center or a negative/non-finite radius.
    pub fn validate(&self) -> Result<(), GeofenceError> {
        self.center.validate()?;
        if !self.radius_meters.is_finite() || self.radius_meters < 0.0 {
            return Err(GeofenceError::Radius(self.radius_meters));
        }
        Ok(())
    }

    /// # Errors
    /// See [`within_allowed_area`].
    pub fn contains(&self, current: Position) -> Result<bool, GeofenceError> {
        within_allowed_area(
            current.lat,
            current.lon,
            self.center.lat,
            self.center.lon,
            self.radius_meters,
        )
    }
}

/// Haversine distance in meters.
#[must_use]
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a =
        (dlat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// `true` when the current point lies within `radius_meters` of the center (inclusive).
///
/// # Errors
/// Returns an error when a coordinate is outside the valid latitude/longitude
/// range or the radius is negative.
pub fn within_allowed_area(
    current_lat: f64,
    current_lon: f64,
    center_lat: f64,
    center_lon: f64,
    radius_meters: f64,
) -> Result<bool, GeofenceError> {
    Position::new(current_lat, current_lon).validate()?;
    let area = GeofenceArea {
        center: Position::new(center_lat, center_lon),
        radius_meters,
    };
    area.validate()?;

    Ok(distance_meters(current_lat, current_lon, center_lat, center_lon) <= radius_meters)
}
