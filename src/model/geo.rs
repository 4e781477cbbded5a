//! Geographic point.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A WGS84-style coordinate in degrees.
///
/// Immutable once created. The only way in is [`GeoPoint::new`] (or serde,
/// which goes through the same validation), so every `GeoPoint` in the
/// engine is finite and in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = Error;

    fn try_from(raw: RawGeoPoint) -> Result<Self> {
        GeoPoint::new(raw.latitude, raw.longitude)
    }
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
        {
            return Err(Error::InvalidCoordinate { latitude, longitude });
        }
        Ok(Self { latitude, longitude })
    }

    /// For compile-time constants only; callers guarantee the range.
    pub(crate) const fn from_degrees_unchecked(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn latitude(&self) -> f64 { self.latitude }
    pub fn longitude(&self) -> f64 { self.longitude }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_finite() {
        assert!(GeoPoint::new(f64::NAN, 77.2).is_err());
        assert!(GeoPoint::new(28.6, f64::INFINITY).is_err());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(matches!(
            GeoPoint::new(90.5, 0.0),
            Err(Error::InvalidCoordinate { .. })
        ));
        assert!(GeoPoint::new(0.0, -181.0).is_err());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn test_deserialize_validates() {
        let p: GeoPoint = serde_json::from_str(r#"{"latitude": 28.6139, "longitude": 77.209}"#).unwrap();
        assert_eq!(p.latitude(), 28.6139);
        let bad = serde_json::from_str::<GeoPoint>(r#"{"latitude": 128.0, "longitude": 77.0}"#);
        assert!(bad.is_err());
    }
}
