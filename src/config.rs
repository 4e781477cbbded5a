//! Session configuration.
//!
//! Every field has a default, so a partial JSON document (or none at all)
//! is a valid configuration:
//!
//! ```json
//! {
//!   "fallback_center": { "latitude": 28.6139, "longitude": 77.209 },
//!   "default_radius_km": 5.0,
//!   "source": { "mode": "load", "pool": [ ... ] }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::filter::{FilterEngine, FilterState, SearchField, SortKey};
use crate::model::GeoPoint;
use crate::synth::CandidateSource;
use crate::{Error, Result};

/// Connaught Place, New Delhi.
pub const DEFAULT_FALLBACK_CENTER: GeoPoint = GeoPoint::from_degrees_unchecked(28.6139, 77.2090);

/// Geographic center of India, the overview shown before a center is known.
pub const DEFAULT_INITIAL_VIEW: GeoPoint = GeoPoint::from_degrees_unchecked(20.5937, 78.9629);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Center used when the device position is unavailable.
    pub fallback_center: GeoPoint,
    pub initial_view: GeoPoint,
    pub initial_zoom: u8,
    /// Zoom when flying to the user.
    pub user_zoom: u8,
    /// Zoom when flying to a selected entity.
    pub focus_zoom: u8,
    pub geolocation_timeout_ms: u64,
    pub default_radius_km: f64,
    pub source: CandidateSource,
    pub search_fields: Vec<SearchField>,
    pub sort: SortKey,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            fallback_center: DEFAULT_FALLBACK_CENTER,
            initial_view: DEFAULT_INITIAL_VIEW,
            initial_zoom: 5,
            user_zoom: 14,
            focus_zoom: 15,
            geolocation_timeout_ms: 10_000,
            default_radius_km: crate::filter::DEFAULT_RADIUS_KM,
            source: CandidateSource::default(),
            search_fields: vec![SearchField::Name, SearchField::CategoryLabel],
            sort: SortKey::Distance,
        }
    }
}

impl DiscoveryConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.default_radius_km.is_finite() && self.default_radius_km > 0.0) {
            return Err(Error::InvalidRadius(self.default_radius_km));
        }
        if self.geolocation_timeout_ms == 0 {
            return Err(Error::InvalidArgument("geolocation_timeout_ms must be > 0".into()));
        }
        if self.search_fields.is_empty() {
            return Err(Error::InvalidArgument("at least one search field is required".into()));
        }
        if let CandidateSource::Generate { count, max_offset_km, templates } = &self.source {
            if !max_offset_km.is_finite() || *max_offset_km < 0.0 {
                return Err(Error::InvalidArgument(format!("max_offset_km must be >= 0, got {max_offset_km}")));
            }
            if *count > 0 && templates.is_empty() {
                return Err(Error::InvalidArgument("generate mode needs templates".into()));
            }
        }
        Ok(())
    }

    pub fn filter_engine(&self) -> FilterEngine {
        FilterEngine::new(self.search_fields.iter().cloned(), self.sort.clone())
    }

    /// The "reset filters" state.
    pub fn default_filter(&self) -> Result<FilterState> {
        FilterState::reset().with_radius(self.default_radius_km)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;

    #[test]
    fn test_empty_json_is_default() {
        let c = DiscoveryConfig::from_json("{}").unwrap();
        assert_eq!(c, DiscoveryConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let c = DiscoveryConfig::from_json(
            r#"{
                "default_radius_km": 5.0,
                "sort": "rating_desc",
                "search_fields": ["name", {"attribute": "breed"}],
                "source": {
                    "mode": "generate",
                    "count": 3,
                    "max_offset_km": 1.0,
                    "templates": [{"name_pattern": "Walker {n}", "category": "Walker"}]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(c.default_radius_km, 5.0);
        assert_eq!(c.sort, SortKey::RatingDesc);
        assert_eq!(c.search_fields[1], SearchField::Attribute("breed".into()));
        match &c.source {
            CandidateSource::Generate { count, templates, .. } => {
                assert_eq!(*count, 3);
                assert_eq!(templates[0].category, Category::Walker);
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(c.user_zoom, 14);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            DiscoveryConfig::from_json(r#"{"default_radius_km": 0}"#),
            Err(Error::InvalidRadius(_))
        ));
        assert!(matches!(
            DiscoveryConfig::from_json(r#"{"fallback_center": {"latitude": 95, "longitude": 0}}"#),
            Err(Error::Config(_))
        ));
        assert!(DiscoveryConfig::from_json(r#"{"search_fields": []}"#).is_err());
    }
}
