//! # Candidate Synthesis
//!
//! Builds the session's candidate pool around a center point, either by
//! generating entities from templates (service discovery) or by loading a
//! pre-seeded pool (neighbor discovery). Both modes produce the same thing:
//! a `Vec<Entity>` with distances computed against the center.
//!
//! ```text
//! center ─┬─ Generate { templates } ── disc sampling ──┐
//!         └─ Load { pool } ──────────── re-anchor ─────┴─→ Vec<Entity>
//! ```
//!
//! ## Disc sampling
//!
//! A point uniform over the disc of radius `R` needs `r = R·sqrt(u)`;
//! uniform `r` would over-concentrate points near the center. Angle is
//! `θ = 2π·v`. The east offset is divided by `cos(center.lat)` before it is
//! converted to degrees of longitude (meridians converge).

use std::collections::HashSet;
use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance::KM_PER_DEGREE;
use crate::model::{AttributeMap, Category, Entity, EntityId, GeoPoint, Value};
use crate::{Error, Result};

// ============================================================================
// Random source seam
// ============================================================================

/// Source of uniform samples in `[0, 1)`.
///
/// Every `rand::Rng` is a `RandomSource`; production passes
/// `rand::thread_rng()`, tests pass a seeded `ChaCha8Rng`.
pub trait RandomSource {
    fn next_unit(&mut self) -> f64;
}

impl<R: rand::Rng> RandomSource for R {
    fn next_unit(&mut self) -> f64 {
        self.r#gen::<f64>()
    }
}

// ============================================================================
// Templates
// ============================================================================

/// Name/category pattern for a generated entity. `{n}` in the name is
/// replaced by the 1-based candidate index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTemplate {
    pub name_pattern: String,
    pub category: Category,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl EntityTemplate {
    pub fn new(name_pattern: impl Into<String>, category: Category) -> Self {
        Self {
            name_pattern: name_pattern.into(),
            category,
            attributes: AttributeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    fn render_name(&self, index: usize) -> String {
        self.name_pattern.replace("{n}", &(index + 1).to_string())
    }
}

/// Local service templates used when no configuration supplies any.
pub fn default_service_templates() -> Vec<EntityTemplate> {
    vec![
        EntityTemplate::new("Paws & Claws Clinic", Category::Vet),
        EntityTemplate::new("Happy Tails Grooming", Category::Groomer),
        EntityTemplate::new("City Pet Hospital", Category::Vet),
        EntityTemplate::new("Bark Avenue Spa", Category::Groomer),
        EntityTemplate::new("K9 Training Academy", Category::Trainer),
        EntityTemplate::new("Pet Supplies Plus", Category::Store),
        EntityTemplate::new("Dr. Smith's Animal Care", Category::Vet),
        EntityTemplate::new("The Dog House", Category::Boarding),
    ]
}

// ============================================================================
// Generate mode
// ============================================================================

/// Sample a point uniformly (by area) within `max_offset_km` of `center`.
///
/// Longitudes wrap across the antimeridian. A disc that would reach past a
/// pole is rejected.
pub fn sample_in_disc(
    center: GeoPoint,
    max_offset_km: f64,
    rng: &mut impl RandomSource,
) -> Result<GeoPoint> {
    if center.latitude().abs() + max_offset_km / KM_PER_DEGREE > 90.0 {
        return Err(Error::InvalidArgument(format!(
            "disc of {max_offset_km} km around {center} crosses a pole"
        )));
    }
    let u = rng.next_unit();
    let v = rng.next_unit();
    let r = max_offset_km * u.sqrt();
    let theta = TAU * v;

    let north_km = r * theta.cos();
    let east_km = r * theta.sin();
    let lat_scale = center.latitude().to_radians().cos();

    let lng = center.longitude() + east_km / (KM_PER_DEGREE * lat_scale);
    GeoPoint::new(
        center.latitude() + north_km / KM_PER_DEGREE,
        (lng + 180.0).rem_euclid(360.0) - 180.0,
    )
}

/// Generate `count` entities scattered uniformly within `max_offset_km` of
/// `center`, cycling through `templates`.
///
/// Not deterministic unless `rng` is.
pub fn synthesize(
    center: GeoPoint,
    count: usize,
    max_offset_km: f64,
    templates: &[EntityTemplate],
    rng: &mut impl RandomSource,
) -> Result<Vec<Entity>> {
    if !max_offset_km.is_finite() || max_offset_km < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "max_offset_km must be finite and >= 0, got {max_offset_km}"
        )));
    }
    if count > 0 && templates.is_empty() {
        return Err(Error::InvalidArgument("synthesis needs at least one template".into()));
    }

    let mut entities = Vec::with_capacity(count);
    for i in 0..count {
        let template = &templates[i % templates.len()];
        let location = sample_in_disc(center, max_offset_km, rng)?;

        let mut entity = Entity::new(
            EntityId(format!("gen_{i}")),
            template.render_name(i),
            template.category,
            location,
        )
        .with_attribute("rating", round1(4.0 + rng.next_unit()))
        .with_attribute("reviews", 10 + (rng.next_unit() * 100.0) as i64)
        .with_attribute("price_start", 300 + (rng.next_unit() * 500.0) as i64)
        .with_attribute("contact", "+91 98765 XXXXX");
        for (k, v) in &template.attributes {
            entity.attributes.insert(k.clone(), v.clone());
        }

        entities.push(entity.anchored_at(center));
    }

    debug!(count, max_offset_km, %center, "synthesized candidates");
    Ok(entities)
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

// ============================================================================
// Load mode
// ============================================================================

/// Re-anchor a pre-seeded pool at `center`. Distances carried by the pool are
/// ignored and recomputed.
pub fn load(center: GeoPoint, pool: &[Entity]) -> Result<Vec<Entity>> {
    let mut seen = HashSet::with_capacity(pool.len());
    for entity in pool {
        if !seen.insert(&entity.id) {
            return Err(Error::InvalidArgument(format!("duplicate entity id '{}'", entity.id)));
        }
    }

    let entities: Vec<Entity> = pool.iter().cloned().map(|e| e.anchored_at(center)).collect();
    debug!(count = entities.len(), %center, "loaded candidate pool");
    Ok(entities)
}

// ============================================================================
// CandidateSource
// ============================================================================

/// Where the candidate pool comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CandidateSource {
    /// Scatter `count` template entities within `max_offset_km`.
    Generate {
        count: usize,
        max_offset_km: f64,
        templates: Vec<EntityTemplate>,
    },
    /// A fixed pool (e.g. neighbors loaded from persisted state).
    Load { pool: Vec<Entity> },
}

impl Default for CandidateSource {
    fn default() -> Self {
        CandidateSource::Generate {
            count: 8,
            max_offset_km: 3.0,
            templates: default_service_templates(),
        }
    }
}

impl CandidateSource {
    pub fn build(&self, center: GeoPoint, rng: &mut impl RandomSource) -> Result<Vec<Entity>> {
        match self {
            CandidateSource::Generate { count, max_offset_km, templates } => {
                synthesize(center, *count, *max_offset_km, templates, rng)
            }
            CandidateSource::Load { pool } => load(center, pool),
        }
    }

    /// Generated pools are re-sampled around a new center; loaded pools only
    /// get their distances refreshed.
    pub fn is_generated(&self) -> bool {
        matches!(self, CandidateSource::Generate { .. })
    }
}

impl From<Vec<Entity>> for CandidateSource {
    fn from(pool: Vec<Entity>) -> Self {
        CandidateSource::Load { pool }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn delhi() -> GeoPoint {
        GeoPoint::new(28.6139, 77.2090).unwrap()
    }

    /// Replays a fixed list of samples.
    struct Scripted(Vec<f64>, usize);

    impl RandomSource for Scripted {
        fn next_unit(&mut self) -> f64 {
            let v = self.0[self.1 % self.0.len()];
            self.1 += 1;
            v
        }
    }

    #[test]
    fn test_disc_wraps_antimeridian() {
        let center = GeoPoint::new(-17.0, 179.995).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let pool = synthesize(center, 50, 3.0, &default_service_templates(), &mut rng).unwrap();
        assert!(pool.iter().any(|e| e.location.longitude() < 0.0));
        for e in &pool {
            assert!(e.distance_from_center() <= 3.001, "{} at {}", e.id, e.distance_from_center());
        }
    }

    #[test]
    fn test_disc_across_pole_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = sample_in_disc(GeoPoint::new(89.99, 0.0).unwrap(), 3.0, &mut rng);
        assert!(matches!(err, Err(Error::InvalidArgument(msg)) if msg.contains("pole")));
    }

    #[test]
    fn test_sample_due_north() {
        // u = 1 → r = R; v = 0 → θ = 0 → all offset goes north
        let mut rng = Scripted(vec![1.0, 0.0], 0);
        let p = sample_in_disc(delhi(), 2.0, &mut rng).unwrap();
        assert!((p.longitude() - 77.2090).abs() < 1e-12);
        assert!((distance::estimate(delhi(), p) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_due_east_corrects_for_latitude() {
        // v = 0.25 → θ = π/2 → east
        let mut rng = Scripted(vec![1.0, 0.25], 0);
        let p = sample_in_disc(delhi(), 2.0, &mut rng).unwrap();
        let naive_deg = 2.0 / KM_PER_DEGREE;
        assert!(p.longitude() - 77.2090 > naive_deg);
        assert!((distance::estimate(delhi(), p) - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_synthesize_within_radius() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let out = synthesize(delhi(), 200, 3.0, &default_service_templates(), &mut rng).unwrap();
        assert_eq!(out.len(), 200);
        for e in &out {
            assert!(e.distance_from_center() <= 3.0 * 1.001, "{} at {}", e.id, e.distance_from_center());
            let rating = e.rating().unwrap();
            assert!((4.0..=5.0).contains(&rating));
            let price = e.price().unwrap();
            assert!((300.0..800.0).contains(&price));
        }
        assert_eq!(out[0].name, "Paws & Claws Clinic");
        assert_eq!(out[8].name, "Paws & Claws Clinic");
        assert_eq!(out[8].id, EntityId::new("gen_8"));
    }

    #[test]
    fn test_synthesize_seeded_is_reproducible() {
        let t = default_service_templates();
        let a = synthesize(delhi(), 8, 3.0, &t, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
        let b = synthesize(delhi(), 8, 3.0, &t, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_name_pattern_index() {
        let t = vec![EntityTemplate::new("Walker #{n}", Category::Walker)];
        let out = synthesize(delhi(), 3, 1.0, &t, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        let names: Vec<_> = out.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Walker #1", "Walker #2", "Walker #3"]);
    }

    #[test]
    fn test_template_attributes_are_copied() {
        let t = EntityTemplate::new("Night Vet", Category::Vet).with_attribute("open_24h", true);
        let out = synthesize(delhi(), 1, 1.0, &[t], &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
        assert_eq!(out[0].get("open_24h"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_synthesize_preconditions() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(synthesize(delhi(), 1, -1.0, &default_service_templates(), &mut rng).is_err());
        assert!(synthesize(delhi(), 1, f64::NAN, &default_service_templates(), &mut rng).is_err());
        assert!(synthesize(delhi(), 1, 1.0, &[], &mut rng).is_err());
        assert!(synthesize(delhi(), 0, 1.0, &[], &mut rng).unwrap().is_empty());
    }

    #[test]
    fn test_load_recomputes_distance_and_rejects_duplicates() {
        let far = GeoPoint::new(28.5355, 77.3910).unwrap();
        let pool = vec![Entity::new("n1", "Rohan Iyer", Category::Dog, far)];
        let out = load(delhi(), &pool).unwrap();
        assert!((out[0].distance_from_center() - distance::estimate(delhi(), far)).abs() < 1e-12);

        let dup = vec![pool[0].clone(), pool[0].clone()];
        assert!(load(delhi(), &dup).is_err());
    }
}
