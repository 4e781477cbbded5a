//! Equirectangular distance estimation.
//!
//! Planar estimate from latitude/longitude deltas, with the longitude delta
//! scaled by the cosine of latitude. Within a fraction of a percent of the
//! great-circle distance for intra-city ranges (≤ ~50 km); no haversine.

use crate::model::GeoPoint;

/// Kilometers per degree of latitude (and of longitude at the equator).
pub const KM_PER_DEGREE: f64 = 111.32;

/// Approximate distance between two points, in kilometers.
///
/// The longitude scale is the cosine of the mean latitude of the pair rather
/// than `cos(a.lat)`, so the estimate is exactly symmetric:
/// `estimate(a, b) == estimate(b, a)`. The longitude delta takes the short
/// way around the antimeridian.
pub fn estimate(a: GeoPoint, b: GeoPoint) -> f64 {
    let mean_lat_rad = ((a.latitude() + b.latitude()) * 0.5).to_radians();
    let dlat_km = (a.latitude() - b.latitude()) * KM_PER_DEGREE;
    let dlng_km = longitude_delta(a.longitude(), b.longitude()) * KM_PER_DEGREE * mean_lat_rad.cos();
    (dlat_km * dlat_km + dlng_km * dlng_km).sqrt()
}

/// Signed longitude difference in `[-180, 180]`.
fn longitude_delta(a: f64, b: f64) -> f64 {
    let d = a - b;
    if d > 180.0 {
        d - 360.0
    } else if d < -180.0 {
        d + 360.0
    } else {
        d
    }
}

/// Presentation label for a distance ("1.2 km away").
pub fn format_distance(km: f64) -> String {
    format!("{km:.1} km away")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng).unwrap()
    }

    #[test]
    fn test_zero_distance() {
        let a = p(28.6139, 77.2090);
        assert_eq!(estimate(a, a), 0.0);
    }

    #[test]
    fn test_one_degree_latitude() {
        let d = estimate(p(10.0, 20.0), p(11.0, 20.0));
        assert!((d - KM_PER_DEGREE).abs() < 1e-9);
    }

    #[test]
    fn test_longitude_shrinks_with_latitude() {
        let at_equator = estimate(p(0.0, 0.0), p(0.0, 0.1));
        let at_sixty = estimate(p(60.0, 0.0), p(60.0, 0.1));
        assert!((at_sixty / at_equator - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_antimeridian_takes_short_way() {
        let east = p(0.0, 179.99);
        let west = p(0.0, -179.99);
        let d = estimate(east, west);
        assert!((d - 0.02 * KM_PER_DEGREE).abs() < 1e-6, "{d}");
        assert_eq!(estimate(west, east), d);
    }

    #[test]
    fn test_close_to_haversine_at_city_scale() {
        // Connaught Place → Noida Sector 18, ~ 15 km
        let a = p(28.6315, 77.2167);
        let b = p(28.5708, 77.3261);
        let d = estimate(a, b);

        let r = 6371.0088_f64;
        let (la, lb) = (a.latitude().to_radians(), b.latitude().to_radians());
        let dl = lb - la;
        let dg = (b.longitude() - a.longitude()).to_radians();
        let h = (dl / 2.0).sin().powi(2) + la.cos() * lb.cos() * (dg / 2.0).sin().powi(2);
        let great_circle = 2.0 * r * h.sqrt().asin();

        assert!(((d - great_circle) / great_circle).abs() < 0.005);
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(1.234), "1.2 km away");
        assert_eq!(format_distance(0.06), "0.1 km away");
    }

    proptest! {
        #[test]
        fn prop_symmetric(
            lat_a in -89.0f64..89.0, lng_a in -179.0f64..179.0,
            lat_b in -89.0f64..89.0, lng_b in -179.0f64..179.0,
        ) {
            let a = p(lat_a, lng_a);
            let b = p(lat_b, lng_b);
            prop_assert_eq!(estimate(a, b), estimate(b, a));
            prop_assert_eq!(estimate(a, a), 0.0);
            prop_assert!(estimate(a, b) >= 0.0);
        }
    }
}
