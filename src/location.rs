use crate::tools::serde::f64_from_scalar;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean equatorial radius of the earth in meters
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// A geographic coordinate in degrees. Serializes as a `[lon, lat]` pair and
/// deserializes from either that pair or an object using the conventional
/// `lat`/`latitude` and `lng`/`lon`/`longitude` keys.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "CoordinateRepr", into = "[f64; 2]")]
pub struct LngLat {
    pub longitude: f64,
    pub latitude: f64,
}

impl LngLat {
    pub fn new(longitude: f64, latitude: f64) -> LngLat {
        LngLat {
            longitude,
            latitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.longitude.is_finite() && self.latitude.is_finite()
    }

    /// Shifts the longitude by whole turns so it lies within 180 degrees of
    /// `reference_longitude`. Used to anchor on the world copy under the pointer.
    pub fn wrapped_towards(&self, reference_longitude: f64) -> LngLat {
        if !self.is_finite() || !reference_longitude.is_finite() {
            return *self;
        }

        let turns = ((reference_longitude - self.longitude) / 360.0).round();
        let mut longitude = self.longitude + 360.0 * turns;

        // Rounding can leave the result just past the boundary
        let delta = reference_longitude - longitude;
        if delta > 180.0 {
            longitude += 360.0;
        } else if delta < -180.0 {
            longitude -= 360.0;
        }

        LngLat::new(longitude, self.latitude)
    }

    /// Great circle distance in meters using the haversine formula
    pub fn distance(&self, other: &LngLat) -> f64 {
        let source_lat = self.latitude.to_radians();
        let dest_lat = other.latitude.to_radians();
        let d_lat = dest_lat - source_lat;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat * 0.5).sin().powi(2)
            + source_lat.cos() * dest_lat.cos() * (d_lon * 0.5).sin().powi(2);

        // Rounding can push `a` just outside [0, 1] near antipodes
        let a = a.clamp(0.0, 1.0);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        c * EARTH_RADIUS_METERS
    }
}

impl fmt::Display for LngLat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},{}", self.longitude, self.latitude)
    }
}

impl From<(f64, f64)> for LngLat {
    fn from(lnglat: (f64, f64)) -> Self {
        LngLat::new(lnglat.0, lnglat.1)
    }
}

impl From<[f64; 2]> for LngLat {
    fn from(lnglat: [f64; 2]) -> Self {
        LngLat::new(lnglat[0], lnglat[1])
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(lnglat: LngLat) -> Self {
        [lnglat.longitude, lnglat.latitude]
    }
}

impl From<LngLat> for Vec<f64> {
    fn from(lnglat: LngLat) -> Self {
        vec![lnglat.longitude, lnglat.latitude]
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CoordinateRepr {
    Pair([f64; 2]),
    Object {
        #[serde(alias = "lng", alias = "lon", deserialize_with = "f64_from_scalar")]
        longitude: f64,
        #[serde(alias = "lat", deserialize_with = "f64_from_scalar")]
        latitude: f64,
    },
}

impl From<CoordinateRepr> for LngLat {
    fn from(repr: CoordinateRepr) -> Self {
        match repr {
            CoordinateRepr::Pair(pair) => pair.into(),
            CoordinateRepr::Object {
                longitude,
                latitude,
            } => LngLat::new(longitude, latitude),
        }
    }
}

/// Great circle distance in meters between two coordinates
pub fn distance_meters<A: Into<LngLat>, B: Into<LngLat>>(a: A, b: B) -> f64 {
    a.into().distance(&b.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coincident_points_are_zero_apart() {
        let p = LngLat::new(4.3053507, 50.8549541);
        assert_eq!(p.distance(&p), 0.0);

        let origin = LngLat::new(0.0, 0.0);
        assert_eq!(distance_meters(origin, origin), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let brussels = LngLat::new(4.3053507, 50.8549541);
        let leuven = LngLat::new(4.70, 50.88);

        let there = brussels.distance(&leuven);
        let back = leuven.distance(&brussels);
        assert!((there - back).abs() < 1e-6);

        // Roughly 27.8 km on the equatorial radius
        assert!((there - 27_800.0).abs() < 300.0);
    }

    #[test]
    fn antipodal_points_are_half_a_circumference_apart() {
        let a = LngLat::new(0.0, 0.0);
        let b = LngLat::new(180.0, 0.0);
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_METERS;

        let d = a.distance(&b);
        assert!(d.is_finite());
        assert!((d - half_circumference).abs() < 1e-3);

        let pole = LngLat::new(0.0, 90.0);
        let other_pole = LngLat::new(0.0, -90.0);
        assert!((pole.distance(&other_pole) - half_circumference).abs() < 1e-3);
    }

    #[test]
    fn deserializes_pairs_and_aliased_objects() {
        let pair: LngLat = serde_json::from_str("[4.7, 50.88]").unwrap();
        let short: LngLat = serde_json::from_str(r#"{"lat": 50.88, "lng": 4.7}"#).unwrap();
        let lon: LngLat = serde_json::from_str(r#"{"lat": "50.88", "lon": "4.7"}"#).unwrap();
        let long: LngLat =
            serde_json::from_str(r#"{"latitude": 50.88, "longitude": 4.7}"#).unwrap();

        assert_eq!(pair, LngLat::new(4.7, 50.88));
        assert_eq!(short, pair);
        assert_eq!(lon, pair);
        assert_eq!(long, pair);
        assert_eq!(distance_meters(pair, long), 0.0);
    }

    #[test]
    fn wraps_across_the_anti_meridian() {
        let feature = LngLat::new(-179.0, 10.0);
        let wrapped = feature.wrapped_towards(179.0);
        assert_eq!(wrapped.longitude - feature.longitude, 360.0);

        let feature = LngLat::new(179.0, 10.0);
        let wrapped = feature.wrapped_towards(-179.0);
        assert_eq!(wrapped.longitude - feature.longitude, -360.0);

        // Pointer on a far world copy
        let wrapped = LngLat::new(4.7, 50.88).wrapped_towards(724.0);
        assert!((wrapped.longitude - 724.7).abs() < 1e-9);

        let unchanged = LngLat::new(4.7, 50.88).wrapped_towards(10.0);
        assert_eq!(unchanged.longitude, 4.7);
    }

    #[test]
    fn wraps_towards_distant_pointers_in_one_step() {
        let wrapped = LngLat::new(4.7, 50.88).wrapped_towards(3.6e8 + 4.0);
        assert!((wrapped.longitude - (3.6e8 + 4.7)).abs() < 1e-6);

        let wrapped = LngLat::new(4.7, 50.88).wrapped_towards(-3.6e8);
        assert!((wrapped.longitude - (-3.6e8 + 4.7)).abs() < 1e-6);

        // Past 1e17 a single turn no longer changes the value
        let wrapped = LngLat::new(4.7, 50.88).wrapped_towards(1e18);
        assert!(wrapped.longitude.is_finite());
        assert!((wrapped.longitude - 1e18).abs() <= 360.0);
        assert_eq!(wrapped.latitude, 50.88);

        let unchanged = LngLat::new(4.7, 50.88).wrapped_towards(f64::INFINITY);
        assert_eq!(unchanged.longitude, 4.7);
    }
}
