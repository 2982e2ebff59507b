//! ECEF / geodetic coordinates.

use crate::constants::{EARTH_ECCENTRICITY_SQ, EARTH_SEMI_MAJOR_AXIS_WGS84};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// Helper constants for the Bowring ECEF-to-geodetic conversion
const A1: f64 = EARTH_SEMI_MAJOR_AXIS_WGS84 * EARTH_ECCENTRICITY_SQ;
const A2: f64 = A1 * A1;
const A3: f64 =
    0.5 * EARTH_SEMI_MAJOR_AXIS_WGS84 * EARTH_ECCENTRICITY_SQ * EARTH_ECCENTRICITY_SQ;
const A4: f64 = 2.5 * A2;
const A5: f64 = A1 + A3;
const A6: f64 = 1.0 - EARTH_ECCENTRICITY_SQ;

/// Position expressed in ECEF meters and/or geodetic degrees + meters.
/// Either representation may be stale (NaN for the geodetic part) until
/// one of the conversion methods is called.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Geodetic latitude (decimal degrees)
    pub latitude: f64,
    /// Longitude (decimal degrees)
    pub longitude: f64,
    /// Height above the WGS84 ellipsoid (meters)
    pub height: f64,
}

impl Default for Coordinate {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            latitude: f64::NAN,
            longitude: f64::NAN,
            height: f64::NAN,
        }
    }
}

impl PartialEq for Coordinate {
    /// ECEF equality only: the geodetic part is derived data.
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y && self.z == other.z
    }
}

impl Coordinate {
    /// New coordinate from ECEF meters; the geodetic form stays stale
    /// until [Self::ecef_to_geodetic] is called.
    pub fn from_ecef(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Default::default()
        }
    }

    /// New coordinate from geodetic degrees + ellipsoidal height, with
    /// the ECEF form resolved immediately.
    pub fn from_geodetic(latitude: f64, longitude: f64, height: f64) -> Self {
        let mut c = Self {
            latitude,
            longitude,
            height,
            ..Default::default()
        };
        c.geodetic_to_ecef();
        c
    }

    pub fn set_ecef(&mut self, x: f64, y: f64, z: f64) {
        self.x = x;
        self.y = y;
        self.z = z;
    }

    /// Euclidean norm of the ECEF vector.
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Closed-form geodetic to ECEF conversion.
    pub fn geodetic_to_ecef(&mut self) {
        let (sin_lat, cos_lat) = self.latitude.to_radians().sin_cos();
        let n = EARTH_SEMI_MAJOR_AXIS_WGS84
            / (1.0 - EARTH_ECCENTRICITY_SQ * sin_lat * sin_lat).sqrt();
        let p = (n + self.height) * cos_lat;

        self.x = p * self.longitude.to_radians().cos();
        self.y = p * self.longitude.to_radians().sin();
        self.z = (n * (1.0 - EARTH_ECCENTRICITY_SQ) + self.height) * sin_lat;
    }

    /// ECEF to geodetic conversion using Bowring's method, with the
    /// latitude branch switched near the poles for numerical stability.
    pub fn ecef_to_geodetic(&mut self) {
        let positive_z = self.z.abs();
        let w2 = self.x * self.x + self.y * self.y;
        let z2 = self.z * self.z;
        let w = w2.sqrt();
        let r2 = w2 + z2;
        let r = r2.sqrt();

        let mut s = positive_z / r;
        let mut c = w / r;
        let u = A2 / r;
        let v = A3 - A4 / r;
        let mut s2 = s * s;
        let c2 = c * c;

        self.longitude = self.y.atan2(self.x);

        if c2 > 0.3 {
            s *= 1.0 + c2 * (A1 + u + s2 * v) / r;
            self.latitude = s.asin();
            s2 = s * s;
            c = (1.0 - s2).sqrt();
        } else {
            c *= 1.0 - s2 * (A5 - u - c2 * v) / r;
            self.latitude = c.acos();
            s2 = 1.0 - c * c;
            s = s2.sqrt();
        }

        let g = 1.0 - EARTH_ECCENTRICITY_SQ * s2;
        let r1 = EARTH_SEMI_MAJOR_AXIS_WGS84 / g.sqrt();
        let rf = A6 * r1;
        let u = w - r1 * c;
        let v = positive_z - rf * s;
        let f = c * u + s * v;
        let m = c * v - s * u;
        let p = m / (rf / g + f);

        self.latitude += p;
        self.height = f + 0.5 * m * p;
        if self.z < 0.0 {
            self.latitude = -self.latitude;
        }
        self.latitude = self.latitude.to_degrees();
        self.longitude = self.longitude.to_degrees();
    }

    /// Distance from `self` (the reference, whose geodetic form must be
    /// resolved) to `remote`, measured in the local East-North-Up frame.
    /// 2D (horizontal) unless `three_d` is set.
    pub fn enu_distance(&self, remote: &Coordinate, three_d: bool) -> f64 {
        let lat_rot = self.latitude.to_radians() - 0.5 * std::f64::consts::PI;
        let lon_rot = self.longitude.to_radians() - std::f64::consts::PI;
        let (sin_lat, cos_lat) = lat_rot.sin_cos();
        let (sin_lon, cos_lon) = lon_rot.sin_cos();

        let dx = remote.x - self.x;
        let dy = remote.y - self.y;
        let dz = remote.z - self.z;

        let e = sin_lon * dx - cos_lon * dy;
        let n = cos_lat * cos_lon * dx + cos_lat * sin_lon * dy - sin_lat * dz;
        let u = sin_lat * cos_lon * dx + sin_lat * sin_lon * dy + cos_lat * dz;

        if three_d {
            (e * e + n * n + u * u).sqrt()
        } else {
            (e * e + n * n).sqrt()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geodetic_round_trip() {
        let mut c = Coordinate::from_geodetic(36.1447, -86.8027, 182.0);
        assert!(c.norm() > 6.3E6);

        c.ecef_to_geodetic();
        assert!((c.latitude - 36.1447).abs() < 1E-9);
        assert!((c.longitude - -86.8027).abs() < 1E-9);
        assert!((c.height - 182.0).abs() < 1E-6);
    }

    #[test]
    fn polar_branch() {
        // near-polar point exercises the acos branch of Bowring's method
        let mut c = Coordinate::from_geodetic(89.5, 12.0, 50.0);
        c.ecef_to_geodetic();
        assert!((c.latitude - 89.5).abs() < 1E-8);
        assert!((c.height - 50.0).abs() < 1E-5);
    }

    #[test]
    fn stale_geodetic_until_converted() {
        let c = Coordinate::from_ecef(1.0, 2.0, 3.0);
        assert!(c.latitude.is_nan() && c.height.is_nan());
    }

    #[test]
    fn enu_distance_east() {
        let reference = Coordinate::from_geodetic(0.0, 0.0, 0.0);
        // small eastward offset on the equator
        let remote = Coordinate::from_geodetic(0.0, 0.001, 0.0);
        let d = reference.enu_distance(&remote, false);
        // 0.001 degrees of longitude at the equator is ~111.3 m
        assert!((d - 111.3).abs() < 0.5);
        let d3 = reference.enu_distance(&remote, true);
        assert!((d3 - d).abs() < 0.1);
    }
}
