//! WGS84 geodetic conversions.
//!
//! Satellite fixes arrive as ellipsoidal latitude/longitude/altitude. The
//! mission works in a local East-North-Up tangent plane, so every fix is taken
//! through two stages:
//!
//! ```text
//! (lat, lon, alt) ──► ECEF (x, y, z) ──► ENU (east, north, up) about a reference fix
//! ```
//!
//! The inverse path (`enu_to_ecef`, `ecef_to_geodetic`) exists so the forward
//! transform can be checked by round trip.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------
type Scalar = f64;

/// WGS84 semi-major axis (m).
pub const WGS84_A: Scalar = 6_378_137.0;
/// WGS84 first eccentricity squared.
pub const WGS84_E_SQ: Scalar = 6.694_379_990_14e-3;

const GEODETIC_ITERATIONS: usize = 10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A raw satellite position fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SatelliteFix {
    /// Degrees, positive north.
    pub latitude: Scalar,
    /// Degrees, positive east.
    pub longitude: Scalar,
    /// Meters above the ellipsoid.
    pub altitude: Scalar,
}

impl SatelliteFix {
    pub const fn new(latitude: Scalar, longitude: Scalar, altitude: Scalar) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }
}

/// Prime vertical radius of curvature at `lat` (radians).
#[inline]
fn radius_of_curvature(lat: Scalar) -> Scalar {
    let s = lat.sin();
    WGS84_A / (1.0 - WGS84_E_SQ * s * s).sqrt()
}

/// Rotation taking ECEF deltas into ENU about the given reference (radians).
fn ecef_to_enu_rotation(lat: Scalar, lon: Scalar) -> Matrix3<Scalar> {
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    Matrix3::new(
        -sin_lon,
        cos_lon,
        0.0,
        -cos_lon * sin_lat,
        -sin_lat * sin_lon,
        cos_lat,
        cos_lat * cos_lon,
        cos_lat * sin_lon,
        sin_lat,
    )
}

// ---------------------------------------------------------------------------
// Forward
// ---------------------------------------------------------------------------

/// Geodetic fix to Earth-centered, Earth-fixed coordinates (m).
pub fn to_ecef(fix: &SatelliteFix) -> Vector3<Scalar> {
    let lat = fix.latitude.to_radians();
    let lon = fix.longitude.to_radians();
    let n = radius_of_curvature(lat);

    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    Vector3::new(
        (fix.altitude + n) * cos_lat * cos_lon,
        (fix.altitude + n) * cos_lat * sin_lon,
        (fix.altitude + (1.0 - WGS84_E_SQ) * n) * sin_lat,
    )
}

/// ECEF point to East-North-Up about `reference`.
pub fn to_enu(ecef: &Vector3<Scalar>, reference: &SatelliteFix) -> Vector3<Scalar> {
    let origin = to_ecef(reference);
    let delta = ecef - origin;
    ecef_to_enu_rotation(
        reference.latitude.to_radians(),
        reference.longitude.to_radians(),
    ) * delta
}

/// Geodetic fix to local East-North-Up about `reference`.
pub fn to_local(fix: &SatelliteFix, reference: &SatelliteFix) -> Vector3<Scalar> {
    to_enu(&to_ecef(fix), reference)
}

// ---------------------------------------------------------------------------
// Inverse
// ---------------------------------------------------------------------------

/// East-North-Up about `reference` back to ECEF.
pub fn enu_to_ecef(local: &Vector3<Scalar>, reference: &SatelliteFix) -> Vector3<Scalar> {
    let rotation = ecef_to_enu_rotation(
        reference.latitude.to_radians(),
        reference.longitude.to_radians(),
    );
    rotation.transpose() * local + to_ecef(reference)
}

/// ECEF back to a geodetic fix by fixed-point iteration on latitude.
///
/// Converges to well below a millimeter in a handful of iterations for any
/// point off the polar axis.
pub fn ecef_to_geodetic(ecef: &Vector3<Scalar>) -> SatelliteFix {
    let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
    let lon = ecef.y.atan2(ecef.x);

    let mut lat = ecef.z.atan2(p * (1.0 - WGS84_E_SQ));
    for _ in 0..GEODETIC_ITERATIONS {
        let n = radius_of_curvature(lat);
        let alt = p * lat.cos() + ecef.z * lat.sin() - WGS84_A * WGS84_A / n;
        lat = ecef.z.atan2(p * (1.0 - WGS84_E_SQ * n / (n + alt)));
    }

    let n = radius_of_curvature(lat);
    let alt = p * lat.cos() + ecef.z * lat.sin() - WGS84_A * WGS84_A / n;

    SatelliteFix {
        latitude: lat.to_degrees(),
        longitude: lon.to_degrees(),
        altitude: alt,
    }
}

/// Local East-North-Up about `reference` back to a geodetic fix.
pub fn to_geodetic(local: &Vector3<Scalar>, reference: &SatelliteFix) -> SatelliteFix {
    ecef_to_geodetic(&enu_to_ecef(local, reference))
}
