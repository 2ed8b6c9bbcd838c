//! Geographic conversions on the planet sphere. The north pole is `+Y` and
//! longitude 0 lies along `+Z`.

use std::f64::consts::PI;

use glam::DVec3;

/// Longitude and latitude in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LonLat {
    /// Degrees east, in `(-180, 180]`.
    pub lon: f64,
    /// Degrees north, in `[-90, 90]`.
    pub lat: f64,
}

/// Longitude/latitude of the direction through `point`.
#[must_use]
pub fn point_to_lon_lat(point: DVec3) -> LonLat {
    let n = point.normalize_or_zero();
    LonLat {
        lon: n.x.atan2(n.z).to_degrees(),
        lat: 90.0 - n.y.clamp(-1.0, 1.0).acos().to_degrees(),
    }
}

/// Unit-sphere direction for a longitude/latitude.
#[must_use]
pub fn lon_lat_to_point(lon_lat: LonLat) -> DVec3 {
    let lon = lon_lat.lon.to_radians();
    let lat = lon_lat.lat.to_radians();
    let r = lat.cos();
    DVec3::new(r * lon.sin(), lat.sin(), r * lon.cos())
}

/// Equirectangular texture coordinate in `[0, 1]²`, `v = 0` at the north pole.
#[must_use]
pub fn point_to_equirectangular(point: DVec3) -> [f64; 2] {
    let n = point.normalize_or_zero();
    let u = (n.x.atan2(n.z) + PI) / (2.0 * PI);
    let v = n.y.clamp(-1.0, 1.0).acos() / PI;
    [u.clamp(0.0, 1.0), v.clamp(0.0, 1.0)]
}

/// Great-circle distance between the directions of `a` and `b` on a sphere
/// of `radius`.
#[must_use]
pub fn great_circle_distance(a: DVec3, b: DVec3, radius: f64) -> f64 {
    let angle = a.cross(b).length().atan2(a.dot(b));
    angle * radius
}
