//! Cube-sphere addressing: the six root faces, path-string patch ids, patch
//! geometry re-derived from ids, and the inverse mapping from sphere points
//! back to patches.

mod cube_face;
mod error;
mod face_coord;
mod geo;
mod inverse;
mod patch;
mod patch_id;
mod traverse;

pub use cube_face::CubeFace;
pub use error::AddressError;
pub use face_coord::FaceCoord;
pub use geo::{
    LonLat, great_circle_distance, lon_lat_to_point, point_to_equirectangular, point_to_lon_lat,
};
pub use inverse::{PatchFraction, face_of, point_to_face_coord, point_to_patch_fraction};
pub use patch::Patch;
pub use patch_id::{ChildQuadrant, PatchId};
pub use traverse::{traverse, traverse_from};
