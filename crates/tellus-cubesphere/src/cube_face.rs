//! The six root faces of the cube-sphere and their local embeddings.

use glam::{DVec2, DVec3};

/// One of the six faces of the cube that is inflated into the planet sphere.
///
/// Each variant corresponds to a face whose outward normal points along
/// the named axis. The face-local square `[-1, 1]²` is embedded into the
/// cube as `normal + s * tangent + t * bitangent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CubeFace {
    /// +X face, id prefix `px-`
    PosX = 0,
    /// −X face, id prefix `nx-`
    NegX = 1,
    /// +Y face, id prefix `py-`
    PosY = 2,
    /// −Y face, id prefix `ny-`
    NegY = 3,
    /// +Z face, id prefix `pz-`
    PosZ = 4,
    /// −Z face, id prefix `nz-`
    NegZ = 5,
}

impl CubeFace {
    /// All six faces in canonical traversal order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    /// Length of every face prefix (`"px-"` and friends).
    pub const PREFIX_LEN: usize = 3;

    /// The path prefix that roots every patch id on this face.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            CubeFace::PosX => "px-",
            CubeFace::NegX => "nx-",
            CubeFace::PosY => "py-",
            CubeFace::NegY => "ny-",
            CubeFace::PosZ => "pz-",
            CubeFace::NegZ => "nz-",
        }
    }

    /// Look up a face by its id prefix.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<CubeFace> {
        CubeFace::ALL.into_iter().find(|face| face.prefix() == prefix)
    }

    /// Outward-pointing unit normal for this face.
    #[must_use]
    pub fn normal(self) -> DVec3 {
        match self {
            CubeFace::PosX => DVec3::X,
            CubeFace::NegX => DVec3::NEG_X,
            CubeFace::PosY => DVec3::Y,
            CubeFace::NegY => DVec3::NEG_Y,
            CubeFace::PosZ => DVec3::Z,
            CubeFace::NegZ => DVec3::NEG_Z,
        }
    }

    /// Tangent vector: direction of increasing `s` on this face.
    #[must_use]
    pub fn tangent(self) -> DVec3 {
        match self {
            CubeFace::PosX => DVec3::NEG_Z,
            CubeFace::NegX => DVec3::Z,
            CubeFace::PosY => DVec3::X,
            CubeFace::NegY => DVec3::X,
            CubeFace::PosZ => DVec3::X,
            CubeFace::NegZ => DVec3::NEG_X,
        }
    }

    /// Bitangent vector: direction of increasing `t` on this face.
    #[must_use]
    pub fn bitangent(self) -> DVec3 {
        match self {
            CubeFace::PosX => DVec3::Y,
            CubeFace::NegX => DVec3::Y,
            CubeFace::PosY => DVec3::NEG_Z,
            CubeFace::NegY => DVec3::Z,
            CubeFace::PosZ => DVec3::Y,
            CubeFace::NegZ => DVec3::Y,
        }
    }

    /// Embed a face-local point `(s, t)` onto the surface of the `[-1, 1]` cube.
    #[inline]
    #[must_use]
    pub fn to_cube(self, local: DVec2) -> DVec3 {
        self.normal() + local.x * self.tangent() + local.y * self.bitangent()
    }

    /// Inverse of [`to_cube`](Self::to_cube) for a point lying on this face's plane.
    #[inline]
    #[must_use]
    pub fn from_cube(self, cube_point: DVec3) -> DVec2 {
        DVec2::new(cube_point.dot(self.tangent()), cube_point.dot(self.bitangent()))
    }
}
