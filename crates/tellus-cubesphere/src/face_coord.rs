//! 2D local coordinates on a cube face.

use glam::DVec2;

use crate::CubeFace;

/// A point on one cube face. `s` and `t` are in the range \[-1, 1\].
///
/// `(s=-1, t=-1)` is the south-west corner of the face and `(1, 1)` the
/// north-east corner, with `s` running along the face tangent and `t`
/// along its bitangent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceCoord {
    /// Which cube face this coordinate lies on.
    pub face: CubeFace,
    /// Horizontal parameter in \[-1, 1\].
    pub s: f64,
    /// Vertical parameter in \[-1, 1\].
    pub t: f64,
}

impl FaceCoord {
    /// Construct a `FaceCoord`, clamping `s` and `t` to \[-1, 1\].
    #[must_use]
    pub fn new(face: CubeFace, s: f64, t: f64) -> Self {
        Self {
            face,
            s: s.clamp(-1.0, 1.0),
            t: t.clamp(-1.0, 1.0),
        }
    }

    /// The local coordinate as a vector.
    #[must_use]
    pub fn local(&self) -> DVec2 {
        DVec2::new(self.s, self.t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_coord_clamping() {
        let fc = FaceCoord::new(CubeFace::PosX, -1.5, 2.0);
        assert_eq!(fc.s, -1.0);
        assert_eq!(fc.t, 1.0);
    }

    #[test]
    fn test_face_coord_keeps_in_range_values() {
        let fc = FaceCoord::new(CubeFace::NegZ, 0.25, -0.75);
        assert_eq!(fc.local(), DVec2::new(0.25, -0.75));
        assert_eq!(fc.face, CubeFace::NegZ);
    }
}
