//! Sphere-to-patch inverse mapping: recover face, face-local coordinate and
//! the patch under a point.

use glam::DVec3;

use crate::{CubeFace, FaceCoord, Patch, PatchId};

/// Determine which cube face a point belongs to.
///
/// Picks the face whose normal has the largest dot product with the point.
/// Ties go to the earlier face in [`CubeFace::ALL`]; a zero vector maps to
/// [`CubeFace::PosX`].
#[must_use]
pub fn face_of(point: DVec3) -> CubeFace {
    let mut best = CubeFace::PosX;
    let mut best_dot = f64::NEG_INFINITY;
    for face in CubeFace::ALL {
        let d = point.dot(face.normal());
        if d > best_dot {
            best = face;
            best_dot = d;
        }
    }
    best
}

/// Unproject a point onto its face's local square.
///
/// The ray from the planet center through `point` is intersected with the
/// face plane along the dominant axis. The result is clamped to `[-1, 1]²`.
#[must_use]
pub fn point_to_face_coord(point: DVec3) -> FaceCoord {
    let face = face_of(point);
    let d = point.dot(face.normal());
    // Degenerate (zero) point.
    if d.abs() < 1e-300 {
        return FaceCoord::new(face, 0.0, 0.0);
    }
    let local = face.from_cube(point / d);
    FaceCoord::new(face, local.x, local.y)
}

/// The patch under a point and the point's fractional position inside it.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchFraction {
    /// Deepest patch reached that contains the point.
    pub patch: Patch,
    /// Position within the patch, `[0, 0]` at the south-west corner and
    /// `[1, 1]` at the north-east corner.
    pub fraction: [f64; 2],
}

/// Descend from the root of `point`'s face to the patch at `target_depth`
/// containing it.
///
/// Each level tests the four children in symbol order and takes the first
/// one containing the point. If no child does, descent stops and the last
/// containing level is returned.
#[must_use]
pub fn point_to_patch_fraction(point: DVec3, target_depth: usize) -> PatchFraction {
    let coord = point_to_face_coord(point);
    let local = coord.local();
    let target_depth = target_depth.min(PatchId::MAX_DEPTH);

    let mut patch = Patch::root(coord.face);
    while patch.depth() < target_depth {
        match patch
            .children()
            .into_iter()
            .find(|child| child.contains_local(local))
        {
            Some(child) => patch = child,
            None => break,
        }
    }

    let rel = (local - patch.sw()) / patch.size();
    PatchFraction {
        fraction: [rel.x.clamp(0.0, 1.0), rel.y.clamp(0.0, 1.0)],
        patch,
    }
}
