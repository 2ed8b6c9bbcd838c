//! Quadtree patches, re-derived on demand from their ids.

use glam::{DVec2, DVec3};

use crate::{AddressError, ChildQuadrant, CubeFace, PatchId};

/// A quadtree node on one cube face.
///
/// A patch is fully determined by its [`PatchId`]: the south-west corner and
/// edge length are recomputed by exact bisection of the face square
/// `[-1, 1]²`, so sibling patches share their edges bit for bit.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    id: PatchId,
    sw: DVec2,
    size: f64,
}

impl Patch {
    /// The root patch covering a whole face.
    #[must_use]
    pub fn root(face: CubeFace) -> Self {
        Self {
            id: PatchId::root(face),
            sw: DVec2::splat(-1.0),
            size: 2.0,
        }
    }

    /// Re-derive a patch from its id.
    #[must_use]
    pub fn from_id(id: &PatchId) -> Self {
        id.quadrants()
            .fold(Self::root(id.face()), |patch, q| patch.child(q))
    }

    /// Parse an id string and derive its patch.
    pub fn parse(id: &str) -> Result<Self, AddressError> {
        Ok(Self::from_id(&PatchId::parse(id)?))
    }

    /// The child patch in one quadrant.
    #[must_use]
    pub fn child(&self, quadrant: ChildQuadrant) -> Self {
        let half = self.size * 0.5;
        let (ox, oy) = quadrant.offset();
        Self {
            id: self.id.child(quadrant),
            sw: DVec2::new(self.sw.x + ox * half, self.sw.y + oy * half),
            size: half,
        }
    }

    /// The four children in symbol order `a, b, c, d`.
    #[must_use]
    pub fn children(&self) -> [Self; 4] {
        ChildQuadrant::ALL.map(|q| self.child(q))
    }

    pub fn id(&self) -> &PatchId {
        &self.id
    }

    pub fn face(&self) -> CubeFace {
        self.id.face()
    }

    pub fn depth(&self) -> usize {
        self.id.depth()
    }

    /// Edge length in face-local units (2 for a root).
    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn sw(&self) -> DVec2 {
        self.sw
    }

    pub fn se(&self) -> DVec2 {
        DVec2::new(self.sw.x + self.size, self.sw.y)
    }

    pub fn ne(&self) -> DVec2 {
        DVec2::new(self.sw.x + self.size, self.sw.y + self.size)
    }

    pub fn nw(&self) -> DVec2 {
        DVec2::new(self.sw.x, self.sw.y + self.size)
    }

    pub fn center(&self) -> DVec2 {
        self.sw + DVec2::splat(self.size * 0.5)
    }

    /// Midpoint of the north edge.
    pub fn n(&self) -> DVec2 {
        DVec2::new(self.sw.x + self.size * 0.5, self.sw.y + self.size)
    }

    /// Midpoint of the south edge.
    pub fn s(&self) -> DVec2 {
        DVec2::new(self.sw.x + self.size * 0.5, self.sw.y)
    }

    /// Midpoint of the east edge.
    pub fn e(&self) -> DVec2 {
        DVec2::new(self.sw.x + self.size, self.sw.y + self.size * 0.5)
    }

    /// Midpoint of the west edge.
    pub fn w(&self) -> DVec2 {
        DVec2::new(self.sw.x, self.sw.y + self.size * 0.5)
    }

    /// Corners in `sw, se, ne, nw` order, face-local.
    #[must_use]
    pub fn corners(&self) -> [DVec2; 4] {
        [self.sw(), self.se(), self.ne(), self.nw()]
    }

    /// Corners embedded on the `[-1, 1]` cube.
    #[must_use]
    pub fn cube_corners(&self) -> [DVec3; 4] {
        let face = self.face();
        self.corners().map(|c| face.to_cube(c))
    }

    /// Corners projected onto a sphere of `radius`.
    #[must_use]
    pub fn sphere_corners(&self, radius: f64) -> [DVec3; 4] {
        self.cube_corners().map(|c| c.normalize() * radius)
    }

    /// Patch center projected onto a sphere of `radius`.
    #[must_use]
    pub fn sphere_center(&self, radius: f64) -> DVec3 {
        self.outward_normal() * radius
    }

    /// Unit direction from the planet center through the patch center.
    #[must_use]
    pub fn outward_normal(&self) -> DVec3 {
        self.face().to_cube(self.center()).normalize()
    }

    /// Whether a face-local point on this patch's face lies inside it,
    /// boundary inclusive.
    #[must_use]
    pub fn contains_local(&self, local: DVec2) -> bool {
        let ne = self.ne();
        local.x >= self.sw.x && local.x <= ne.x && local.y >= self.sw.y && local.y <= ne.y
    }

    /// Face-local position of grid sample `(i, j)` on a `resolution²` grid.
    ///
    /// Indices may lie outside the grid; callers that need validation use
    /// [`sample_cube_point`](Self::sample_cube_point).
    #[must_use]
    pub fn grid_local(&self, i: f64, j: f64, resolution: usize) -> DVec2 {
        let step = self.size / (resolution.max(2) - 1) as f64;
        DVec2::new(self.sw.x + step * i, self.sw.y + step * j)
    }

    /// Cube-surface point of grid sample `(i, j)` on a `resolution²` grid,
    /// with `(0, 0)` at the south-west corner and `(res-1, res-1)` at the
    /// north-east corner.
    pub fn sample_cube_point(
        &self,
        i: usize,
        j: usize,
        resolution: usize,
    ) -> Result<DVec3, AddressError> {
        if resolution < 2 || i >= resolution || j >= resolution {
            return Err(AddressError::GridIndexOutOfRange { i, j, resolution });
        }
        Ok(self
            .face()
            .to_cube(self.grid_local(i as f64, j as f64, resolution)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(id: &str) -> Patch {
        Patch::parse(id).unwrap()
    }

    #[test]
    fn test_root_covers_face() {
        let root = Patch::root(CubeFace::PosZ);
        assert_eq!(root.sw(), DVec2::new(-1.0, -1.0));
        assert_eq!(root.ne(), DVec2::new(1.0, 1.0));
        assert_eq!(root.center(), DVec2::ZERO);
        assert_eq!(root.size(), 2.0);
        assert_eq!(root.outward_normal(), DVec3::Z);
    }

    #[test]
    fn test_from_id_is_deterministic() {
        for id in ["px-", "nx-abcd", "py-cccc", "ny-dab", "pz-b", "nz-adcbadcb"] {
            let a = patch(id);
            let b = patch(id);
            assert_eq!(a.corners(), b.corners());
            assert_eq!(a.cube_corners(), b.cube_corners());
            assert_eq!(a.id().as_str(), id);
        }
    }

    #[test]
    fn test_child_quadrants() {
        let root = Patch::root(CubeFace::PosX);
        let [a, b, c, d] = root.children();
        assert_eq!(a.sw(), DVec2::new(-1.0, -1.0));
        assert_eq!(b.sw(), DVec2::new(0.0, -1.0));
        assert_eq!(c.sw(), DVec2::new(0.0, 0.0));
        assert_eq!(d.sw(), DVec2::new(-1.0, 0.0));
        for child in [&a, &b, &c, &d] {
            assert_eq!(child.size(), 1.0);
            assert_eq!(child.depth(), 1);
        }
    }

    #[test]
    fn test_corners_and_midpoints() {
        let p = patch("py-c");
        assert_eq!(p.sw(), DVec2::new(0.0, 0.0));
        assert_eq!(p.se(), DVec2::new(1.0, 0.0));
        assert_eq!(p.ne(), DVec2::new(1.0, 1.0));
        assert_eq!(p.nw(), DVec2::new(0.0, 1.0));
        assert_eq!(p.center(), DVec2::new(0.5, 0.5));
        assert_eq!(p.n(), DVec2::new(0.5, 1.0));
        assert_eq!(p.s(), DVec2::new(0.5, 0.0));
        assert_eq!(p.e(), DVec2::new(1.0, 0.5));
        assert_eq!(p.w(), DVec2::new(0.0, 0.5));
    }

    #[test]
    fn test_sibling_edges_coincide_exactly() {
        for parent in ["pz-", "nx-dcb", "ny-abcabc"] {
            let [a, b, c, d] = patch(parent).children();
            assert_eq!(a.se(), b.sw());
            assert_eq!(a.ne(), b.nw());
            assert_eq!(b.ne(), c.se());
            assert_eq!(b.nw(), c.sw());
            assert_eq!(d.se(), c.sw());
            assert_eq!(d.ne(), c.nw());
            assert_eq!(a.nw(), d.sw());
            assert_eq!(a.ne(), d.se());
            // Same on the sphere.
            assert_eq!(a.sphere_corners(6.0)[1], b.sphere_corners(6.0)[0]);
        }
    }

    #[test]
    fn test_sphere_corners_lie_on_sphere() {
        let radius = 6_378_137.0;
        for corner in patch("nz-bad").sphere_corners(radius) {
            assert!((corner.length() - radius).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sample_cube_point_spans_patch() {
        let p = patch("pz-c");
        let face = p.face();
        assert_eq!(p.sample_cube_point(0, 0, 5).unwrap(), face.to_cube(p.sw()));
        assert_eq!(p.sample_cube_point(4, 4, 5).unwrap(), face.to_cube(p.ne()));
        assert_eq!(p.sample_cube_point(4, 0, 5).unwrap(), face.to_cube(p.se()));
        assert_eq!(p.sample_cube_point(2, 2, 5).unwrap(), face.to_cube(p.center()));
    }

    #[test]
    fn test_sample_cube_point_rejects_out_of_range() {
        let p = patch("px-");
        assert_eq!(
            p.sample_cube_point(5, 0, 5),
            Err(AddressError::GridIndexOutOfRange {
                i: 5,
                j: 0,
                resolution: 5
            })
        );
        assert!(p.sample_cube_point(0, 9, 5).is_err());
        assert!(p.sample_cube_point(0, 0, 1).is_err());
    }

    #[test]
    fn test_contains_local() {
        let p = patch("nx-b");
        assert!(p.contains_local(p.center()));
        assert!(p.contains_local(p.sw()));
        assert!(p.contains_local(p.ne()));
        assert!(!p.contains_local(DVec2::new(-0.5, -0.5)));
    }
}
