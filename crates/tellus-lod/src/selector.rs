//! Angular-size driven LOD selection over the implicit patch quadtree.

use std::f64::consts::{FRAC_PI_2, PI};

use glam::DVec3;
use tellus_cubesphere::{Patch, PatchId, great_circle_distance, traverse};

/// How distances between points on the sphere are measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Straight-line (chord) distance.
    #[default]
    Chord,
    /// Distance along the sphere surface.
    GreatCircle,
}

impl DistanceMetric {
    fn measure(self, a: DVec3, b: DVec3, radius: f64) -> f64 {
        match self {
            DistanceMetric::Chord => (a - b).length(),
            DistanceMetric::GreatCircle => great_circle_distance(a, b, radius),
        }
    }
}

/// Parameters for [`LodSelector`].
#[derive(Clone, Debug, PartialEq)]
pub struct LodParams {
    /// Sphere radius that patches and the viewer are projected onto.
    pub radius: f64,
    /// Finest subdivision depth emitted.
    pub max_depth: usize,
    /// Patches with a smaller apparent angular diameter (radians) stop refining.
    pub angular_threshold: f64,
    pub metric: DistanceMetric,
}

impl Default for LodParams {
    fn default() -> Self {
        Self {
            radius: 6_378_137.0,
            max_depth: 11,
            angular_threshold: FRAC_PI_2,
            metric: DistanceMetric::Chord,
        }
    }
}

/// A patch the viewer should see, with the measurements that selected it.
#[derive(Clone, Debug, PartialEq)]
pub struct RequiredPatch {
    pub patch: Patch,
    pub depth: usize,
    /// Distance from the projected viewer to the patch center.
    pub distance: f64,
    /// Apparent angular diameter in radians (π when the viewer is inside
    /// the patch's bounding sphere).
    pub angular_diameter: f64,
}

impl RequiredPatch {
    pub fn id(&self) -> &PatchId {
        self.patch.id()
    }
}

/// Selects the set of patches required at a viewpoint.
///
/// The quadtree is walked depth-first from the six roots. A patch is
/// emitted once it looks small enough or reaches `max_depth`; otherwise its
/// four children are evaluated. The result covers the sphere without gaps
/// or overlaps and is a pure function of the viewer position.
#[derive(Clone, Debug, Default)]
pub struct LodSelector {
    params: LodParams,
}

impl LodSelector {
    pub fn new(params: LodParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LodParams {
        &self.params
    }

    /// Patches required at `viewer`, in traversal order (face order, then
    /// pre-order within each face).
    pub fn required_patches(&self, viewer: DVec3) -> Vec<RequiredPatch> {
        let radius = self.params.radius;
        let max_depth = self.params.max_depth.min(PatchId::MAX_DEPTH);
        let eye = viewer.normalize_or_zero() * radius;

        let mut required = Vec::new();
        traverse(|patch| {
            let (distance, angular_diameter) = self.measure(patch, eye);
            let depth = patch.depth();
            if angular_diameter < self.params.angular_threshold || depth >= max_depth {
                required.push(RequiredPatch {
                    patch: patch.clone(),
                    depth,
                    distance,
                    angular_diameter,
                });
                false
            } else {
                true
            }
        });

        tracing::trace!(count = required.len(), "LOD selection");
        required
    }

    /// Ids of the patches required at `viewer`.
    pub fn required_ids(&self, viewer: DVec3) -> Vec<PatchId> {
        self.required_patches(viewer)
            .into_iter()
            .map(|r| r.patch.id().clone())
            .collect()
    }

    /// Distance to the patch center and apparent angular diameter.
    fn measure(&self, patch: &Patch, eye: DVec3) -> (f64, f64) {
        let radius = self.params.radius;
        let metric = self.params.metric;
        let center = patch.sphere_center(radius);

        let bounding_radius = patch
            .sphere_corners(radius)
            .into_iter()
            .map(|corner| metric.measure(center, corner, radius))
            .fold(0.0, f64::max);
        let distance = metric.measure(eye, center, radius);

        let angular = if distance <= 0.0 || bounding_radius >= distance {
            PI
        } else {
            2.0 * (bounding_radius / distance).asin()
        };
        (distance, angular)
    }
}
