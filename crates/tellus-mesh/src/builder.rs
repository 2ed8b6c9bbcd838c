//! Heightmap to mesh conversion.
//!
//! Each heightmap cell becomes two triangles displaced along the sphere
//! direction by `radius + elevation`. An optional skirt ring of cells around
//! the grid drops the edge samples toward the planet center so that
//! neighbouring patches at a different LOD never show a gap.

use glam::DVec3;
use tellus_cubesphere::{Patch, point_to_equirectangular};
use tellus_terrain::PatchHeightmap;

use crate::PatchMesh;

/// Parameters for [`build_mesh`].
#[derive(Clone, Debug, PartialEq)]
pub struct MeshParams {
    /// Sea-level planet radius.
    pub radius: f64,
    /// Emit the skirt ring.
    pub skirts: bool,
    /// Skirt drop as a fraction of the patch diagonal.
    pub skirt_depth_fraction: f64,
    /// Detail texture repeats across a patch.
    pub detail_tiling: f32,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            radius: 6_378_137.0,
            skirts: true,
            skirt_depth_fraction: 0.05,
            detail_tiling: 32.0,
        }
    }
}

struct GridVertex {
    position: DVec3,
    detail_uv: [f32; 2],
    on_skirt: bool,
}

/// Vertex generation over the patch grid.
struct Grid<'a> {
    patch: &'a Patch,
    heightmap: &'a PatchHeightmap,
    radius: f64,
    skirt_depth: f64,
    detail_scale: f32,
}

impl Grid<'_> {
    /// Vertex at grid index `(i, j)`. Indices outside the grid clamp to the
    /// edge sample and drop by the skirt depth.
    fn vertex(&self, i: isize, j: isize) -> GridVertex {
        let res = self.heightmap.resolution();
        let last = res as isize - 1;
        let ci = i.clamp(0, last);
        let cj = j.clamp(0, last);
        let on_skirt = ci != i || cj != j;

        let local = self.patch.grid_local(ci as f64, cj as f64, res);
        let dir = self.patch.face().to_cube(local).normalize();
        let mut elevation = self.heightmap.get(ci, cj) as f64;
        if on_skirt {
            elevation -= self.skirt_depth;
        }

        GridVertex {
            position: dir * (self.radius + elevation),
            detail_uv: [ci as f32 * self.detail_scale, cj as f32 * self.detail_scale],
            on_skirt,
        }
    }
}

#[derive(Default)]
struct Soup {
    positions: Vec<DVec3>,
    normals: Vec<[f32; 3]>,
    color_uvs: Vec<[f32; 2]>,
    detail_uvs: Vec<[f32; 2]>,
}

impl Soup {
    fn triangle(&mut self, verts: [&GridVertex; 3], normal: DVec3) {
        let centroid = (verts[0].position + verts[1].position + verts[2].position) / 3.0;
        let [u, v] = point_to_equirectangular(centroid);
        let n = normal.as_vec3().to_array();
        for vert in verts {
            self.positions.push(vert.position);
            self.normals.push(n);
            self.color_uvs.push([u as f32, v as f32]);
            self.detail_uvs.push(vert.detail_uv);
        }
    }

    /// Emit cell `(a, b, c, d)` (counter-clockwise from the south-west
    /// corner) as triangles `(a, b, c)` and `(a, c, d)`.
    fn cell(&mut self, [a, b, c, d]: [GridVertex; 4], forced_normal: Option<DVec3>, fallback: DVec3) {
        let face_normal = |p: DVec3, q: DVec3| {
            let n = p.cross(q).normalize_or_zero();
            if n == DVec3::ZERO { fallback } else { n }
        };
        let n0 = forced_normal
            .unwrap_or_else(|| face_normal(b.position - a.position, c.position - a.position));
        let n1 = forced_normal
            .unwrap_or_else(|| face_normal(c.position - a.position, d.position - a.position));
        self.triangle([&a, &b, &c], n0);
        self.triangle([&a, &c, &d], n1);
    }
}

/// Build the mesh for `patch` from its heightmap.
///
/// Pure function of its inputs. Vertices are recentered on the bounding
/// box center, returned as the mesh `offset`.
pub fn build_mesh(patch: &Patch, heightmap: &PatchHeightmap, params: &MeshParams) -> PatchMesh {
    let res = heightmap.resolution();
    let corners = patch.sphere_corners(params.radius);
    let grid = Grid {
        patch,
        heightmap,
        radius: params.radius,
        skirt_depth: corners[0].distance(corners[2]) * params.skirt_depth_fraction,
        detail_scale: params.detail_tiling / res as f32,
    };
    let outward = patch.outward_normal();
    let cell_vertices = |i: isize, j: isize| {
        [
            grid.vertex(i, j),
            grid.vertex(i + 1, j),
            grid.vertex(i + 1, j + 1),
            grid.vertex(i, j + 1),
        ]
    };

    let cells = res as isize - 1;
    let mut soup = Soup::default();
    for j in 0..cells {
        for i in 0..cells {
            soup.cell(cell_vertices(i, j), None, outward);
        }
    }

    let skirt_start = soup.positions.len();
    if params.skirts {
        for j in -1..=cells {
            for i in -1..=cells {
                let verts = cell_vertices(i, j);
                if verts.iter().any(|v| v.on_skirt) {
                    soup.cell(verts, Some(outward), outward);
                }
            }
        }
    }

    let (min, max) = soup.positions.iter().fold(
        (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
        |(lo, hi), &p| (lo.min(p), hi.max(p)),
    );
    let offset = if soup.positions.is_empty() {
        DVec3::ZERO
    } else {
        (min + max) * 0.5
    };

    PatchMesh {
        patch_id: patch.id().clone(),
        offset,
        positions: soup
            .positions
            .iter()
            .map(|&p| (p - offset).as_vec3().to_array())
            .collect(),
        normals: soup.normals,
        color_uvs: soup.color_uvs,
        detail_uvs: soup.detail_uvs,
        skirt_start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: f64 = 6_378_137.0;

    fn flat(res: usize) -> PatchHeightmap {
        PatchHeightmap::zeros(res)
    }

    fn no_skirts(radius: f64) -> MeshParams {
        MeshParams {
            radius,
            skirts: false,
            ..MeshParams::default()
        }
    }

    #[test]
    fn test_single_cell_flat_patch() {
        let patch = Patch::parse("pz-").unwrap();
        let mesh = build_mesh(&patch, &flat(2), &no_skirts(R));
        assert_eq!(mesh.positions.len(), 6);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.skirt_start, 6);
        for i in 0..mesh.vertex_count() {
            let p = mesh.world_position(i).unwrap();
            assert!(
                (p.length() - R).abs() < R * 1e-6,
                "vertex {i} at distance {}",
                p.length()
            );
        }
    }

    #[test]
    fn test_vertex_count_with_and_without_skirts() {
        let patch = Patch::parse("nx-cab").unwrap();
        let res = 5;
        let plain = build_mesh(&patch, &flat(res), &no_skirts(R));
        assert_eq!(plain.vertex_count(), 6 * (res - 1) * (res - 1));

        let skirted = build_mesh(&patch, &flat(res), &MeshParams::default());
        assert_eq!(skirted.skirt_start, plain.vertex_count());
        assert_eq!(skirted.vertex_count(), plain.vertex_count() + 24 * res);
        assert_eq!(skirted.normals.len(), skirted.vertex_count());
        assert_eq!(skirted.color_uvs.len(), skirted.vertex_count());
        assert_eq!(skirted.detail_uvs.len(), skirted.vertex_count());
    }

    #[test]
    fn test_elevation_displaces_along_sphere_direction() {
        let patch = Patch::parse("py-c").unwrap();
        let hm = PatchHeightmap::new(3, vec![100.0; 9]).unwrap();
        let mesh = build_mesh(&patch, &hm, &no_skirts(1000.0));
        for i in 0..mesh.vertex_count() {
            let len = mesh.world_position(i).unwrap().length();
            assert!((len - 1100.0).abs() < 1e-3, "vertex {i}: {len}");
        }
    }

    #[test]
    fn test_surface_normals_point_outward() {
        for id in ["px-", "nx-d", "py-ab", "ny-", "pz-ccc", "nz-b"] {
            let patch = Patch::parse(id).unwrap();
            let mesh = build_mesh(&patch, &flat(4), &no_skirts(1.0));
            for (i, n) in mesh.normals.iter().enumerate() {
                let p = mesh.world_position(i).unwrap();
                let n = DVec3::new(n[0] as f64, n[1] as f64, n[2] as f64);
                assert!(n.dot(p) > 0.0, "{id}: inward normal at vertex {i}");
                assert!((n.length() - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_skirt_drops_below_surface() {
        let patch = Patch::parse("pz-a").unwrap();
        let params = MeshParams {
            radius: 1000.0,
            ..MeshParams::default()
        };
        let mesh = build_mesh(&patch, &flat(4), &params);
        let outward = patch.outward_normal().as_vec3().to_array();
        let lowest = (mesh.skirt_start..mesh.vertex_count())
            .map(|i| mesh.world_position(i).unwrap().length())
            .fold(f64::INFINITY, f64::min);
        let corners = patch.sphere_corners(1000.0);
        let drop = corners[0].distance(corners[2]) * 0.05;
        assert!((lowest - (1000.0 - drop)).abs() < 1e-3);
        for n in &mesh.normals[mesh.skirt_start..] {
            assert_eq!(*n, outward);
        }
    }

    #[test]
    fn test_offset_recenters_positions() {
        let patch = Patch::parse("nz-dd").unwrap();
        let mesh = build_mesh(&patch, &flat(8), &MeshParams::default());
        assert!((mesh.offset.length() - R).abs() < R * 0.1);
        let extent = mesh
            .positions
            .iter()
            .map(|p| p.iter().fold(0.0f32, |m, c| m.max(c.abs())))
            .fold(0.0f32, f32::max);
        // A depth-2 patch spans a few thousand kilometers at most.
        assert!((extent as f64) < R * 0.5);
    }

    #[test]
    fn test_uvs_in_range() {
        let patch = Patch::parse("px-bc").unwrap();
        let mesh = build_mesh(&patch, &flat(6), &MeshParams::default());
        assert!(
            mesh.color_uvs
                .iter()
                .all(|uv| (0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1]))
        );
        let max_detail = mesh
            .detail_uvs
            .iter()
            .map(|uv| uv[0].max(uv[1]))
            .fold(0.0f32, f32::max);
        assert!((max_detail - 32.0 * 5.0 / 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_shared_edges_match_between_siblings() {
        let parent = Patch::parse("pz-").unwrap();
        let [a, b, _, _] = parent.children();
        let hm = flat(3);
        let params = no_skirts(R);
        let ma = build_mesh(&a, &hm, &params);
        let mb = build_mesh(&b, &hm, &params);
        // a's south-east corner is b's south-west corner.
        let a_se = (0..ma.vertex_count())
            .map(|i| ma.world_position(i).unwrap())
            .map(|p| p.distance(b.sphere_corners(R)[0]))
            .fold(f64::INFINITY, f64::min);
        let b_sw = (0..mb.vertex_count())
            .map(|i| mb.world_position(i).unwrap())
            .map(|p| p.distance(a.sphere_corners(R)[1]))
            .fold(f64::INFINITY, f64::min);
        assert!(a_se < 1.0 && b_sw < 1.0);
    }
}
