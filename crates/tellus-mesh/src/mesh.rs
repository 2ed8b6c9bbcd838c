//! Per-patch renderable geometry.

use glam::DVec3;
use tellus_cubesphere::PatchId;

/// Non-indexed triangle soup for one patch.
///
/// Positions are relative to `offset`, the center of the mesh's bounding
/// box, so vertex coordinates stay small for any planet radius. Every
/// attribute array has one entry per vertex, three vertices per triangle.
/// Skirt triangles follow the surface triangles, starting at `skirt_start`.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchMesh {
    pub patch_id: PatchId,
    pub offset: DVec3,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    /// Equirectangular coordinates into a global color texture.
    pub color_uvs: Vec<[f32; 2]>,
    /// Tiling coordinates for a detail noise texture.
    pub detail_uvs: Vec<[f32; 2]>,
    /// Index of the first skirt vertex (equal to `vertex_count()` without skirts).
    pub skirt_start: usize,
}

impl PatchMesh {
    /// A mesh with no vertices.
    pub fn empty(patch_id: PatchId) -> Self {
        Self {
            patch_id,
            offset: DVec3::ZERO,
            positions: Vec::new(),
            normals: Vec::new(),
            color_uvs: Vec::new(),
            detail_uvs: Vec::new(),
            skirt_start: 0,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Absolute position of vertex `index` (position plus offset).
    pub fn world_position(&self, index: usize) -> Option<DVec3> {
        self.positions
            .get(index)
            .map(|p| DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64) + self.offset)
    }

    /// Raw bytes of the position buffer for GPU upload.
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    pub fn color_uv_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.color_uvs)
    }

    pub fn detail_uv_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.detail_uvs)
    }

    /// Total size of all attribute buffers in bytes.
    pub fn byte_size(&self) -> usize {
        self.position_bytes().len()
            + self.normal_bytes().len()
            + self.color_uv_bytes().len()
            + self.detail_uv_bytes().len()
    }
}
