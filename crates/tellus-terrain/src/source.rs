//! The seam through which mesh builders obtain heightmaps.

use tellus_cubesphere::PatchId;

use crate::heightmap::{HeightmapDecodeError, PatchHeightmap};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("transport error fetching {id}: {message}")]
    Transport { id: String, message: String },

    #[error("patch {id} request returned HTTP {status}")]
    Status { id: String, status: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid heightmap payload: {0}")]
    Decode(#[from] HeightmapDecodeError),
}

/// Produces the heightmap for a patch.
pub trait HeightmapSource: Send + Sync {
    fn load(&self, id: &PatchId) -> Result<PatchHeightmap, SourceError>;
}

/// A source that returns flat heightmaps, for offline use.
#[derive(Clone, Copy, Debug)]
pub struct FlatSource {
    pub resolution: usize,
}

impl HeightmapSource for FlatSource {
    fn load(&self, _id: &PatchId) -> Result<PatchHeightmap, SourceError> {
        Ok(PatchHeightmap::zeros(self.resolution))
    }
}
