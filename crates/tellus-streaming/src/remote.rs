//! Heightmaps fetched from a patch data server.

use std::io::Read;
use std::time::Duration;

use tellus_cubesphere::PatchId;
use tellus_terrain::{HeightmapSource, PatchHeightmap, SourceError};

/// Largest heightmap body accepted (a 1024² grid).
const MAX_BODY_BYTES: u64 = 1024 * 1024 * 4;

/// Loads heightmaps with `GET {base_url}/node/{id}`.
pub struct HttpHeightmapSource {
    agent: ureq::Agent,
    base_url: String,
    /// Expected grid resolution; inferred from the body length when `None`.
    resolution: Option<usize>,
}

impl HttpHeightmapSource {
    pub fn new(base_url: impl Into<String>, resolution: Option<usize>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url,
            resolution,
        }
    }

    pub fn url_for(&self, id: &PatchId) -> String {
        format!("{}/node/{}", self.base_url, id)
    }
}

impl HeightmapSource for HttpHeightmapSource {
    fn load(&self, id: &PatchId) -> Result<PatchHeightmap, SourceError> {
        let response = match self.agent.get(&self.url_for(id)).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(SourceError::Status {
                    id: id.to_string(),
                    status,
                });
            }
            Err(e) => {
                return Err(SourceError::Transport {
                    id: id.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)?;

        let heightmap = match self.resolution {
            Some(resolution) => PatchHeightmap::from_le_bytes(resolution, &body)?,
            None => PatchHeightmap::from_le_bytes_square(&body)?,
        };
        Ok(heightmap)
    }
}
