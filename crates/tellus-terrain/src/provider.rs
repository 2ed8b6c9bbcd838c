//! Remote raster elevation tile providers.

use std::io::Read;
use std::time::Duration;

use crate::tile::{HeightmapTile, TileCoord};

/// Default terrarium tile endpoint.
pub const DEFAULT_TILE_URL: &str =
    "https://s3.amazonaws.com/elevation-tiles-prod/terrarium/{z}/{x}/{y}.png";

/// Largest encoded tile body accepted.
const MAX_TILE_BYTES: u64 = 16 * 1024 * 1024;

/// Why a tile could not be produced. Callers substitute the empty tile.
#[derive(Debug, thiserror::Error)]
pub enum TileFetchError {
    #[error("tile {0} is outside the tile pyramid")]
    OutOfRange(TileCoord),

    #[error("request for {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("reading tile body failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoding tile image failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("tile {coord} unavailable: {reason}")]
    Unavailable { coord: TileCoord, reason: String },
}

/// A source of raster elevation tiles addressed by `(zoom, x, y)`.
pub trait TileProvider: Send + Sync {
    fn fetch(&self, coord: TileCoord) -> Result<HeightmapTile, TileFetchError>;
}

/// Fetches tiles over HTTP from a `{z}/{x}/{y}` URL template.
pub struct HttpTileProvider {
    agent: ureq::Agent,
    url_template: String,
}

impl HttpTileProvider {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            url_template: url_template.into(),
        }
    }

    /// The URL a tile is requested from.
    pub fn url_for(&self, coord: TileCoord) -> String {
        self.url_template
            .replace("{z}", &coord.zoom.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }
}

impl Default for HttpTileProvider {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_URL, Duration::from_secs(10))
    }
}

impl TileProvider for HttpTileProvider {
    fn fetch(&self, coord: TileCoord) -> Result<HeightmapTile, TileFetchError> {
        if !coord.is_in_range() {
            return Err(TileFetchError::OutOfRange(coord));
        }
        let url = self.url_for(coord);
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| TileFetchError::Http {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_TILE_BYTES)
            .read_to_end(&mut body)?;
        tracing::debug!(%coord, bytes = body.len(), "fetched tile");
        Ok(HeightmapTile::decode(&body)?)
    }
}
