//! Patch heightmap synthesis from remote raster tiles.
//!
//! Every grid sample of a patch is mapped through the cube-sphere to a
//! longitude/latitude, then to a pixel of a web-mercator tile at a zoom tied
//! to the patch depth. Results are persisted by patch id, and fetched tiles
//! are persisted by tile key, so both repeat patches and neighbours sharing
//! tiles avoid the network.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tellus_cubesphere::{Patch, PatchId, point_to_lon_lat};

use crate::heightmap::PatchHeightmap;
use crate::provider::TileProvider;
use crate::source::{HeightmapSource, SourceError};
use crate::store::{BlobStore, StoreError, decode_tile, encode_tile};
use crate::tile::{HeightmapTile, TileCoord, TileFraction};

/// Parameters for [`HeightmapSynthesizer`].
#[derive(Clone, Debug, PartialEq)]
pub struct SynthParams {
    /// Samples per patch edge.
    pub resolution: usize,
    /// Source zoom is `depth + zoom_offset`...
    pub zoom_offset: u8,
    /// ...capped at `max_zoom`.
    pub max_zoom: u8,
    /// Maximum concurrent tile fetches per patch.
    pub fetch_concurrency: usize,
    /// In-memory tile memo size before it is cleared.
    pub tile_memo_capacity: usize,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            resolution: 128,
            zoom_offset: 1,
            max_zoom: 15,
            fetch_concurrency: 8,
            tile_memo_capacity: 256,
        }
    }
}

impl SynthParams {
    /// Source tile zoom for a patch depth.
    pub fn zoom_for_depth(&self, depth: usize) -> u8 {
        let zoom = depth.saturating_add(self.zoom_offset as usize);
        zoom.min(self.max_zoom as usize) as u8
    }
}

/// Builds and persists patch heightmaps.
///
/// Shared across request threads; all state is behind `&self`.
pub struct HeightmapSynthesizer<P> {
    provider: P,
    heightmaps: Arc<dyn BlobStore>,
    tiles: Arc<dyn BlobStore>,
    tile_memo: DashMap<TileCoord, Arc<HeightmapTile>>,
    params: SynthParams,
}

impl<P: TileProvider> HeightmapSynthesizer<P> {
    pub fn new(
        provider: P,
        heightmaps: Arc<dyn BlobStore>,
        tiles: Arc<dyn BlobStore>,
        params: SynthParams,
    ) -> Self {
        Self {
            provider,
            heightmaps,
            tiles,
            tile_memo: DashMap::new(),
            params: SynthParams {
                resolution: params.resolution.max(2),
                fetch_concurrency: params.fetch_concurrency.max(1),
                ..params
            },
        }
    }

    pub fn params(&self) -> &SynthParams {
        &self.params
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The heightmap for a patch as little-endian `f32` bytes.
    ///
    /// Never fails: unreachable tiles read as sea level and store errors
    /// are logged.
    pub fn load_patch_bytes(&self, id: &PatchId) -> Vec<u8> {
        let expected = self.params.resolution * self.params.resolution * 4;
        match self.heightmaps.get(id.as_str()) {
            Ok(Some(bytes)) if bytes.len() == expected => return bytes,
            Ok(Some(bytes)) => {
                tracing::warn!(
                    patch = %id,
                    len = bytes.len(),
                    expected,
                    "stored heightmap has the wrong size, rebuilding"
                );
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(patch = %id, error = %e, "heightmap store read failed"),
        }

        let heightmap = self.synthesize(id);
        let bytes = heightmap.to_le_bytes();
        if let Err(e) = self.heightmaps.put(id.as_str(), &bytes) {
            tracing::warn!(patch = %id, error = %e, "failed to persist heightmap");
        }
        bytes
    }

    /// The heightmap for a patch.
    pub fn load_patch_heightmap(&self, id: &PatchId) -> PatchHeightmap {
        let bytes = self.load_patch_bytes(id);
        PatchHeightmap::from_le_bytes(self.params.resolution, &bytes).unwrap_or_else(|e| {
            tracing::warn!(patch = %id, error = %e, "heightmap decode failed");
            PatchHeightmap::zeros(self.params.resolution)
        })
    }

    /// Drop a persisted heightmap so the next request rebuilds it.
    pub fn invalidate(&self, id: &PatchId) -> Result<bool, StoreError> {
        self.heightmaps.remove(id.as_str())
    }

    /// Tile addresses sampled by a patch, one per grid sample, row-major.
    pub fn sample_tiles(&self, patch: &Patch) -> Vec<TileFraction> {
        let res = self.params.resolution;
        let zoom = self.params.zoom_for_depth(patch.depth());
        let face = patch.face();
        let mut samples = Vec::with_capacity(res * res);
        for j in 0..res {
            for i in 0..res {
                let cube = face.to_cube(patch.grid_local(i as f64, j as f64, res));
                samples.push(TileCoord::fraction_at(point_to_lon_lat(cube), zoom));
            }
        }
        samples
    }

    fn synthesize(&self, id: &PatchId) -> PatchHeightmap {
        let start = Instant::now();
        let patch = Patch::from_id(id);
        let samples = self.sample_tiles(&patch);

        let needed: BTreeSet<TileCoord> = samples.iter().map(|s| s.tile).collect();
        let tiles = self.load_tiles(&needed);

        let mut degraded = 0usize;
        let values = samples
            .iter()
            .map(|sample| {
                tiles
                    .get(&sample.tile)
                    .and_then(|tile| tile.elevation_at(sample.offset))
                    .unwrap_or_else(|| {
                        degraded += 1;
                        0.0
                    })
            })
            .collect();
        if degraded > 0 {
            tracing::warn!(patch = %id, degraded, "samples missing from source tiles");
        }

        tracing::info!(
            patch = %id,
            tiles = needed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "synthesized heightmap"
        );
        PatchHeightmap::new(self.params.resolution, values)
            .unwrap_or_else(|_| PatchHeightmap::zeros(self.params.resolution))
    }

    /// Resolve tiles from the memo, the tile store, or the provider.
    fn load_tiles(&self, coords: &BTreeSet<TileCoord>) -> HashMap<TileCoord, Arc<HeightmapTile>> {
        let mut tiles = HashMap::with_capacity(coords.len());
        let mut missing = Vec::new();

        for &coord in coords {
            if !coord.is_in_range() {
                tiles.insert(coord, Arc::new(HeightmapTile::empty()));
            } else if let Some(tile) = self.tile_memo.get(&coord) {
                tiles.insert(coord, Arc::clone(tile.value()));
            } else if let Some(tile) = self.stored_tile(coord) {
                let tile = Arc::new(tile);
                self.memoize(coord, &tile);
                tiles.insert(coord, tile);
            } else {
                missing.push(coord);
            }
        }

        for batch in missing.chunks(self.params.fetch_concurrency) {
            let fetched: Vec<(TileCoord, Arc<HeightmapTile>)> = std::thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|&coord| scope.spawn(move || (coord, self.fetch_tile(coord))))
                    .collect();
                handles
                    .into_iter()
                    .zip(batch)
                    .map(|(handle, &coord)| {
                        handle
                            .join()
                            .unwrap_or_else(|_| (coord, Arc::new(HeightmapTile::empty())))
                    })
                    .collect()
            });
            tiles.extend(fetched);
        }
        tiles
    }

    fn stored_tile(&self, coord: TileCoord) -> Option<HeightmapTile> {
        match self.tiles.get(&coord.key()) {
            Ok(Some(bytes)) => match decode_tile(&bytes) {
                Ok(tile) if tile.is_consistent() => Some(tile),
                Ok(_) | Err(_) => {
                    tracing::warn!(%coord, "discarding corrupt stored tile");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(%coord, error = %e, "tile store read failed");
                None
            }
        }
    }

    /// Fetch one tile, substituting the empty tile on failure. Only real
    /// tiles are persisted.
    fn fetch_tile(&self, coord: TileCoord) -> Arc<HeightmapTile> {
        match self.provider.fetch(coord) {
            Ok(tile) => {
                match encode_tile(&tile) {
                    Ok(bytes) => {
                        if let Err(e) = self.tiles.put(&coord.key(), &bytes) {
                            tracing::warn!(%coord, error = %e, "failed to persist tile");
                        }
                    }
                    Err(e) => tracing::warn!(%coord, error = %e, "failed to encode tile"),
                }
                let tile = Arc::new(tile);
                self.memoize(coord, &tile);
                tile
            }
            Err(e) => {
                tracing::warn!(%coord, error = %e, "tile fetch failed, using empty tile");
                Arc::new(HeightmapTile::empty())
            }
        }
    }

    fn memoize(&self, coord: TileCoord, tile: &Arc<HeightmapTile>) {
        if self.tile_memo.len() >= self.params.tile_memo_capacity {
            self.tile_memo.clear();
        }
        self.tile_memo.insert(coord, Arc::clone(tile));
    }
}

impl<P: TileProvider> HeightmapSource for HeightmapSynthesizer<P> {
    fn load(&self, id: &PatchId) -> Result<PatchHeightmap, SourceError> {
        Ok(self.load_patch_heightmap(id))
    }
}
