//! Terrain elevation for cube-sphere patches: the heightmap type, web-mercator
//! source tiles, tile providers, persistent blob stores and the heightmap
//! synthesizer that ties them together.

mod heightmap;
mod provider;
mod source;
mod store;
mod synth;
mod tile;

pub use heightmap::{HeightmapDecodeError, PatchHeightmap};
pub use provider::{DEFAULT_TILE_URL, HttpTileProvider, TileFetchError, TileProvider};
pub use source::{FlatSource, HeightmapSource, SourceError};
pub use store::{BlobStore, DirStore, MemoryStore, StoreError, decode_tile, encode_tile};
pub use synth::{HeightmapSynthesizer, SynthParams};
pub use tile::{HeightmapTile, TILE_SIZE, TileCoord, TileFraction, terrarium_elevation};
