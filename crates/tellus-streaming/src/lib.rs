//! Client-side patch streaming: tracks required, in-flight and resident
//! patches, bounds concurrent builds and evicts idle meshes.

mod cache;
mod remote;

pub use cache::{CacheEntry, PatchState, StreamingCache, StreamingParams, TickReport};
pub use remote::HttpHeightmapSource;
