//! HTTP endpoint serving synthesized patch heightmaps.
//!
//! `GET /node/<id>` returns `resolution²` little-endian `f32` elevations,
//! `GET /node-json/<id>` the same values as nested JSON rows and
//! `DELETE /node/<id>` drops the persisted copy so the next request
//! rebuilds it.

mod server;

pub use server::{PatchServer, Route, ServerError};
