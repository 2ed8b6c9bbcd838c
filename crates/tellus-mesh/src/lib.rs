//! Patch meshing: displaced, skirted triangle meshes built from heightmaps,
//! and a background pipeline that builds them off the main thread.

mod async_mesh;
mod builder;
mod mesh;

pub use async_mesh::{BuiltPatch, MeshTask, MeshingPipeline, MeshingResult};
pub use builder::{MeshParams, build_mesh};
pub use mesh::PatchMesh;
