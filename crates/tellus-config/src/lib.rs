//! Runtime configuration for the Tellus server and viewer.
//!
//! Settings persist to disk as `config.ron`, tolerate missing and unknown
//! fields, can be overridden from the command line, and convert into the
//! parameter structs of the LOD, terrain, mesh and streaming crates.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE, Config, DebugConfig, LodConfig, MeshConfig, PlanetConfig, ServerConfig,
    StreamingConfig, default_config_dir,
};
pub use error::ConfigError;
