//! Command-line overrides shared by the Tellus binaries.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "tellus", about = "Tellus planet terrain")]
pub struct CliArgs {
    /// Patch server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Patch server bind address.
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory for persisted heightmaps and tiles.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Elevation tile URL template.
    #[arg(long)]
    pub tile_url: Option<String>,

    /// Heightmap samples per patch edge.
    #[arg(long)]
    pub resolution: Option<usize>,

    /// Deepest quadtree level.
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Log filter (error, warn, info, debug, trace or an EnvFilter directive).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    /// The `--config` directory, or the platform default.
    pub fn config_dir(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(crate::default_config_dir)
    }
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(ref bind) = args.bind {
            self.server.bind = bind.clone();
        }
        if let Some(ref dir) = args.data_dir {
            self.server.data_dir = dir.clone();
        }
        if let Some(ref url) = args.tile_url {
            self.server.tile_url = url.clone();
        }
        if let Some(resolution) = args.resolution {
            self.planet.resolution = resolution;
        }
        if let Some(depth) = args.max_depth {
            self.planet.max_depth = depth;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
