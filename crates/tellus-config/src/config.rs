//! Configuration structs with defaults and RON persistence.

use std::f64::consts::FRAC_PI_2;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tellus_lod::{DistanceMetric, LodParams};
use tellus_mesh::{MeshParams, MeshingPipeline};
use tellus_streaming::StreamingParams;
use tellus_terrain::{DEFAULT_TILE_URL, SynthParams};

use crate::error::ConfigError;

/// File name inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// `<platform config dir>/tellus`, or `./tellus` when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("tellus"))
        .unwrap_or_else(|| PathBuf::from("tellus"))
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("tellus"))
        .unwrap_or_else(|| PathBuf::from("tellus-data"))
}

/// Top-level configuration shared by the server and the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub planet: PlanetConfig,
    pub lod: LodConfig,
    pub mesh: MeshConfig,
    pub streaming: StreamingConfig,
    pub server: ServerConfig,
    pub debug: DebugConfig,
}

/// Planet geometry and patch sampling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlanetConfig {
    /// Sea-level radius in meters.
    pub radius_m: f64,
    /// Deepest quadtree level.
    pub max_depth: usize,
    /// Heightmap samples per patch edge.
    pub resolution: usize,
}

/// Level-of-detail selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Apparent angular diameter (radians) below which patches stop refining.
    pub angular_threshold: f64,
    /// Measure along the surface instead of straight-line chords.
    pub great_circle: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeshConfig {
    pub skirts: bool,
    /// Skirt drop as a fraction of the patch diagonal.
    pub skirt_depth_fraction: f64,
    pub detail_tiling: f32,
}

/// Client-side patch streaming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    pub max_in_flight: usize,
    /// Resident patches above which idle ones are evicted.
    pub capacity: usize,
    pub min_idle_ms: u64,
    pub build_timeout_ms: u64,
    /// Mesh worker threads (0 = one less than the CPU count).
    pub workers: usize,
    /// Patch data server; the viewer synthesizes locally when empty.
    pub server_url: String,
    pub request_timeout_ms: u64,
}

/// Patch data server and its terrain source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Request handler threads.
    pub threads: usize,
    /// Root of the persisted heightmap and tile stores.
    pub data_dir: PathBuf,
    /// Elevation tile URL template with `{z}`, `{x}` and `{y}` placeholders.
    pub tile_url: String,
    pub tile_timeout_ms: u64,
    /// Source zoom is `depth + zoom_offset`, capped at `max_zoom`.
    pub zoom_offset: u8,
    pub max_zoom: u8,
    pub fetch_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Directory for the JSON log file in debug builds.
    pub log_dir: Option<PathBuf>,
}

impl Default for PlanetConfig {
    fn default() -> Self {
        Self {
            radius_m: 6_378_137.0,
            max_depth: 11,
            resolution: 128,
        }
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            angular_threshold: FRAC_PI_2,
            great_circle: false,
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            skirts: true,
            skirt_depth_fraction: 0.05,
            detail_tiling: 32.0,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            capacity: 512,
            min_idle_ms: 5_000,
            build_timeout_ms: 30_000,
            workers: 0,
            server_url: String::new(),
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            threads: 4,
            data_dir: default_data_dir(),
            tile_url: DEFAULT_TILE_URL.to_string(),
            tile_timeout_ms: 10_000,
            zoom_offset: 1,
            max_zoom: 15,
            fetch_concurrency: 8,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info,tiny_http=warn,ureq=warn".to_string(),
            log_dir: None,
        }
    }
}

// --- Conversions ---

impl Config {
    pub fn lod_params(&self) -> LodParams {
        LodParams {
            radius: self.planet.radius_m,
            max_depth: self.planet.max_depth,
            angular_threshold: self.lod.angular_threshold,
            metric: if self.lod.great_circle {
                DistanceMetric::GreatCircle
            } else {
                DistanceMetric::Chord
            },
        }
    }

    pub fn mesh_params(&self) -> MeshParams {
        MeshParams {
            radius: self.planet.radius_m,
            skirts: self.mesh.skirts,
            skirt_depth_fraction: self.mesh.skirt_depth_fraction,
            detail_tiling: self.mesh.detail_tiling,
        }
    }

    pub fn synth_params(&self) -> SynthParams {
        SynthParams {
            resolution: self.planet.resolution,
            zoom_offset: self.server.zoom_offset,
            max_zoom: self.server.max_zoom,
            fetch_concurrency: self.server.fetch_concurrency,
            ..SynthParams::default()
        }
    }

    pub fn streaming_params(&self) -> StreamingParams {
        let workers = match self.streaming.workers {
            0 => MeshingPipeline::default_worker_count(),
            n => n,
        };
        StreamingParams {
            max_in_flight: self.streaming.max_in_flight,
            capacity: self.streaming.capacity,
            min_idle: Duration::from_millis(self.streaming.min_idle_ms),
            build_timeout: Duration::from_millis(self.streaming.build_timeout_ms),
            radius: self.planet.radius_m,
            max_depth: self.planet.max_depth,
            workers,
        }
    }

    /// `bind:port` for the patch server listener.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Returns `Some(new_config)` if the file on disk differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = std::fs::read_to_string(config_dir.join(CONFIG_FILE))
            .map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
