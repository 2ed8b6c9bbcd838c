//! Headless viewer that streams planet patches along a flight path.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p tellus-demo -- --server http://127.0.0.1:8080` to
//! stream from a patch server, or without `--server` to synthesize heightmaps
//! in-process. `--flat` skips elevation tiles entirely.

mod viewer;

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tellus_config::{CliArgs, Config};
use tellus_cubesphere::LonLat;
use tellus_lod::LodSelector;
use tellus_streaming::{HttpHeightmapSource, StreamingCache};
use tellus_terrain::{
    FlatSource, HeightmapSource, HeightmapSynthesizer, HttpTileProvider, MemoryStore,
};
use tracing::{info, warn};

use crate::viewer::{Flight, Viewer};

#[derive(Parser, Debug)]
#[command(name = "tellus-demo", about = "Headless Tellus viewer")]
struct DemoArgs {
    #[command(flatten)]
    common: CliArgs,

    /// Starting latitude in degrees.
    #[arg(long, default_value_t = 46.55)]
    lat: f64,

    /// Starting longitude in degrees.
    #[arg(long, default_value_t = 7.98)]
    lon: f64,

    /// Starting altitude above sea level in meters.
    #[arg(long, default_value_t = 25_000.0)]
    altitude: f64,

    /// Degrees of longitude flown per tick.
    #[arg(long, default_value_t = 0.002)]
    drift: f64,

    /// Meters of descent per tick.
    #[arg(long, default_value_t = 100.0)]
    descent: f64,

    /// Number of ticks to run.
    #[arg(long, default_value_t = 300)]
    ticks: u32,

    /// Milliseconds between ticks.
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,

    /// Patch server base URL (overrides `streaming.server_url`).
    #[arg(long)]
    server: Option<String>,

    /// Use flat heightmaps instead of elevation tiles.
    #[arg(long)]
    flat: bool,
}

fn heightmap_source(config: &Config, flat: bool) -> Arc<dyn HeightmapSource> {
    let resolution = config.planet.resolution;
    if flat {
        info!(resolution, "using flat heightmaps");
        return Arc::new(FlatSource { resolution });
    }
    if !config.streaming.server_url.is_empty() {
        info!(url = %config.streaming.server_url, "streaming from patch server");
        return Arc::new(HttpHeightmapSource::new(
            config.streaming.server_url.clone(),
            Some(resolution),
            Duration::from_millis(config.streaming.request_timeout_ms),
        ));
    }
    info!(tiles = %config.server.tile_url, "synthesizing heightmaps in-process");
    let provider = HttpTileProvider::new(
        config.server.tile_url.clone(),
        Duration::from_millis(config.server.tile_timeout_ms),
    );
    Arc::new(HeightmapSynthesizer::new(
        provider,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        config.synth_params(),
    ))
}

fn main() {
    let args = DemoArgs::parse();
    let config_dir = args.common.config_dir();

    let on_disk = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    let mut config = on_disk.clone();
    config.apply_cli_overrides(&args.common);
    if let Some(ref url) = args.server {
        config.streaming.server_url = url.clone();
    }

    let log_dir = config_dir.join("logs");
    tellus_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let cache = match StreamingCache::new(
        config.streaming_params(),
        config.mesh_params(),
        heightmap_source(&config, args.flat),
    ) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::error!(error = %e, "failed to start mesh workers");
            std::process::exit(1);
        }
    };
    let mut viewer = Viewer::new(LodSelector::new(config.lod_params()), cache);

    let mut flight = Flight {
        lon_lat: LonLat {
            lon: args.lon,
            lat: args.lat,
        },
        altitude_m: args.altitude,
        drift_deg: args.drift,
        descent_m: args.descent,
        clearance_m: 50.0,
    };
    let radius = config.planet.radius_m;
    let tick = Duration::from_millis(args.tick_ms);

    for n in 0..args.ticks {
        let frame_start = Instant::now();
        let stats = viewer.step(flight.position(radius), frame_start);
        if stats.failed > 0 || stats.timed_out > 0 {
            warn!(failed = stats.failed, timed_out = stats.timed_out, "patch builds lost");
        }
        if n % 10 == 0 {
            info!(
                tick = n,
                lon = flight.lon_lat.lon,
                lat = flight.lon_lat.lat,
                altitude_m = flight.altitude_m,
                ground_m = stats.ground_m,
                required = stats.required,
                ready = stats.ready,
                resident = stats.resident,
                in_flight = stats.in_flight,
                completed = stats.completed,
                evicted = stats.evicted,
                vertices = stats.vertices,
                mesh_bytes = stats.mesh_bytes,
                "frame"
            );
        }
        if n % 100 == 99 {
            match on_disk.reload(&config_dir) {
                Ok(Some(_)) => info!("config.ron changed; restart to apply"),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "config reload failed"),
            }
        }

        flight.advance(stats.ground_m as f64);
        if let Some(rest) = tick.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let resident = viewer.cache().resident_count();
    info!(resident, "flight finished");
}
