//! Patch data server binary.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p tellus-server -- --port 8080 --data-dir ./data`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tellus_config::{CliArgs, Config};
use tellus_server::PatchServer;
use tellus_terrain::{DirStore, HeightmapSynthesizer, HttpTileProvider};
use tracing::{error, info};

fn main() {
    let args = CliArgs::parse();
    let config_dir = args.config_dir();

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    tellus_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let data_dir = &config.server.data_dir;
    let stores = DirStore::open(data_dir.join("nodes"))
        .and_then(|nodes| Ok((nodes, DirStore::open(data_dir.join("tiles"))?)));
    let (nodes, tiles) = match stores {
        Ok(stores) => stores,
        Err(e) => {
            error!(dir = %data_dir.display(), error = %e, "failed to open data stores");
            std::process::exit(1);
        }
    };
    info!(dir = %data_dir.display(), "using data directory");

    let provider = HttpTileProvider::new(
        config.server.tile_url.clone(),
        Duration::from_millis(config.server.tile_timeout_ms),
    );
    let synth = Arc::new(HeightmapSynthesizer::new(
        provider,
        Arc::new(nodes),
        Arc::new(tiles),
        config.synth_params(),
    ));

    match PatchServer::start(&config.server_addr(), config.server.threads, synth) {
        Ok(server) => {
            info!("Listening on {}", server.local_addr());
            server.join();
        }
        Err(e) => {
            error!(error = %e, "patch server failed to start");
            std::process::exit(1);
        }
    }
}
