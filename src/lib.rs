pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod directory;
pub mod engine;
pub mod error;
pub mod ranking;
pub mod stats;
pub mod study;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use cache::MemoryCache;
use clock::{SharedClock, SystemClock};
use config::EngineConfig;
use db::Database;
use engine::StudyEngine;
use study::reaper_loop;

pub use error::{StudyError, StudyResult};

const DEFAULT_CONFIG_PATH: &str = "studytrack.json";

/// Boots the engine as a daemon: durable store, in-process cache and the
/// reaper loop, until Ctrl-C.
pub fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("studytrack starting up...");

    let config_path = std::env::var("STUDYTRACK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = EngineConfig::load(Some(&config_path))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let database = Database::new(config.database_path.clone())?;
        info!("Using database at {}", database.path().display());

        let clock: SharedClock = Arc::new(SystemClock);
        let cache = Arc::new(MemoryCache::new(clock.clone()));
        let directory = Arc::new(database.clone());
        let engine = StudyEngine::new(
            &config,
            database,
            cache,
            directory.clone(),
            directory.clone(),
            directory,
            clock,
        );

        // Sessions left open by a previous run are reclaimed by the first
        // sweep, since the in-process cache starts with no liveness markers.
        let cancel_token = CancellationToken::new();
        let reaper = tokio::spawn(reaper_loop(
            engine.reaper(),
            config.reaper_interval(),
            cancel_token.clone(),
        ));

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("Shutdown requested");

        cancel_token.cancel();
        if let Err(err) = reaper.await {
            warn!("Reaper task failed to join: {err}");
        }
        Ok::<(), anyhow::Error>(())
    })
}
