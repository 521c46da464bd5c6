// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use mimalloc::MiMalloc;
use modules::{
    cache::{task::CacheSweepTask, CacheConfig, TieredCache},
    common::signal::{SignalManager, SIGNAL_MANAGER},
    context::Initialize,
    disk::DiskUsageProbe,
    error::RustScribeResult,
    index::memory::MemoryIndexStore,
    logger,
    maintenance::{MaintenanceConfig, MaintenanceEngine},
    settings::cli::SETTINGS,
    settings::dir::{DataDirManager, DATA_DIR_MANAGER},
    storage::fs::FsTaskFileStore,
};
use std::sync::Arc;
use tracing::info;

mod modules;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

static LOGO: &str = r#"
  ____            _   ____            _ _
 |  _ \ _   _ ___| |_/ ___|  ___ _ __(_) |__   ___
 | |_) | | | / __| __\___ \ / __| '__| | '_ \ / _ \
 |  _ <| |_| \__ \ |_ ___) | (__| |  | | |_) |  __/
 |_| \_\\__,_|___/\__|____/ \___|_|  |_|_.__/ \___|

"#;

#[tokio::main]
async fn main() -> RustScribeResult<()> {
    logger::initialize_logging();
    info!("{}", LOGO);
    info!("Starting rustscribe maintenance engine");
    info!("Version:  {}", rustscribe_version!());

    if let Err(error) = initialize().await {
        eprintln!("{:?}", error);
        return Err(error);
    }

    run().await
}

async fn initialize() -> RustScribeResult<()> {
    SignalManager::initialize().await?;
    DataDirManager::initialize().await?;
    Ok(())
}

async fn run() -> RustScribeResult<()> {
    let index = Arc::new(MemoryIndexStore::new());
    let files = Arc::new(FsTaskFileStore::new());
    let cache = Arc::new(TieredCache::new(CacheConfig::from_settings()));
    let probe = DiskUsageProbe::new(
        DATA_DIR_MANAGER.root_dir.clone(),
        SETTINGS.rustscribe_disk_warning_percent,
        SETTINGS.rustscribe_disk_critical_percent,
    );

    let engine = MaintenanceEngine::new(
        MaintenanceConfig::from_settings(),
        index,
        files,
        cache.clone(),
        probe,
    )?;
    engine.start()?;
    let cache_sweeper = CacheSweepTask::start(cache);

    let mut shutdown = SIGNAL_MANAGER.subscribe();
    let _ = shutdown.recv().await;
    info!("Shutting down...");

    cache_sweeper.cancel().await;
    engine.stop().await;
    info!("Shutdown complete");
    Ok(())
}
