// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::cache::TieredCache;
use crate::modules::common::periodic::{PeriodicTask, TaskHandle};
use crate::modules::settings::cli::SETTINGS;
use std::sync::Arc;
use std::time::Duration;

/// Periodically drops expired cache entries and enforces the disk budget.
pub struct CacheSweepTask;

impl CacheSweepTask {
    pub fn start(cache: Arc<TieredCache>) -> TaskHandle {
        let periodic_task = PeriodicTask::new("cache-sweeper");
        let interval =
            Duration::from_secs(SETTINGS.rustscribe_cache_sweep_interval_minutes * 60);

        let task = move || {
            let cache = cache.clone();
            async move {
                cache.evict_expired().await?;
                cache.evict_to_size_budget().await?;
                Ok(())
            }
        };

        periodic_task.start(task, interval, true, false)
    }
}
