// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::cache::{CacheConfig, TieredCache};
use crate::modules::disk::DiskUsageProbe;
use crate::modules::error::{code::ErrorCode, RustScribeResult};
use crate::modules::index::memory::MemoryIndexStore;
use crate::modules::index::{TaskIndexStore, TaskRecord, TaskStatus};
use crate::modules::maintenance::sweeper::RetentionPolicy;
use crate::modules::maintenance::{MaintenanceConfig, MaintenanceEngine};
use crate::modules::storage::fs::FsTaskFileStore;
use crate::modules::storage::{TaskDescriptor, TaskFileStore};
use crate::utc_now;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const DAY_MS: i64 = 24 * 3600 * 1000;

fn engine_config() -> MaintenanceConfig {
    MaintenanceConfig {
        cleanup_enabled: true,
        cleanup_interval: Duration::from_secs(24 * 3600),
        cleanup_check_interval: Duration::from_secs(3600),
        retention: RetentionPolicy {
            task_retention_days: 30,
            failed_task_retention_days: 7,
        },
        disk_monitor_enabled: false,
        disk_interval: Duration::from_secs(1800),
        disk_warning_percent: 80.0,
        disk_critical_percent: 90.0,
        auto_cleanup_on_critical: true,
        critical_retention_days: 7,
        optimize_enabled: false,
        optimize_interval: Duration::from_secs(168 * 3600),
        optimize_check_interval: Duration::from_secs(24 * 3600),
        compact_threshold_bytes: 100 * 1024 * 1024,
        report_history_limit: 50,
    }
}

fn cache_config() -> CacheConfig {
    CacheConfig {
        metadata_ttl: Duration::from_secs(3600),
        thumbnail_ttl: Duration::from_secs(3600),
        query_ttl: Duration::from_secs(300),
        max_disk_bytes: 1024 * 1024,
        memory_capacity: 8,
    }
}

fn collaborators(root: &Path) -> (Arc<FsTaskFileStore>, Arc<TieredCache>, DiskUsageProbe) {
    for sub in ["tasks", "temp", "metadata", "thumbnails"] {
        std::fs::create_dir_all(root.join(sub)).unwrap();
    }
    let files = Arc::new(FsTaskFileStore::with_dirs(
        root.join("tasks"),
        root.join("temp"),
    ));
    let cache = Arc::new(TieredCache::with_dirs(
        root.join("metadata"),
        root.join("thumbnails"),
        cache_config(),
    ));
    let probe = DiskUsageProbe::new(root, 80.0, 90.0);
    (files, cache, probe)
}

async fn seed_expired_task(index: &MemoryIndexStore, files: &FsTaskFileStore, id: u64) {
    let then = utc_now!() - 60 * DAY_MS;
    index
        .create_task(TaskRecord {
            id,
            name: format!("task-{id}"),
            status: TaskStatus::Completed,
            created_at: then,
            completed_at: Some(then),
        })
        .await
        .unwrap();
    let folder = files
        .create_task_folder(TaskDescriptor {
            task_id: id,
            name: format!("task-{id}"),
            created_at: then,
        })
        .await
        .unwrap();
    std::fs::write(folder.join("transcript.txt"), vec![0u8; 256]).unwrap();
}

/// Index store whose listings stall, to pin a cleanup run in flight.
struct StallingIndexStore {
    inner: MemoryIndexStore,
    delay: Duration,
}

impl TaskIndexStore for StallingIndexStore {
    async fn create_task(&self, record: TaskRecord) -> RustScribeResult<()> {
        self.inner.create_task(record).await
    }

    async fn get_task(&self, id: u64) -> RustScribeResult<Option<TaskRecord>> {
        self.inner.get_task(id).await
    }

    async fn list_tasks_by_status(&self, status: TaskStatus) -> RustScribeResult<Vec<TaskRecord>> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_tasks_by_status(status).await
    }

    async fn delete_task(&self, id: u64) -> RustScribeResult<bool> {
        self.inner.delete_task(id).await
    }

    async fn task_count(&self) -> RustScribeResult<usize> {
        self.inner.task_count().await
    }

    async fn storage_size(&self) -> RustScribeResult<u64> {
        self.inner.storage_size().await
    }

    async fn compact(&self) -> RustScribeResult<()> {
        self.inner.compact().await
    }

    async fn reindex(&self) -> RustScribeResult<()> {
        self.inner.reindex().await
    }

    async fn integrity_check(&self) -> RustScribeResult<bool> {
        self.inner.integrity_check().await
    }
}

#[tokio::test]
async fn forced_cleanup_sweeps_and_reports() {
    let dir = tempdir().unwrap();
    let (files, cache, probe) = collaborators(dir.path());
    let index = Arc::new(MemoryIndexStore::new());
    seed_expired_task(&index, &files, 1).await;

    let engine = MaintenanceEngine::new(engine_config(), index.clone(), files, cache, probe).unwrap();
    let report = engine.force_cleanup(None).await.unwrap();

    assert!(report.files_cleaned >= 1);
    assert!(report.space_freed >= 256);
    assert!(index.get_task(1).await.unwrap().is_none());

    let status = engine.maintenance_status();
    assert!(status.last_cleanup_at.is_some());
    assert_eq!(status.report_count, 1);
    assert_eq!(engine.recent_reports(None).len(), 1);

    // A second sweep has nothing left to do.
    let report = engine.force_cleanup(None).await.unwrap();
    assert_eq!(report.files_cleaned, 0);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn concurrent_cleanups_are_single_flight() {
    let dir = tempdir().unwrap();
    let (files, cache, probe) = collaborators(dir.path());
    let index = Arc::new(StallingIndexStore {
        inner: MemoryIndexStore::new(),
        delay: Duration::from_millis(300),
    });

    let engine = MaintenanceEngine::new(engine_config(), index, files, cache, probe).unwrap();
    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.force_cleanup(None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = engine.force_cleanup(None).await;
    assert_eq!(second.unwrap_err().code(), ErrorCode::MaintenanceBusy);
    first.await.unwrap().unwrap();
}

#[tokio::test]
async fn optimize_compacts_only_past_the_threshold() {
    let dir = tempdir().unwrap();
    let (files, cache, probe) = collaborators(dir.path());
    let index = Arc::new(MemoryIndexStore::new());
    index
        .create_task(TaskRecord {
            id: 1,
            name: "only".into(),
            status: TaskStatus::Completed,
            created_at: utc_now!(),
            completed_at: Some(utc_now!()),
        })
        .await
        .unwrap();

    let mut config = engine_config();
    config.compact_threshold_bytes = 1;
    let engine =
        MaintenanceEngine::new(config, index.clone(), files.clone(), cache.clone(), probe).unwrap();
    let report = engine.force_optimize().await.unwrap();
    assert!(report.actions.iter().any(|a| a.contains("compacted")));
    assert!(report.actions.iter().any(|a| a.contains("integrity")));

    let mut config = engine_config();
    config.compact_threshold_bytes = u64::MAX;
    let probe = DiskUsageProbe::new(dir.path(), 80.0, 90.0);
    let engine = MaintenanceEngine::new(config, index, files, cache, probe).unwrap();
    let report = engine.force_optimize().await.unwrap();
    assert!(report.actions.iter().any(|a| a.contains("skipped")));
}

#[tokio::test]
async fn report_history_is_bounded() {
    let dir = tempdir().unwrap();
    let (files, cache, probe) = collaborators(dir.path());
    let index = Arc::new(MemoryIndexStore::new());

    let mut config = engine_config();
    config.report_history_limit = 3;
    let engine = MaintenanceEngine::new(config, index, files, cache, probe).unwrap();
    for _ in 0..5 {
        engine.force_optimize().await.unwrap();
    }
    assert_eq!(engine.recent_reports(None).len(), 3);
    assert_eq!(engine.recent_reports(Some(2)).len(), 2);
}

#[tokio::test]
async fn critical_disk_triggers_an_emergency_sweep() {
    use crate::modules::disk::{DiskLevel, DiskSnapshot};
    use crate::modules::maintenance::report::{MaintenanceKind, MaintenanceLevel};

    let dir = tempdir().unwrap();
    let (files, cache, probe) = collaborators(dir.path());
    let index = Arc::new(MemoryIndexStore::new());
    // 10 days old: inside the regular 30-day window, outside the 7-day
    // emergency window.
    let then = utc_now!() - 10 * DAY_MS;
    index
        .create_task(TaskRecord {
            id: 1,
            name: "task-1".into(),
            status: TaskStatus::Completed,
            created_at: then,
            completed_at: Some(then),
        })
        .await
        .unwrap();
    let folder = files
        .create_task_folder(TaskDescriptor {
            task_id: 1,
            name: "task-1".into(),
            created_at: then,
        })
        .await
        .unwrap();
    std::fs::write(folder.join("audio.wav"), vec![0u8; 512]).unwrap();

    let engine = MaintenanceEngine::new(engine_config(), index.clone(), files, cache, probe).unwrap();
    let snapshot = DiskSnapshot {
        total_bytes: 1000,
        used_bytes: 950,
        free_bytes: 50,
        used_percent: 95.0,
        level: DiskLevel::Critical,
        checked_at: utc_now!(),
    };
    let report = engine.apply_disk_snapshot(snapshot).await;

    assert_eq!(report.kind, MaintenanceKind::DiskCheck);
    assert_eq!(report.level, MaintenanceLevel::Critical);
    assert!(report.files_cleaned >= 1);
    assert!(!folder.exists());
    assert!(index.get_task(1).await.unwrap().is_none());

    // Both the disk check and the emergency cleanup landed in history, and
    // the critical report survives there.
    let reports = engine.recent_reports(None);
    assert_eq!(reports.len(), 2);
    assert!(reports
        .iter()
        .any(|r| r.level == MaintenanceLevel::Critical));
    assert!(engine
        .maintenance_status()
        .last_disk_snapshot
        .is_some());
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let dir = tempdir().unwrap();
    let (files, cache, probe) = collaborators(dir.path());
    let index = Arc::new(MemoryIndexStore::new());

    let engine = MaintenanceEngine::new(engine_config(), index, files, cache, probe).unwrap();
    assert!(!engine.is_running());
    engine.start().unwrap();
    assert!(engine.is_running());
    // A second start is a warned no-op, not a second set of loops.
    engine.start().unwrap();
    assert!(engine.is_running());
    engine.stop().await;
    assert!(!engine.is_running());
    // A second stop on an already stopped engine is a no-op.
    engine.stop().await;
}

#[test]
fn config_validation_rejects_inverted_thresholds() {
    let mut config = engine_config();
    config.disk_warning_percent = 95.0;
    assert_eq!(
        config.validate().unwrap_err().code(),
        ErrorCode::InvalidParameter
    );
}

#[test]
fn config_validation_rejects_zero_retention() {
    let mut config = engine_config();
    config.retention.task_retention_days = 0;
    assert_eq!(
        config.validate().unwrap_err().code(),
        ErrorCode::InvalidParameter
    );
}
