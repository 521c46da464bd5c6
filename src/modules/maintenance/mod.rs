// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::cache::TieredCache;
use crate::modules::common::periodic::{PeriodicTask, TaskHandle};
use crate::modules::disk::{DiskLevel, DiskSnapshot, DiskUsageProbe};
use crate::modules::error::{code::ErrorCode, RustScribeResult};
use crate::modules::index::TaskIndexStore;
use crate::modules::maintenance::report::{MaintenanceKind, MaintenanceLevel, MaintenanceReport, ReportBuilder};
use crate::modules::maintenance::sweeper::{RetentionPolicy, RetentionSweeper};
use crate::modules::settings::cli::SETTINGS;
use crate::modules::storage::TaskFileStore;
use crate::{raise_error, utc_now};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

pub mod report;
pub mod sweeper;
#[cfg(test)]
mod tests;

/// The cleanup and optimize loops tick on short check intervals and only
/// act once their configured run interval has elapsed, so a restart never
/// postpones overdue work by a full period.
const CLEANUP_CHECK_INTERVAL: Duration = Duration::from_secs(3600);
const OPTIMIZE_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 3600);

#[derive(Clone, Debug)]
pub struct MaintenanceConfig {
    pub cleanup_enabled: bool,
    pub cleanup_interval: Duration,
    pub cleanup_check_interval: Duration,
    pub retention: RetentionPolicy,
    pub disk_monitor_enabled: bool,
    pub disk_interval: Duration,
    pub disk_warning_percent: f64,
    pub disk_critical_percent: f64,
    pub auto_cleanup_on_critical: bool,
    pub critical_retention_days: u16,
    pub optimize_enabled: bool,
    pub optimize_interval: Duration,
    pub optimize_check_interval: Duration,
    pub compact_threshold_bytes: u64,
    pub report_history_limit: usize,
}

impl MaintenanceConfig {
    pub fn from_settings() -> Self {
        Self {
            cleanup_enabled: SETTINGS.rustscribe_cleanup_enabled,
            cleanup_interval: Duration::from_secs(
                SETTINGS.rustscribe_cleanup_interval_hours * 3600,
            ),
            cleanup_check_interval: CLEANUP_CHECK_INTERVAL,
            retention: RetentionPolicy::from_settings(),
            disk_monitor_enabled: SETTINGS.rustscribe_disk_monitor_enabled,
            disk_interval: Duration::from_secs(
                SETTINGS.rustscribe_disk_monitor_interval_minutes * 60,
            ),
            disk_warning_percent: SETTINGS.rustscribe_disk_warning_percent,
            disk_critical_percent: SETTINGS.rustscribe_disk_critical_percent,
            auto_cleanup_on_critical: SETTINGS.rustscribe_auto_cleanup_on_critical,
            critical_retention_days: SETTINGS.rustscribe_critical_retention_days,
            optimize_enabled: SETTINGS.rustscribe_index_optimize_enabled,
            optimize_interval: Duration::from_secs(
                SETTINGS.rustscribe_index_optimize_interval_hours * 3600,
            ),
            optimize_check_interval: OPTIMIZE_CHECK_INTERVAL,
            compact_threshold_bytes: SETTINGS.rustscribe_compact_threshold_mb * 1024 * 1024,
            report_history_limit: SETTINGS.rustscribe_report_history_limit,
        }
    }

    pub fn validate(&self) -> RustScribeResult<()> {
        if !(0.0..=100.0).contains(&self.disk_warning_percent)
            || !(0.0..=100.0).contains(&self.disk_critical_percent)
        {
            return Err(raise_error!(
                "disk thresholds must be percentages between 0 and 100".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if self.disk_warning_percent >= self.disk_critical_percent {
            return Err(raise_error!(
                format!(
                    "disk warning threshold ({}) must be below the critical threshold ({})",
                    self.disk_warning_percent, self.disk_critical_percent
                ),
                ErrorCode::InvalidParameter
            ));
        }
        if self.cleanup_interval.is_zero()
            || self.disk_interval.is_zero()
            || self.optimize_interval.is_zero()
        {
            return Err(raise_error!(
                "maintenance intervals must be non-zero".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if self.retention.task_retention_days == 0 || self.retention.failed_task_retention_days == 0
        {
            return Err(raise_error!(
                "retention windows must be at least one day".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if self.report_history_limit == 0 {
            return Err(raise_error!(
                "report history limit must be at least 1".into(),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[repr(u8)]
pub enum EngineState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Starting,
            2 => EngineState::Running,
            3 => EngineState::Stopping,
            _ => EngineState::Stopped,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Object)]
pub struct MaintenanceStatus {
    pub state: EngineState,
    pub last_cleanup_at: Option<i64>,
    pub last_optimize_at: Option<i64>,
    pub last_disk_snapshot: Option<DiskSnapshot>,
    pub report_count: usize,
}

/// Owns the three background loops (retention cleanup, disk monitoring,
/// index optimization) plus their on-demand counterparts. Forced runs and
/// scheduled runs of the same kind are single-flight: whoever comes second
/// gets [`ErrorCode::MaintenanceBusy`].
pub struct MaintenanceEngine<I, F> {
    config: MaintenanceConfig,
    index: Arc<I>,
    files: Arc<F>,
    cache: Arc<TieredCache>,
    probe: DiskUsageProbe,
    state: AtomicU8,
    handles: Mutex<Vec<TaskHandle>>,
    cleanup_gate: tokio::sync::Mutex<()>,
    optimize_gate: tokio::sync::Mutex<()>,
    // 0 means "never"; loops are primed with the start timestamp.
    last_cleanup: AtomicI64,
    last_optimize: AtomicI64,
    last_disk: Mutex<Option<DiskSnapshot>>,
    reports: Mutex<VecDeque<MaintenanceReport>>,
}

impl<I, F> MaintenanceEngine<I, F>
where
    I: TaskIndexStore + Sync + Send + 'static,
    F: TaskFileStore + Sync + Send + 'static,
{
    pub fn new(
        config: MaintenanceConfig,
        index: Arc<I>,
        files: Arc<F>,
        cache: Arc<TieredCache>,
        probe: DiskUsageProbe,
    ) -> RustScribeResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            index,
            files,
            cache,
            probe,
            state: AtomicU8::new(EngineState::Stopped as u8),
            handles: Mutex::new(Vec::new()),
            cleanup_gate: tokio::sync::Mutex::new(()),
            optimize_gate: tokio::sync::Mutex::new(()),
            last_cleanup: AtomicI64::new(0),
            last_optimize: AtomicI64::new(0),
            last_disk: Mutex::new(None),
            reports: Mutex::new(VecDeque::new()),
        }))
    }

    /// Spawns the configured loops. Calling `start` on a running engine is
    /// a warned no-op.
    pub fn start(self: &Arc<Self>) -> RustScribeResult<()> {
        if self
            .state
            .compare_exchange(
                EngineState::Stopped as u8,
                EngineState::Starting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            warn!("Maintenance engine start requested while already running");
            return Ok(());
        }

        let now = utc_now!();
        self.last_cleanup.store(now, Ordering::SeqCst);
        self.last_optimize.store(now, Ordering::SeqCst);

        let mut handles = Vec::new();
        if self.config.cleanup_enabled {
            let engine = self.clone();
            handles.push(PeriodicTask::new("retention-cleanup").start(
                move || {
                    let engine = engine.clone();
                    async move { engine.cleanup_if_due().await }
                },
                self.config.cleanup_check_interval,
                true,
                false,
            ));
        }
        if self.config.disk_monitor_enabled {
            let engine = self.clone();
            handles.push(PeriodicTask::new("disk-monitor").start(
                move || {
                    let engine = engine.clone();
                    async move {
                        engine.run_disk_check().await?;
                        Ok(())
                    }
                },
                self.config.disk_interval,
                true,
                true,
            ));
        }
        if self.config.optimize_enabled {
            let engine = self.clone();
            handles.push(PeriodicTask::new("index-optimizer").start(
                move || {
                    let engine = engine.clone();
                    async move { engine.optimize_if_due().await }
                },
                self.config.optimize_check_interval,
                true,
                false,
            ));
        }
        *self.handles.lock().unwrap() = handles;

        self.state
            .store(EngineState::Running as u8, Ordering::SeqCst);
        info!("Maintenance engine started");
        Ok(())
    }

    pub async fn stop(&self) {
        if self
            .state
            .compare_exchange(
                EngineState::Running as u8,
                EngineState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }
        let handles: Vec<TaskHandle> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            handle.cancel().await;
        }
        self.state
            .store(EngineState::Stopped as u8, Ordering::SeqCst);
        info!("Maintenance engine stopped");
    }

    pub fn is_running(&self) -> bool {
        EngineState::from_u8(self.state.load(Ordering::SeqCst)) == EngineState::Running
    }

    async fn cleanup_if_due(&self) -> RustScribeResult<()> {
        let due_at = self.last_cleanup.load(Ordering::SeqCst)
            + self.config.cleanup_interval.as_millis() as i64;
        if utc_now!() < due_at {
            return Ok(());
        }
        match self.run_cleanup(self.config.retention.clone()).await {
            Ok(report) => {
                info!(
                    "Scheduled cleanup finished: {} files, {} bytes freed",
                    report.files_cleaned, report.space_freed
                );
                Ok(())
            }
            // Someone is already cleaning; the work is being done either way.
            Err(e) if e.code() == ErrorCode::MaintenanceBusy => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn run_cleanup(&self, policy: RetentionPolicy) -> RustScribeResult<MaintenanceReport> {
        let _guard = self.cleanup_gate.try_lock().map_err(|_| {
            raise_error!(
                "a cleanup run is already in progress".into(),
                ErrorCode::MaintenanceBusy
            )
        })?;

        let mut builder = ReportBuilder::new(MaintenanceKind::Cleanup);
        let sweeper = RetentionSweeper::new(self.index.clone(), self.files.clone());
        sweeper.sweep(&policy, &mut builder).await;

        match self.cache.evict_expired().await {
            Ok((removed, reclaimed)) if removed > 0 => {
                builder.cleaned(removed, reclaimed);
                builder.action(format!("evicted {removed} expired cache files"));
            }
            Ok(_) => {}
            Err(e) => builder.error(format!("cache eviction failed: {e}")),
        }
        match self.cache.evict_to_size_budget().await {
            Ok((removed, reclaimed)) if removed > 0 => {
                builder.cleaned(removed, reclaimed);
                builder.action(format!("cache size eviction removed {removed} files"));
            }
            Ok(_) => {}
            Err(e) => builder.error(format!("cache size eviction failed: {e}")),
        }

        let report = builder.finish();
        self.last_cleanup.store(utc_now!(), Ordering::SeqCst);
        self.record_report(report.clone());
        Ok(report)
    }

    pub async fn run_disk_check(&self) -> RustScribeResult<MaintenanceReport> {
        let snapshot = self.probe.snapshot()?;
        Ok(self.apply_disk_snapshot(snapshot).await)
    }

    async fn apply_disk_snapshot(&self, snapshot: DiskSnapshot) -> MaintenanceReport {
        let mut builder = ReportBuilder::new(MaintenanceKind::DiskCheck);
        builder.action(format!(
            "disk usage {:.1}% ({} of {} bytes)",
            snapshot.used_percent, snapshot.used_bytes, snapshot.total_bytes
        ));

        match snapshot.level {
            DiskLevel::Normal => {}
            DiskLevel::High => {
                warn!(
                    "Disk usage at {:.1}% exceeds the {:.1}% warning threshold",
                    snapshot.used_percent, self.config.disk_warning_percent
                );
                builder.escalate(MaintenanceLevel::High);
                self.note_data_dir_usage(&mut builder).await;
            }
            DiskLevel::Critical => {
                error!(
                    "Disk usage at {:.1}% exceeds the {:.1}% critical threshold",
                    snapshot.used_percent, self.config.disk_critical_percent
                );
                builder.escalate(MaintenanceLevel::Critical);
                self.note_data_dir_usage(&mut builder).await;
                if self.config.auto_cleanup_on_critical {
                    let policy = RetentionPolicy::emergency(self.config.critical_retention_days);
                    match self.run_cleanup(policy).await {
                        Ok(report) => {
                            builder.cleaned(report.files_cleaned, report.space_freed);
                            builder.action(format!(
                                "emergency cleanup freed {} bytes under a {}-day window",
                                report.space_freed, self.config.critical_retention_days
                            ));
                        }
                        Err(e) => builder.error(format!("emergency cleanup failed: {e}")),
                    }
                }
            }
        }

        *self.last_disk.lock().unwrap() = Some(snapshot);
        let report = builder.finish();
        self.record_report(report.clone());
        report
    }

    /// The directory walk is priced in only once usage is already past a
    /// threshold; routine checks stay a cheap mount-statistics read.
    async fn note_data_dir_usage(&self, builder: &mut ReportBuilder) {
        match self.probe.data_dir_usage().await {
            Ok(bytes) => builder.action(format!("data directory holds {bytes} bytes")),
            Err(e) => builder.error(format!("data directory size probe failed: {e}")),
        }
    }

    async fn optimize_if_due(&self) -> RustScribeResult<()> {
        let due_at = self.last_optimize.load(Ordering::SeqCst)
            + self.config.optimize_interval.as_millis() as i64;
        if utc_now!() < due_at {
            return Ok(());
        }
        match self.run_optimize().await {
            Ok(_) => Ok(()),
            Err(e) if e.code() == ErrorCode::MaintenanceBusy => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn run_optimize(&self) -> RustScribeResult<MaintenanceReport> {
        let _guard = self.optimize_gate.try_lock().map_err(|_| {
            raise_error!(
                "an optimize run is already in progress".into(),
                ErrorCode::MaintenanceBusy
            )
        })?;

        let mut builder = ReportBuilder::new(MaintenanceKind::Optimize);

        match self.index.storage_size().await {
            Ok(size) if size >= self.config.compact_threshold_bytes => {
                match self.index.compact().await {
                    Ok(()) => builder.action(format!("compacted index ({size} bytes before)")),
                    Err(e) => builder.error(format!("index compaction failed: {e}")),
                }
            }
            Ok(size) => {
                builder.action(format!(
                    "index size {size} bytes below compaction threshold, skipped"
                ));
            }
            Err(e) => builder.error(format!("index size probe failed: {e}")),
        }

        match self.index.reindex().await {
            Ok(()) => builder.action("rebuilt index structures".to_string()),
            Err(e) => builder.error(format!("reindex failed: {e}")),
        }

        match self.index.integrity_check().await {
            Ok(true) => builder.action("integrity check passed".to_string()),
            Ok(false) => {
                builder.error("integrity check found inconsistencies".to_string());
                builder.escalate(MaintenanceLevel::High);
            }
            Err(e) => builder.error(format!("integrity check failed to run: {e}")),
        }

        let report = builder.finish();
        self.last_optimize.store(utc_now!(), Ordering::SeqCst);
        self.record_report(report.clone());
        Ok(report)
    }

    /// On-demand cleanup. `retention_override` shrinks both retention
    /// windows to the given number of days for this run only.
    pub async fn force_cleanup(
        &self,
        retention_override: Option<u16>,
    ) -> RustScribeResult<MaintenanceReport> {
        let policy = match retention_override {
            Some(days) => RetentionPolicy::emergency(days),
            None => self.config.retention.clone(),
        };
        self.run_cleanup(policy).await
    }

    /// On-demand index optimization, regardless of the schedule.
    pub async fn force_optimize(&self) -> RustScribeResult<MaintenanceReport> {
        self.run_optimize().await
    }

    /// Probes the disk without going through the monitoring loop. The
    /// result still lands in the status view.
    pub fn check_disk_space(&self) -> RustScribeResult<DiskSnapshot> {
        let snapshot = self.probe.snapshot()?;
        *self.last_disk.lock().unwrap() = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub fn maintenance_status(&self) -> MaintenanceStatus {
        let timestamp = |value: i64| if value == 0 { None } else { Some(value) };
        MaintenanceStatus {
            state: EngineState::from_u8(self.state.load(Ordering::SeqCst)),
            last_cleanup_at: timestamp(self.last_cleanup.load(Ordering::SeqCst)),
            last_optimize_at: timestamp(self.last_optimize.load(Ordering::SeqCst)),
            last_disk_snapshot: self.last_disk.lock().unwrap().clone(),
            report_count: self.reports.lock().unwrap().len(),
        }
    }

    /// Most recent reports, oldest first, optionally capped to the last
    /// `limit` entries.
    pub fn recent_reports(&self, limit: Option<usize>) -> Vec<MaintenanceReport> {
        let reports = self.reports.lock().unwrap();
        let skip = match limit {
            Some(limit) => reports.len().saturating_sub(limit),
            None => 0,
        };
        reports.iter().skip(skip).cloned().collect()
    }

    fn record_report(&self, report: MaintenanceReport) {
        let mut reports = self.reports.lock().unwrap();
        reports.push_back(report);
        while reports.len() > self.config.report_history_limit {
            reports.pop_front();
        }
    }
}
