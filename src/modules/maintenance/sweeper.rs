// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::index::{TaskIndexStore, TaskStatus};
use crate::modules::maintenance::report::ReportBuilder;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::storage::TaskFileStore;
use crate::{after_n_days_timestamp, utc_now};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Scratch files older than this are fair game on every sweep.
const TEMP_FILE_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

#[derive(Clone, Debug)]
pub struct RetentionPolicy {
    pub task_retention_days: u16,
    pub failed_task_retention_days: u16,
}

impl RetentionPolicy {
    pub fn from_settings() -> Self {
        Self {
            task_retention_days: SETTINGS.rustscribe_task_retention_days,
            failed_task_retention_days: SETTINGS.rustscribe_failed_task_retention_days,
        }
    }

    /// A tightened policy for emergency cleanup, expiring everything older
    /// than `days` regardless of outcome.
    pub fn emergency(days: u16) -> Self {
        Self {
            task_retention_days: days,
            failed_task_retention_days: days,
        }
    }
}

/// Removes expired task data, index row and folder together. A task's age
/// is measured from its completion timestamp; tasks still processing are
/// never touched, no matter how old. The folder goes first and the index
/// row only follows a successful folder removal, so a failed delete leaves
/// the task fully intact rather than half-forgotten.
pub struct RetentionSweeper<I, F> {
    index: Arc<I>,
    files: Arc<F>,
}

impl<I, F> RetentionSweeper<I, F>
where
    I: TaskIndexStore + Sync + Send + 'static,
    F: TaskFileStore + Sync + Send + 'static,
{
    pub fn new(index: Arc<I>, files: Arc<F>) -> Self {
        Self { index, files }
    }

    pub async fn sweep(&self, policy: &RetentionPolicy, report: &mut ReportBuilder) {
        self.sweep_status(
            TaskStatus::Completed,
            policy.task_retention_days,
            report,
        )
        .await;
        self.sweep_status(
            TaskStatus::Failed,
            policy.failed_task_retention_days,
            report,
        )
        .await;
        self.sweep_orphans(policy.task_retention_days, report).await;

        match self.files.cleanup_empty_folders().await {
            Ok(removed) if removed > 0 => {
                report.action(format!("removed {removed} empty task folders"));
            }
            Ok(_) => {}
            Err(e) => report.error(format!("empty folder cleanup failed: {e}")),
        }

        match self.files.cleanup_temp_files(TEMP_FILE_MAX_AGE).await {
            Ok((removed, reclaimed)) if removed > 0 => {
                report.cleaned(removed, reclaimed);
                report.action(format!("removed {removed} stale temp entries"));
            }
            Ok(_) => {}
            Err(e) => report.error(format!("temp cleanup failed: {e}")),
        }
    }

    async fn sweep_status(&self, status: TaskStatus, retention_days: u16, report: &mut ReportBuilder) {
        let tasks = match self.index.list_tasks_by_status(status).await {
            Ok(tasks) => tasks,
            Err(e) => {
                report.error(format!("listing {status} tasks failed: {e}"));
                return;
            }
        };
        let now = utc_now!();
        let mut removed = 0usize;
        for task in tasks {
            if after_n_days_timestamp!(task.retention_anchor(), retention_days) > now {
                continue;
            }
            debug!(
                "Task '{}' ({}) is past its {}-day retention",
                task.id, status, retention_days
            );
            match self.remove_task_data(task.id, report).await {
                Ok(()) => removed += 1,
                Err(message) => report.error(message),
            }
        }
        if removed > 0 {
            info!("Retention removed {} expired {} tasks", removed, status);
            report.action(format!("removed {removed} expired {status} tasks"));
        }
    }

    /// Deletes folder and row for one task; on any step failing the task is
    /// left as-is and the failure is reported per-item.
    async fn remove_task_data(&self, task_id: u64, report: &mut ReportBuilder) -> Result<(), String> {
        let folder = self
            .files
            .resolve_task_folder(task_id)
            .await
            .map_err(|e| format!("resolving folder of task '{task_id}' failed: {e}"))?;

        if let Some(path) = folder {
            let size = self
                .files
                .folder_size(&path)
                .await
                .map_err(|e| format!("sizing folder of task '{task_id}' failed: {e}"))?;
            self.files
                .delete_folder(&path)
                .await
                .map_err(|e| format!("deleting folder of task '{task_id}' failed: {e}"))?;
            report.cleaned(1, size);
        }

        self.index
            .delete_task(task_id)
            .await
            .map_err(|e| format!("deleting index row of task '{task_id}' failed: {e}"))?;
        Ok(())
    }

    /// Folders with no matching index row can only be dated by their
    /// modification time; they fall under the general retention window.
    async fn sweep_orphans(&self, retention_days: u16, report: &mut ReportBuilder) {
        let folders = match self.files.list_task_folders().await {
            Ok(folders) => folders,
            Err(e) => {
                report.error(format!("listing task folders failed: {e}"));
                return;
            }
        };
        let max_age = Duration::from_secs(u64::from(retention_days) * 24 * 3600);
        let mut removed = 0usize;
        for folder in folders {
            let known = match folder.task_id {
                Some(id) => match self.index.get_task(id).await {
                    Ok(task) => task.is_some(),
                    Err(e) => {
                        report.error(format!("index lookup for orphan check failed: {e}"));
                        continue;
                    }
                },
                None => false,
            };
            if known {
                continue;
            }
            let age = folder
                .modified_at
                .elapsed()
                .unwrap_or(Duration::ZERO);
            if age <= max_age {
                continue;
            }
            match self.files.delete_folder(&folder.path).await {
                Ok(()) => {
                    report.cleaned(1, folder.size);
                    removed += 1;
                }
                Err(e) => report.error(format!(
                    "deleting orphan folder {} failed: {e}",
                    folder.path.display()
                )),
            }
        }
        if removed > 0 {
            info!("Retention removed {} orphan folders", removed);
            report.action(format!("removed {removed} orphan folders"));
        }
    }
}
