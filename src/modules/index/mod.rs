// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::RustScribeResult;
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

pub mod memory;

/// Lifecycle states of a conversion task as recorded in the index.
#[derive(Copy, Clone, Debug, Eq, Default, PartialEq, Serialize, Deserialize, Hash, Enum)]
pub enum TaskStatus {
    /// Task has been accepted but conversion has not started yet.
    #[default]
    Pending,

    /// Conversion is in progress. Tasks in this state are never eligible
    /// for retention cleanup, regardless of age.
    Processing,

    /// Conversion finished and all artifacts were written.
    Completed,

    /// Conversion failed terminally.
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status_str = match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Processing => "Processing",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
        };
        write!(f, "{}", status_str)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct TaskRecord {
    pub id: u64,
    pub name: String,
    pub status: TaskStatus,
    pub created_at: i64,
    /// Set once when the task reaches `Completed` or `Failed`; immutable
    /// afterwards. Retention decisions key off this timestamp.
    pub completed_at: Option<i64>,
}

impl TaskRecord {
    /// The timestamp the retention sweeper measures age against.
    pub fn retention_anchor(&self) -> i64 {
        self.completed_at.unwrap_or(self.created_at)
    }
}

/// The relational task index, consumed as an external collaborator. The
/// maintenance engine only issues CRUD statements and storage-maintenance
/// primitives against it; the storage engine behind it is not this crate's
/// concern.
pub trait TaskIndexStore {
    fn create_task(&self, record: TaskRecord) -> impl Future<Output = RustScribeResult<()>> + Send;

    fn get_task(&self, id: u64)
        -> impl Future<Output = RustScribeResult<Option<TaskRecord>>> + Send;

    fn list_tasks_by_status(
        &self,
        status: TaskStatus,
    ) -> impl Future<Output = RustScribeResult<Vec<TaskRecord>>> + Send;

    /// Returns true when a row was actually removed.
    fn delete_task(&self, id: u64) -> impl Future<Output = RustScribeResult<bool>> + Send;

    fn task_count(&self) -> impl Future<Output = RustScribeResult<usize>> + Send;

    /// Bytes the index occupies on storage; drives the compaction decision.
    fn storage_size(&self) -> impl Future<Output = RustScribeResult<u64>> + Send;

    fn compact(&self) -> impl Future<Output = RustScribeResult<()>> + Send;

    fn reindex(&self) -> impl Future<Output = RustScribeResult<()>> + Send;

    fn integrity_check(&self) -> impl Future<Output = RustScribeResult<bool>> + Send;
}
