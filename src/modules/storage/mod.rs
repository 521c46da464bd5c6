// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::{code::ErrorCode, RustScribeError, RustScribeResult};
use crate::raise_error;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

pub mod fs;

/// Sidecar file written into every task folder so the folder can be tied
/// back to its index row without parsing the folder name.
pub const TASK_INFO_FILE: &str = ".task_info";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_id: u64,
    pub name: String,
    pub created_at: i64,
}

/// A task folder as seen on disk. `task_id` is `None` when the sidecar is
/// missing or unparseable, in which case the folder is an orphan and only
/// its modification time can date it.
#[derive(Clone, Debug)]
pub struct TaskFolder {
    pub path: PathBuf,
    pub task_id: Option<u64>,
    pub modified_at: SystemTime,
    pub size: u64,
}

/// Filesystem side of task artifacts. The sweeper drives deletions through
/// this trait so it never touches paths directly.
pub trait TaskFileStore {
    fn create_task_folder(
        &self,
        descriptor: TaskDescriptor,
    ) -> impl Future<Output = RustScribeResult<PathBuf>> + Send;

    fn resolve_task_folder(
        &self,
        task_id: u64,
    ) -> impl Future<Output = RustScribeResult<Option<PathBuf>>> + Send;

    fn list_task_folders(&self) -> impl Future<Output = RustScribeResult<Vec<TaskFolder>>> + Send;

    fn folder_size(&self, path: &Path) -> impl Future<Output = RustScribeResult<u64>> + Send;

    fn delete_folder(&self, path: &Path) -> impl Future<Output = RustScribeResult<()>> + Send;

    /// Removes task folders that contain nothing but their sidecar (or
    /// nothing at all). Returns how many were removed.
    fn cleanup_empty_folders(&self) -> impl Future<Output = RustScribeResult<usize>> + Send;

    /// Removes scratch files older than `max_age`. Returns the number of
    /// files removed and the bytes reclaimed.
    fn cleanup_temp_files(
        &self,
        max_age: Duration,
    ) -> impl Future<Output = RustScribeResult<(usize, u64)>> + Send;
}

pub(crate) fn file_store_error(context: &str, err: std::io::Error) -> RustScribeError {
    raise_error!(format!("{context}: {err}"), ErrorCode::FileStoreError)
}

/// Total size of all regular files under `root`, walked iteratively.
/// Entries that cannot be read are skipped and logged rather than failing
/// the whole measurement.
pub(crate) async fn directory_size(root: &Path) -> RustScribeResult<u64> {
    let mut total: u64 = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                continue;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    break;
                }
            };
            match entry.metadata().await {
                Ok(meta) if meta.is_dir() => pending.push(entry.path()),
                Ok(meta) if meta.is_file() => total += meta.len(),
                Ok(_) => {}
                Err(e) => {
                    debug!("Skipping entry {}: {}", entry.path().display(), e);
                }
            }
        }
    }
    Ok(total)
}
