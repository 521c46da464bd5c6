// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::current_datetime;
use crate::modules::settings::dir::DATA_DIR_MANAGER;
use crate::modules::storage::{
    directory_size, file_store_error, TaskDescriptor, TaskFileStore, TaskFolder, TASK_INFO_FILE,
};
use crate::modules::error::RustScribeResult;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Task artifacts on the local filesystem. Each task gets one folder named
/// `<yyyymmddHHMM>_<task_id>` under the tasks directory, carrying a
/// [`TASK_INFO_FILE`] sidecar; scratch space lives in a flat temp directory.
pub struct FsTaskFileStore {
    tasks_dir: PathBuf,
    temp_dir: PathBuf,
}

impl FsTaskFileStore {
    pub fn new() -> Self {
        Self {
            tasks_dir: DATA_DIR_MANAGER.tasks_dir.clone(),
            temp_dir: DATA_DIR_MANAGER.temp_dir.clone(),
        }
    }

    pub fn with_dirs(tasks_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            tasks_dir: tasks_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    async fn read_descriptor(path: &Path) -> Option<TaskDescriptor> {
        let sidecar = path.join(TASK_INFO_FILE);
        let raw = match tokio::fs::read(&sidecar).await {
            Ok(raw) => raw,
            Err(_) => return None,
        };
        match serde_json::from_slice::<TaskDescriptor>(&raw) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!("Unparseable sidecar in {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl Default for FsTaskFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskFileStore for FsTaskFileStore {
    async fn create_task_folder(&self, descriptor: TaskDescriptor) -> RustScribeResult<PathBuf> {
        let folder = self
            .tasks_dir
            .join(format!("{}_{}", current_datetime!(), descriptor.task_id));
        tokio::fs::create_dir_all(&folder)
            .await
            .map_err(|e| file_store_error("failed to create task folder", e))?;
        let payload = serde_json::to_vec_pretty(&descriptor).map_err(|e| {
            file_store_error(
                "failed to encode task descriptor",
                std::io::Error::other(e),
            )
        })?;
        tokio::fs::write(folder.join(TASK_INFO_FILE), payload)
            .await
            .map_err(|e| file_store_error("failed to write task descriptor", e))?;
        Ok(folder)
    }

    async fn resolve_task_folder(&self, task_id: u64) -> RustScribeResult<Option<PathBuf>> {
        for folder in self.list_task_folders().await? {
            if folder.task_id == Some(task_id) {
                return Ok(Some(folder.path));
            }
        }
        Ok(None)
    }

    async fn list_task_folders(&self) -> RustScribeResult<Vec<TaskFolder>> {
        let mut folders = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.tasks_dir)
            .await
            .map_err(|e| file_store_error("failed to read tasks directory", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| file_store_error("failed to read tasks directory entry", e))?
        {
            let path = entry.path();
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Skipping unreadable folder {}: {}", path.display(), e);
                    continue;
                }
            };
            if !meta.is_dir() {
                continue;
            }
            let modified_at = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let task_id = Self::read_descriptor(&path).await.map(|d| d.task_id);
            let size = directory_size(&path).await?;
            folders.push(TaskFolder {
                path,
                task_id,
                modified_at,
                size,
            });
        }
        Ok(folders)
    }

    async fn folder_size(&self, path: &Path) -> RustScribeResult<u64> {
        directory_size(path).await
    }

    async fn delete_folder(&self, path: &Path) -> RustScribeResult<()> {
        // Refuse anything outside the tasks root; the sweeper hands us paths
        // it previously listed, but a bad path here is unrecoverable.
        if !path.starts_with(&self.tasks_dir) {
            return Err(file_store_error(
                "refusing to delete folder outside the tasks directory",
                std::io::Error::other(path.display().to_string()),
            ));
        }
        tokio::fs::remove_dir_all(path)
            .await
            .map_err(|e| file_store_error("failed to delete task folder", e))?;
        debug!("Deleted task folder {}", path.display());
        Ok(())
    }

    async fn cleanup_empty_folders(&self) -> RustScribeResult<usize> {
        let mut removed = 0usize;
        for folder in self.list_task_folders().await? {
            let mut entries = match tokio::fs::read_dir(&folder.path).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Skipping folder {}: {}", folder.path.display(), e);
                    continue;
                }
            };
            let mut has_content = false;
            while let Ok(Some(entry)) = entries.next_entry().await {
                if entry.file_name() != TASK_INFO_FILE {
                    has_content = true;
                    break;
                }
            }
            if !has_content {
                if let Err(e) = tokio::fs::remove_dir_all(&folder.path).await {
                    warn!("Failed to remove empty folder {}: {}", folder.path.display(), e);
                    continue;
                }
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} empty task folders", removed);
        }
        Ok(removed)
    }

    async fn cleanup_temp_files(&self, max_age: Duration) -> RustScribeResult<(usize, u64)> {
        let cutoff = SystemTime::now() - max_age;
        let mut removed = 0usize;
        let mut reclaimed = 0u64;
        let mut entries = tokio::fs::read_dir(&self.temp_dir)
            .await
            .map_err(|e| file_store_error("failed to read temp directory", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| file_store_error("failed to read temp directory entry", e))?
        {
            let path = entry.path();
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Skipping temp entry {}: {}", path.display(), e);
                    continue;
                }
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if modified >= cutoff {
                continue;
            }
            let result = if meta.is_dir() {
                let size = directory_size(&path).await?;
                tokio::fs::remove_dir_all(&path).await.map(|_| size)
            } else {
                tokio::fs::remove_file(&path).await.map(|_| meta.len())
            };
            match result {
                Ok(size) => {
                    removed += 1;
                    reclaimed += size;
                }
                Err(e) => warn!("Failed to remove temp entry {}: {}", path.display(), e),
            }
        }
        Ok((removed, reclaimed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utc_now;
    use std::time::Duration;
    use tempfile::tempdir;

    fn store(root: &Path) -> FsTaskFileStore {
        let tasks = root.join("tasks");
        let temp = root.join("temp");
        std::fs::create_dir_all(&tasks).unwrap();
        std::fs::create_dir_all(&temp).unwrap();
        FsTaskFileStore::with_dirs(tasks, temp)
    }

    fn descriptor(task_id: u64) -> TaskDescriptor {
        TaskDescriptor {
            task_id,
            name: format!("task-{task_id}"),
            created_at: utc_now!(),
        }
    }

    #[tokio::test]
    async fn created_folder_resolves_through_its_sidecar() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let folder = store.create_task_folder(descriptor(42)).await.unwrap();
        assert!(folder.join(TASK_INFO_FILE).is_file());
        let resolved = store.resolve_task_folder(42).await.unwrap();
        assert_eq!(resolved, Some(folder));
        assert!(store.resolve_task_folder(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn folder_without_sidecar_is_listed_as_orphan() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let orphan = dir.path().join("tasks").join("202401010000_12345");
        std::fs::create_dir_all(&orphan).unwrap();
        std::fs::write(orphan.join("audio.wav"), vec![0u8; 64]).unwrap();
        let folders = store.list_task_folders().await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].task_id, None);
        assert_eq!(folders[0].size, 64);
    }

    #[tokio::test]
    async fn empty_folder_cleanup_spares_folders_with_artifacts() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let empty = store.create_task_folder(descriptor(1)).await.unwrap();
        let full = store.create_task_folder(descriptor(2)).await.unwrap();
        std::fs::write(full.join("transcript.txt"), b"hello").unwrap();

        let removed = store.cleanup_empty_folders().await.unwrap();
        assert_eq!(removed, 1);
        assert!(!empty.exists());
        assert!(full.exists());
    }

    #[tokio::test]
    async fn temp_cleanup_only_touches_stale_entries() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let fresh = dir.path().join("temp").join("fresh.part");
        std::fs::write(&fresh, vec![0u8; 128]).unwrap();

        // Nothing is older than an hour yet.
        let (removed, reclaimed) = store
            .cleanup_temp_files(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(reclaimed, 0);
        assert!(fresh.exists());

        // With a zero cutoff everything qualifies.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (removed, reclaimed) = store.cleanup_temp_files(Duration::ZERO).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(reclaimed, 128);
        assert!(!fresh.exists());
    }

    #[tokio::test]
    async fn delete_refuses_paths_outside_the_tasks_root() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let outside = dir.path().join("elsewhere");
        std::fs::create_dir_all(&outside).unwrap();
        assert!(store.delete_folder(&outside).await.is_err());
        assert!(outside.exists());
    }
}
