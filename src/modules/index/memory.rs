// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::{code::ErrorCode, RustScribeResult};
use crate::modules::index::{TaskIndexStore, TaskRecord, TaskStatus};
use crate::raise_error;
use ahash::AHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-process task index. Deleted rows leave their bytes behind as dead
/// weight until `compact` runs, which mirrors how the real index file
/// grows until it is rewritten.
pub struct MemoryIndexStore {
    tasks: RwLock<AHashMap<u64, TaskRecord>>,
    live_bytes: AtomicU64,
    dead_bytes: AtomicU64,
}

fn record_footprint(record: &TaskRecord) -> u64 {
    (std::mem::size_of::<TaskRecord>() + record.name.len()) as u64
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(AHashMap::new()),
            live_bytes: AtomicU64::new(0),
            dead_bytes: AtomicU64::new(0),
        }
    }
}

impl Default for MemoryIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskIndexStore for MemoryIndexStore {
    async fn create_task(&self, record: TaskRecord) -> RustScribeResult<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&record.id) {
            return Err(raise_error!(
                format!("task '{}' already exists in the index", record.id),
                ErrorCode::AlreadyExists
            ));
        }
        self.live_bytes
            .fetch_add(record_footprint(&record), Ordering::Relaxed);
        tasks.insert(record.id, record);
        Ok(())
    }

    async fn get_task(&self, id: u64) -> RustScribeResult<Option<TaskRecord>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn list_tasks_by_status(&self, status: TaskStatus) -> RustScribeResult<Vec<TaskRecord>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn delete_task(&self, id: u64) -> RustScribeResult<bool> {
        let mut tasks = self.tasks.write().await;
        match tasks.remove(&id) {
            Some(record) => {
                let bytes = record_footprint(&record);
                self.live_bytes.fetch_sub(bytes, Ordering::Relaxed);
                self.dead_bytes.fetch_add(bytes, Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn task_count(&self) -> RustScribeResult<usize> {
        Ok(self.tasks.read().await.len())
    }

    async fn storage_size(&self) -> RustScribeResult<u64> {
        Ok(self.live_bytes.load(Ordering::Relaxed) + self.dead_bytes.load(Ordering::Relaxed))
    }

    async fn compact(&self) -> RustScribeResult<()> {
        // Hold the write lock so no row mutates mid-rewrite.
        let _tasks = self.tasks.write().await;
        self.dead_bytes.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn reindex(&self) -> RustScribeResult<()> {
        let _tasks = self.tasks.write().await;
        Ok(())
    }

    async fn integrity_check(&self) -> RustScribeResult<bool> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().all(|(id, record)| *id == record.id))
    }
}
