// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::RustScribeResult;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::settings::dir::DATA_DIR_MANAGER;
use crate::modules::utils::fingerprint;
use lru::LruCache;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, trace, warn};

pub mod task;

/// Fraction of the disk budget the size-based eviction drains down to, so
/// one oversized write does not trigger an eviction on every sweep.
const EVICTION_TARGET_RATIO: f64 = 0.8;

/// Expiry class of a cached value. Each class has its own TTL; the two
/// artifact classes are also persisted to disk, query results stay
/// memory-only.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TtlClass {
    Metadata,
    Thumbnail,
    QueryResult,
}

impl TtlClass {
    fn extension(&self) -> &'static str {
        match self {
            TtlClass::Metadata => "json",
            TtlClass::Thumbnail => "jpg",
            TtlClass::QueryResult => "bin",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub metadata_ttl: Duration,
    pub thumbnail_ttl: Duration,
    pub query_ttl: Duration,
    pub max_disk_bytes: u64,
    pub memory_capacity: usize,
}

impl CacheConfig {
    pub fn from_settings() -> Self {
        Self {
            metadata_ttl: Duration::from_secs(SETTINGS.rustscribe_metadata_cache_ttl_hours * 3600),
            thumbnail_ttl: Duration::from_secs(
                SETTINGS.rustscribe_thumbnail_cache_ttl_days * 24 * 3600,
            ),
            query_ttl: Duration::from_secs(SETTINGS.rustscribe_query_cache_ttl_seconds),
            max_disk_bytes: SETTINGS.rustscribe_cache_max_size_mb * 1024 * 1024,
            memory_capacity: SETTINGS.rustscribe_memory_cache_capacity,
        }
    }

    pub fn ttl(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Metadata => self.metadata_ttl,
            TtlClass::Thumbnail => self.thumbnail_ttl,
            TtlClass::QueryResult => self.query_ttl,
        }
    }
}

#[derive(Clone)]
struct MemoryEntry {
    data: Arc<Vec<u8>>,
    class: TtlClass,
    created_at: Instant,
    access_count: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub disk_entries: usize,
    pub disk_bytes: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
}

/// Two-tier cache for derived artifacts: a bounded in-memory LRU in front
/// of per-class disk directories. The memory tier is authoritative; a disk
/// write that fails is logged and the value stays served from memory.
///
/// The memory tier sits behind a std `RwLock`, never a suspending one, so
/// lookups cannot park the caller. Lookups take the write half: a hit must
/// refresh the entry's LRU position, and an expired entry is popped on the
/// spot instead of lingering until the next sweep.
pub struct TieredCache {
    config: CacheConfig,
    memory: RwLock<LruCache<String, MemoryEntry>>,
    metadata_dir: PathBuf,
    thumbnail_dir: PathBuf,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
}

impl TieredCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_dirs(
            DATA_DIR_MANAGER.metadata_cache_dir.clone(),
            DATA_DIR_MANAGER.thumbnail_cache_dir.clone(),
            config,
        )
    }

    pub fn with_dirs(
        metadata_dir: impl Into<PathBuf>,
        thumbnail_dir: impl Into<PathBuf>,
        config: CacheConfig,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.memory_capacity.max(1)).unwrap();
        Self {
            memory: RwLock::new(LruCache::new(capacity)),
            metadata_dir: metadata_dir.into(),
            thumbnail_dir: thumbnail_dir.into(),
            config,
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn class_dir(&self, class: TtlClass) -> Option<&Path> {
        match class {
            TtlClass::Metadata => Some(self.metadata_dir.as_path()),
            TtlClass::Thumbnail => Some(self.thumbnail_dir.as_path()),
            TtlClass::QueryResult => None,
        }
    }

    fn disk_path(&self, class: TtlClass, source: &str) -> Option<PathBuf> {
        let dir = self.class_dir(class)?;
        Some(dir.join(format!("{}.{}", fingerprint(source), class.extension())))
    }

    fn memory_key(class: TtlClass, source: &str) -> String {
        format!("{:?}:{}", class, fingerprint(source))
    }

    /// Looks up `source` in the memory tier, falling back to disk for the
    /// persisted classes. A disk hit is promoted back into memory. Any
    /// disk-side problem, a missing file, an expired file, or an I/O error,
    /// is reported as a plain miss.
    pub async fn get(&self, class: TtlClass, source: &str) -> Option<Arc<Vec<u8>>> {
        let key = Self::memory_key(class, source);
        {
            let mut store = self.memory.write().unwrap();
            if let Some(entry) = store.get_mut(&key) {
                if entry.created_at.elapsed() <= self.config.ttl(entry.class) {
                    entry.access_count += 1;
                    trace!("Memory hit for {} (access #{})", key, entry.access_count);
                    self.memory_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.data.clone());
                }
                store.pop(&key);
            }
        }

        if let Some(data) = self.read_disk(class, source).await {
            self.disk_hits.fetch_add(1, Ordering::Relaxed);
            let data = Arc::new(data);
            self.insert_memory(key, class, data.clone());
            return Some(data);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores `data` in the memory tier and, for the persisted classes, on
    /// disk as well.
    pub async fn set(&self, class: TtlClass, source: &str, data: Vec<u8>) {
        let data = Arc::new(data);
        self.insert_memory(Self::memory_key(class, source), class, data.clone());
        if let Some(path) = self.disk_path(class, source) {
            if let Err(e) = tokio::fs::write(&path, data.as_slice()).await {
                warn!("Cache disk write failed for {}: {}", path.display(), e);
            }
        }
    }

    /// Returns the on-disk path of a cached artifact when it exists and is
    /// still within its TTL. Used for artifacts served straight off disk.
    pub async fn get_file(&self, class: TtlClass, source: &str) -> Option<PathBuf> {
        let path = self.disk_path(class, source)?;
        let meta = tokio::fs::metadata(&path).await.ok()?;
        if file_age(&meta) > self.config.ttl(class) {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
        Some(path)
    }

    /// Writes an artifact directly to the disk tier, bypassing memory.
    pub async fn put_file(
        &self,
        class: TtlClass,
        source: &str,
        data: &[u8],
    ) -> RustScribeResult<Option<PathBuf>> {
        let Some(path) = self.disk_path(class, source) else {
            return Ok(None);
        };
        if let Err(e) = tokio::fs::write(&path, data).await {
            warn!("Cache disk write failed for {}: {}", path.display(), e);
            return Ok(None);
        }
        Ok(Some(path))
    }

    fn insert_memory(&self, key: String, class: TtlClass, data: Arc<Vec<u8>>) {
        let mut store = self.memory.write().unwrap();
        store.put(
            key,
            MemoryEntry {
                data,
                class,
                created_at: Instant::now(),
                access_count: 0,
            },
        );
    }

    async fn read_disk(&self, class: TtlClass, source: &str) -> Option<Vec<u8>> {
        let path = self.disk_path(class, source)?;
        let meta = tokio::fs::metadata(&path).await.ok()?;
        if file_age(&meta) > self.config.ttl(class) {
            debug!("Cache file {} is past its TTL", path.display());
            return None;
        }
        match tokio::fs::read(&path).await {
            Ok(data) => Some(data),
            Err(e) => {
                debug!("Cache read failed for {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Drops expired entries from both tiers. Returns the number of disk
    /// files removed and the bytes they occupied.
    pub async fn evict_expired(&self) -> RustScribeResult<(usize, u64)> {
        {
            let mut store = self.memory.write().unwrap();
            let expired: Vec<String> = store
                .iter()
                .filter(|(_, entry)| entry.created_at.elapsed() > self.config.ttl(entry.class))
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                store.pop(&key);
            }
        }

        let mut removed = 0usize;
        let mut reclaimed = 0u64;
        for class in [TtlClass::Metadata, TtlClass::Thumbnail] {
            let ttl = self.config.ttl(class);
            for file in self.scan_class(class).await {
                if file.age > ttl {
                    match tokio::fs::remove_file(&file.path).await {
                        Ok(()) => {
                            removed += 1;
                            reclaimed += file.size;
                        }
                        Err(e) => {
                            warn!("Failed to evict {}: {}", file.path.display(), e)
                        }
                    }
                }
            }
        }
        if removed > 0 {
            info!(
                "Evicted {} expired cache files ({} bytes)",
                removed, reclaimed
            );
        }
        Ok((removed, reclaimed))
    }

    /// When the disk tier exceeds its budget, deletes files oldest-first
    /// until usage drops below [`EVICTION_TARGET_RATIO`] of the budget.
    pub async fn evict_to_size_budget(&self) -> RustScribeResult<(usize, u64)> {
        let mut files = Vec::new();
        for class in [TtlClass::Metadata, TtlClass::Thumbnail] {
            files.extend(self.scan_class(class).await);
        }
        let total: u64 = files.iter().map(|f| f.size).sum();
        if total <= self.config.max_disk_bytes {
            return Ok((0, 0));
        }

        let target = (self.config.max_disk_bytes as f64 * EVICTION_TARGET_RATIO) as u64;
        files.sort_by_key(|f| f.modified_at);

        let mut remaining = total;
        let mut removed = 0usize;
        let mut reclaimed = 0u64;
        for file in files {
            if remaining <= target {
                break;
            }
            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => {
                    remaining -= file.size;
                    removed += 1;
                    reclaimed += file.size;
                }
                Err(e) => warn!("Failed to evict {}: {}", file.path.display(), e),
            }
        }
        info!(
            "Cache size eviction removed {} files, {} bytes reclaimed",
            removed, reclaimed
        );
        Ok((removed, reclaimed))
    }

    pub async fn stats(&self) -> CacheStats {
        let memory_entries = self.memory.read().unwrap().len();
        let mut disk_entries = 0usize;
        let mut disk_bytes = 0u64;
        for class in [TtlClass::Metadata, TtlClass::Thumbnail] {
            for file in self.scan_class(class).await {
                disk_entries += 1;
                disk_bytes += file.size;
            }
        }
        CacheStats {
            memory_entries,
            disk_entries,
            disk_bytes,
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub async fn clear(&self) {
        self.memory.write().unwrap().clear();
        for class in [TtlClass::Metadata, TtlClass::Thumbnail] {
            for file in self.scan_class(class).await {
                if let Err(e) = tokio::fs::remove_file(&file.path).await {
                    warn!("Failed to remove {}: {}", file.path.display(), e);
                }
            }
        }
    }

    async fn scan_class(&self, class: TtlClass) -> Vec<DiskFile> {
        let Some(dir) = self.class_dir(class) else {
            return Vec::new();
        };
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cache directory {} unreadable: {}", dir.display(), e);
                return files;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            files.push(DiskFile {
                path: entry.path(),
                size: meta.len(),
                modified_at: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                age: file_age(&meta),
            });
        }
        files
    }
}

struct DiskFile {
    path: PathBuf,
    size: u64,
    modified_at: SystemTime,
    age: Duration,
}

fn file_age(meta: &std::fs::Metadata) -> Duration {
    meta.modified()
        .ok()
        .and_then(|m| SystemTime::now().duration_since(m).ok())
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> CacheConfig {
        CacheConfig {
            metadata_ttl: Duration::from_secs(3600),
            thumbnail_ttl: Duration::from_secs(3600),
            query_ttl: Duration::from_secs(300),
            max_disk_bytes: 1024,
            memory_capacity: 8,
        }
    }

    fn cache_at(root: &Path, config: CacheConfig) -> TieredCache {
        let metadata = root.join("metadata");
        let thumbnails = root.join("thumbnails");
        std::fs::create_dir_all(&metadata).unwrap();
        std::fs::create_dir_all(&thumbnails).unwrap();
        TieredCache::with_dirs(metadata, thumbnails, config)
    }

    #[tokio::test]
    async fn set_then_get_hits_memory() {
        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path(), config());
        cache
            .set(TtlClass::Metadata, "video-1", b"{\"title\":\"a\"}".to_vec())
            .await;
        let hit = cache.get(TtlClass::Metadata, "video-1").await.unwrap();
        assert_eq!(hit.as_slice(), b"{\"title\":\"a\"}");
        assert_eq!(cache.stats().await.memory_hits, 1);
    }

    #[tokio::test]
    async fn disk_hit_is_promoted_after_memory_loss() {
        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path(), config());
        cache
            .set(TtlClass::Metadata, "video-2", b"payload".to_vec())
            .await;

        // A fresh cache over the same directories simulates a restart.
        let cache = cache_at(dir.path(), config());
        let hit = cache.get(TtlClass::Metadata, "video-2").await.unwrap();
        assert_eq!(hit.as_slice(), b"payload");
        let stats = cache.stats().await;
        assert_eq!(stats.disk_hits, 1);
        // Promoted: the next lookup comes from memory.
        cache.get(TtlClass::Metadata, "video-2").await.unwrap();
        assert_eq!(cache.stats().await.memory_hits, 1);
    }

    #[tokio::test]
    async fn query_results_never_touch_disk() {
        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path(), config());
        cache
            .set(TtlClass::QueryResult, "select *", b"rows".to_vec())
            .await;
        assert_eq!(cache.stats().await.disk_entries, 0);

        let cache = cache_at(dir.path(), config());
        assert!(cache.get(TtlClass::QueryResult, "select *").await.is_none());
    }

    #[tokio::test]
    async fn reads_refresh_memory_recency() {
        let dir = tempdir().unwrap();
        let mut cfg = config();
        cfg.memory_capacity = 2;
        let cache = cache_at(dir.path(), cfg);

        // Query results have no disk tier, so an evicted entry is gone.
        cache.set(TtlClass::QueryResult, "q-a", b"a".to_vec()).await;
        cache.set(TtlClass::QueryResult, "q-b", b"b".to_vec()).await;
        cache.get(TtlClass::QueryResult, "q-a").await.unwrap();

        // A third insert evicts the least recently used entry, which after
        // the read above must be q-b, not q-a.
        cache.set(TtlClass::QueryResult, "q-c", b"c".to_vec()).await;
        assert!(cache.get(TtlClass::QueryResult, "q-a").await.is_some());
        assert!(cache.get(TtlClass::QueryResult, "q-b").await.is_none());
    }

    #[tokio::test]
    async fn lookups_count_accesses_and_drop_expired_entries() {
        let dir = tempdir().unwrap();
        let mut cfg = config();
        cfg.query_ttl = Duration::ZERO;
        let cache = cache_at(dir.path(), cfg);

        cache.set(TtlClass::Metadata, "video-9", b"x".to_vec()).await;
        cache.get(TtlClass::Metadata, "video-9").await.unwrap();
        cache.get(TtlClass::Metadata, "video-9").await.unwrap();
        {
            let mut store = cache.memory.write().unwrap();
            let key = TieredCache::memory_key(TtlClass::Metadata, "video-9");
            assert_eq!(store.get(&key).unwrap().access_count, 2);
        }

        // An expired entry is popped during the lookup itself, not left for
        // the next sweep.
        cache.set(TtlClass::QueryResult, "q-old", b"y".to_vec()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get(TtlClass::QueryResult, "q-old").await.is_none());
        assert_eq!(cache.stats().await.memory_entries, 1);
    }

    #[tokio::test]
    async fn expired_entries_read_as_misses() {
        let dir = tempdir().unwrap();
        let mut cfg = config();
        cfg.metadata_ttl = Duration::ZERO;
        let cache = cache_at(dir.path(), cfg);
        cache
            .set(TtlClass::Metadata, "video-3", b"stale".to_vec())
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get(TtlClass::Metadata, "video-3").await.is_none());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn expired_sweep_removes_disk_files() {
        let dir = tempdir().unwrap();
        let mut cfg = config();
        cfg.thumbnail_ttl = Duration::ZERO;
        let cache = cache_at(dir.path(), cfg);
        cache
            .put_file(TtlClass::Thumbnail, "video-4", &[0u8; 32])
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (removed, reclaimed) = cache.evict_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(reclaimed, 32);
        assert_eq!(cache.stats().await.disk_entries, 0);
    }

    #[tokio::test]
    async fn size_eviction_drops_oldest_first_and_leaves_headroom() {
        let dir = tempdir().unwrap();
        let mut cfg = config();
        cfg.max_disk_bytes = 1000;
        let cache = cache_at(dir.path(), cfg);

        let old = cache
            .put_file(TtlClass::Thumbnail, "oldest", &[0u8; 400])
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache
            .put_file(TtlClass::Thumbnail, "middle", &[0u8; 400])
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let new = cache
            .put_file(TtlClass::Thumbnail, "newest", &[0u8; 400])
            .await
            .unwrap()
            .unwrap();

        // 1200 bytes against a 1000 byte budget: drain to 800.
        let (removed, reclaimed) = cache.evict_to_size_budget().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(reclaimed, 400);
        assert!(!old.exists());
        assert!(new.exists());

        // Under budget again, the next pass is a no-op.
        let (removed, _) = cache.evict_to_size_budget().await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn unreadable_disk_entry_is_a_plain_miss() {
        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path(), config());
        assert!(cache.get(TtlClass::Metadata, "never-stored").await.is_none());
        assert_eq!(cache.stats().await.misses, 1);
    }
}
