// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::utc_now;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Error history high-water mark; once reached the oldest half is dropped
/// so the buffer never grows unbounded.
const ERROR_HISTORY_LIMIT: usize = 1000;
const ERROR_HISTORY_TRIMMED: usize = 500;

#[derive(Clone, Debug, Serialize, Deserialize, Object)]
pub struct DownloadError {
    pub job_id: u64,
    pub message: String,
    pub code: ErrorCode,
    pub occurred_at: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct DownloadStatsSnapshot {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retries: u64,
    pub bytes_downloaded: u64,
    pub transfer_time_ms: u64,
    /// Succeeded jobs over all terminally finished jobs, in [0, 1].
    pub success_rate: f64,
    pub avg_throughput_bytes_per_sec: f64,
    pub recent_errors: Vec<DownloadError>,
}

/// Lock-free counters plus a bounded error history.
#[derive(Default)]
pub struct DownloadStats {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    retries: AtomicU64,
    bytes_downloaded: AtomicU64,
    transfer_time_ms: AtomicU64,
    errors: Mutex<VecDeque<DownloadError>>,
}

impl DownloadStats {
    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transfer(&self, bytes: u64, elapsed: std::time::Duration) {
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
        self.transfer_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self, job_id: u64, message: String, code: ErrorCode) {
        let mut errors = self.errors.lock().unwrap();
        errors.push_back(DownloadError {
            job_id,
            message,
            code,
            occurred_at: utc_now!(),
        });
        if errors.len() >= ERROR_HISTORY_LIMIT {
            let excess = errors.len() - ERROR_HISTORY_TRIMMED;
            errors.drain(..excess);
        }
    }

    pub fn snapshot(&self) -> DownloadStatsSnapshot {
        let recent_errors = self.errors.lock().unwrap().iter().cloned().collect();
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let cancelled = self.cancelled.load(Ordering::Relaxed);
        let bytes_downloaded = self.bytes_downloaded.load(Ordering::Relaxed);
        let transfer_time_ms = self.transfer_time_ms.load(Ordering::Relaxed);
        let finished = succeeded + failed + cancelled;
        DownloadStatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            succeeded,
            failed,
            cancelled,
            retries: self.retries.load(Ordering::Relaxed),
            bytes_downloaded,
            transfer_time_ms,
            success_rate: if finished == 0 {
                0.0
            } else {
                succeeded as f64 / finished as f64
            },
            avg_throughput_bytes_per_sec: if transfer_time_ms == 0 {
                0.0
            } else {
                bytes_downloaded as f64 * 1000.0 / transfer_time_ms as f64
            },
            recent_errors,
        }
    }

    pub fn reset(&self) {
        self.started.store(0, Ordering::Relaxed);
        self.succeeded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.cancelled.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
        self.bytes_downloaded.store(0, Ordering::Relaxed);
        self.transfer_time_ms.store(0, Ordering::Relaxed);
        self.errors.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_history_is_trimmed_at_the_high_water_mark() {
        let stats = DownloadStats::default();
        for i in 0..ERROR_HISTORY_LIMIT as u64 {
            stats.record_error(i, format!("error {i}"), ErrorCode::NetworkError);
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.recent_errors.len(), ERROR_HISTORY_TRIMMED);
        // The newest entries survive the trim.
        assert_eq!(
            snapshot.recent_errors.last().unwrap().job_id,
            ERROR_HISTORY_LIMIT as u64 - 1
        );
    }
}
