// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::download::stats::{DownloadStats, DownloadStatsSnapshot};
use crate::modules::error::{code::ErrorCode, RustScribeResult};
use crate::modules::settings::cli::SETTINGS;
use crate::{raise_error, run_with_timeout};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tracing::{info, warn};

pub mod fetch;
pub mod stats;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_settings() -> Self {
        Self {
            max_attempts: SETTINGS.rustscribe_download_max_attempts,
            base_delay: Duration::from_secs(SETTINGS.rustscribe_download_base_delay_secs),
            max_delay: Duration::from_secs(SETTINGS.rustscribe_download_max_delay_secs),
            attempt_timeout: Duration::from_secs(SETTINGS.rustscribe_download_timeout_secs),
        }
    }

    /// Exponential backoff capped at `max_delay`, plus 10-30% jitter so a
    /// burst of failed jobs does not retry in lockstep.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter = rand::rng().random_range(0.10..=0.30);
        exp + exp.mul_f64(jitter)
    }
}

/// Runs download jobs under a fixed concurrency bound, retrying transient
/// failures with exponential backoff. Every running (or queued) job is
/// cancellable through its job id.
pub struct Downloader {
    policy: RetryPolicy,
    semaphore: Arc<Semaphore>,
    active: DashMap<u64, oneshot::Sender<()>>,
    stats: DownloadStats,
}

impl Downloader {
    pub fn new(max_concurrent: usize, policy: RetryPolicy) -> Self {
        Self {
            policy,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            active: DashMap::new(),
            stats: DownloadStats::default(),
        }
    }

    pub fn from_settings() -> Self {
        Self::new(
            SETTINGS.rustscribe_max_concurrent_downloads,
            RetryPolicy::from_settings(),
        )
    }

    /// Runs `op` to completion under the concurrency bound. `op` is invoked
    /// once per attempt with the zero-based attempt number; a transient
    /// failure schedules a retry, a permanent one (or running out of
    /// attempts) fails the job. Cancellation wins over whatever the job is
    /// doing, including waiting for a permit or backing off.
    pub async fn execute<T, F, Fut>(&self, job_id: u64, op: F) -> RustScribeResult<T>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = RustScribeResult<T>> + Send,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        // Reserve the id atomically; a racing second submitter must not
        // displace the winner's cancel sender.
        match self.active.entry(job_id) {
            Entry::Occupied(_) => {
                return Err(raise_error!(
                    format!("download job '{job_id}' is already running"),
                    ErrorCode::AlreadyExists
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(cancel_tx);
            }
        }
        self.stats.record_started();

        let result = tokio::select! {
            result = self.run_attempts(job_id, &op) => result,
            _ = cancel_rx => {
                self.stats.record_cancelled();
                Err(raise_error!(
                    format!("download job '{job_id}' cancelled"),
                    ErrorCode::DownloadCancelled
                ))
            }
        };

        self.active.remove(&job_id);
        match &result {
            Ok(_) => self.stats.record_success(),
            Err(e) if e.code() != ErrorCode::DownloadCancelled => self.stats.record_failure(),
            Err(_) => {}
        }
        result
    }

    async fn run_attempts<T, F, Fut>(&self, job_id: u64, op: &F) -> RustScribeResult<T>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = RustScribeResult<T>> + Send,
    {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| raise_error!(format!("{e}"), ErrorCode::InternalError))?;

        let mut attempt: u32 = 0;
        loop {
            let outcome = run_with_timeout!(
                self.policy.attempt_timeout,
                op(attempt),
                raise_error!(
                    format!("download job '{job_id}' attempt {attempt} timed out"),
                    ErrorCode::DownloadTimeout
                )
            )
            .and_then(|inner| inner);

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    self.stats
                        .record_error(job_id, format!("{e}"), e.code());
                    let retryable =
                        e.code().is_transient() && attempt + 1 < self.policy.max_attempts;
                    if !retryable {
                        warn!(
                            "Download job '{}' failed after {} attempt(s): {}",
                            job_id,
                            attempt + 1,
                            e
                        );
                        return Err(e);
                    }
                    let delay = self.policy.backoff_delay(attempt);
                    info!(
                        "Download job '{}' attempt {} failed ({}), retrying in {:?}",
                        job_id, attempt, e, delay
                    );
                    self.stats.record_retry();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Cancels one job. Returns false when no such job is active.
    pub fn cancel(&self, job_id: u64) -> bool {
        match self.active.remove(&job_id) {
            Some((_, sender)) => sender.send(()).is_ok(),
            None => false,
        }
    }

    /// Cancels everything currently queued or running and returns how many
    /// jobs were signalled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<u64> = self.active.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn record_transfer(&self, bytes: u64, elapsed: Duration) {
        self.stats.record_transfer(bytes, elapsed);
    }

    pub fn stats(&self) -> DownloadStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}
