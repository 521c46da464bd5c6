// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use clap::Parser;
use std::sync::LazyLock;

#[cfg(not(test))]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::parse);

#[cfg(test)]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::new_for_test);

#[derive(Debug, Parser)]
#[clap(
    name = "rustscribe",
    about = "A speech-to-text conversion service that stores audio, subtitles and transcripts
    per task, with background maintenance of the on-disk corpus and its index.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// rustscribe log level (default: "info")
    #[clap(
        long,
        default_value = "info",
        env,
        help = "Set the log level for rustscribe"
    )]
    pub rustscribe_log_level: String,

    /// Enable ANSI logs (default: false)
    #[clap(long, default_value = "false", env, help = "Enable ANSI formatted logs")]
    pub rustscribe_ansi_logs: bool,

    /// Enable log file output (default: false)
    /// If false, logs will be printed to stdout
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable log file output (otherwise logs go to stdout)"
    )]
    pub rustscribe_log_to_file: bool,

    #[clap(
        long,
        default_value = "7",
        env,
        help = "Maximum number of rotated server log files to keep"
    )]
    pub rustscribe_max_server_log_files: usize,

    /// Root directory for all rustscribe data (task corpus, cache, temp, logs)
    #[clap(
        long,
        default_value = "./rustscribe_data",
        env,
        help = "Set the root data directory for rustscribe"
    )]
    pub rustscribe_root_dir: String,

    // ---- retention cleanup ----
    #[clap(
        long,
        default_value = "true",
        env,
        help = "Enable the periodic retention cleanup loop"
    )]
    pub rustscribe_cleanup_enabled: bool,

    #[clap(
        long,
        default_value = "24",
        env,
        help = "Hours between retention cleanup runs"
    )]
    pub rustscribe_cleanup_interval_hours: u64,

    #[clap(
        long,
        default_value = "30",
        env,
        help = "Days a completed task is kept before it becomes eligible for deletion"
    )]
    pub rustscribe_task_retention_days: u16,

    #[clap(
        long,
        default_value = "7",
        env,
        help = "Days a failed task is kept before it becomes eligible for deletion"
    )]
    pub rustscribe_failed_task_retention_days: u16,

    // ---- disk monitoring ----
    #[clap(
        long,
        default_value = "true",
        env,
        help = "Enable the periodic disk usage monitor loop"
    )]
    pub rustscribe_disk_monitor_enabled: bool,

    #[clap(
        long,
        default_value = "30",
        env,
        help = "Minutes between disk usage checks"
    )]
    pub rustscribe_disk_monitor_interval_minutes: u64,

    #[clap(
        long,
        default_value = "80.0",
        env,
        help = "Disk usage percentage that triggers a warning"
    )]
    pub rustscribe_disk_warning_percent: f64,

    #[clap(
        long,
        default_value = "90.0",
        env,
        help = "Disk usage percentage considered critical"
    )]
    pub rustscribe_disk_critical_percent: f64,

    #[clap(
        long,
        default_value = "true",
        env,
        help = "Run an aggressive cleanup automatically when disk usage is critical"
    )]
    pub rustscribe_auto_cleanup_on_critical: bool,

    #[clap(
        long,
        default_value = "7",
        env,
        help = "Shortened retention window (days) used by critical-disk cleanups"
    )]
    pub rustscribe_critical_retention_days: u16,

    // ---- index optimization ----
    #[clap(
        long,
        default_value = "true",
        env,
        help = "Enable the periodic index optimization loop"
    )]
    pub rustscribe_index_optimize_enabled: bool,

    #[clap(
        long,
        default_value = "168",
        env,
        help = "Hours between index optimization runs (default one week)"
    )]
    pub rustscribe_index_optimize_interval_hours: u64,

    #[clap(
        long,
        default_value = "100",
        env,
        help = "Index storage size (MiB) above which compaction is performed"
    )]
    pub rustscribe_compact_threshold_mb: u64,

    #[clap(
        long,
        default_value = "50",
        env,
        help = "Number of most recent maintenance reports kept in memory"
    )]
    pub rustscribe_report_history_limit: usize,

    // ---- cache ----
    #[clap(
        long,
        default_value = "24",
        env,
        help = "Time-to-live (hours) for cached source metadata"
    )]
    pub rustscribe_metadata_cache_ttl_hours: u64,

    #[clap(
        long,
        default_value = "7",
        env,
        help = "Time-to-live (days) for cached thumbnails"
    )]
    pub rustscribe_thumbnail_cache_ttl_days: u64,

    #[clap(
        long,
        default_value = "300",
        env,
        help = "Time-to-live (seconds) for cached query results"
    )]
    pub rustscribe_query_cache_ttl_seconds: u64,

    #[clap(
        long,
        default_value = "1024",
        env,
        help = "Aggregate on-disk cache budget (MiB)"
    )]
    pub rustscribe_cache_max_size_mb: u64,

    #[clap(
        long,
        default_value = "60",
        env,
        help = "Minutes between proactive cache sweeps"
    )]
    pub rustscribe_cache_sweep_interval_minutes: u64,

    #[clap(
        long,
        default_value = "1024",
        env,
        help = "Maximum number of entries held in the in-memory cache tier"
    )]
    pub rustscribe_memory_cache_capacity: usize,

    // ---- downloads ----
    #[clap(
        long,
        default_value = "3",
        env,
        help = "Maximum number of simultaneous external downloads"
    )]
    pub rustscribe_max_concurrent_downloads: usize,

    #[clap(
        long,
        default_value = "4",
        env,
        help = "Maximum download attempts per job (first try plus retries)"
    )]
    pub rustscribe_download_max_attempts: u32,

    #[clap(
        long,
        default_value = "1",
        env,
        help = "Base retry delay (seconds) for download backoff"
    )]
    pub rustscribe_download_base_delay_secs: u64,

    #[clap(
        long,
        default_value = "60",
        env,
        help = "Upper bound (seconds) on the download retry delay"
    )]
    pub rustscribe_download_max_delay_secs: u64,

    #[clap(
        long,
        default_value = "300",
        env,
        help = "Timeout (seconds) applied to each individual download attempt"
    )]
    pub rustscribe_download_timeout_secs: u64,
}

#[cfg(test)]
impl Settings {
    fn new_for_test() -> Self {
        Self {
            rustscribe_log_level: "info".to_string(),
            rustscribe_ansi_logs: false,
            rustscribe_log_to_file: false,
            rustscribe_max_server_log_files: 5,
            rustscribe_root_dir: std::env::temp_dir()
                .join("rustscribe_test_data")
                .to_string_lossy()
                .into_owned(),
            rustscribe_cleanup_enabled: true,
            rustscribe_cleanup_interval_hours: 24,
            rustscribe_task_retention_days: 30,
            rustscribe_failed_task_retention_days: 7,
            rustscribe_disk_monitor_enabled: true,
            rustscribe_disk_monitor_interval_minutes: 30,
            rustscribe_disk_warning_percent: 80.0,
            rustscribe_disk_critical_percent: 90.0,
            rustscribe_auto_cleanup_on_critical: true,
            rustscribe_critical_retention_days: 7,
            rustscribe_index_optimize_enabled: true,
            rustscribe_index_optimize_interval_hours: 168,
            rustscribe_compact_threshold_mb: 100,
            rustscribe_report_history_limit: 50,
            rustscribe_metadata_cache_ttl_hours: 24,
            rustscribe_thumbnail_cache_ttl_days: 7,
            rustscribe_query_cache_ttl_seconds: 300,
            rustscribe_cache_max_size_mb: 1024,
            rustscribe_cache_sweep_interval_minutes: 60,
            rustscribe_memory_cache_capacity: 1024,
            rustscribe_max_concurrent_downloads: 3,
            rustscribe_download_max_attempts: 4,
            rustscribe_download_base_delay_secs: 1,
            rustscribe_download_max_delay_secs: 60,
            rustscribe_download_timeout_secs: 300,
        }
    }
}
