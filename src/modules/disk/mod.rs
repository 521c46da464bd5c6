// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::{code::ErrorCode, RustScribeResult};
use crate::modules::storage::directory_size;
use crate::{raise_error, utc_now};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Severity of the current disk situation, classified against the
/// configured warning and critical thresholds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Enum)]
pub enum DiskLevel {
    Normal,
    High,
    Critical,
}

#[derive(Clone, Debug, Serialize, Deserialize, Object)]
pub struct DiskSnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub used_percent: f64,
    pub level: DiskLevel,
    pub checked_at: i64,
}

#[derive(Debug)]
pub struct DiskSpace {
    pub total_space: u64,
    pub available_space: u64,
}

/// Measures the filesystem that holds the data directory. The probe never
/// acts on what it sees; the maintenance engine owns the reaction.
pub struct DiskUsageProbe {
    data_dir: PathBuf,
    warning_percent: f64,
    critical_percent: f64,
}

impl DiskUsageProbe {
    pub fn new(data_dir: impl Into<PathBuf>, warning_percent: f64, critical_percent: f64) -> Self {
        Self {
            data_dir: data_dir.into(),
            warning_percent,
            critical_percent,
        }
    }

    pub fn classify(&self, used_percent: f64) -> DiskLevel {
        if used_percent >= self.critical_percent {
            DiskLevel::Critical
        } else if used_percent >= self.warning_percent {
            DiskLevel::High
        } else {
            DiskLevel::Normal
        }
    }

    /// Device-level view of the volume holding the data directory. Reads
    /// mount statistics only; it never walks the directory tree.
    pub fn snapshot(&self) -> RustScribeResult<DiskSnapshot> {
        let disk_space = get_mount_disk_space(&self.data_dir).ok_or_else(|| {
            raise_error!(
                format!(
                    "no mounted filesystem found for data directory {:?}",
                    self.data_dir
                ),
                ErrorCode::InternalError
            )
        })?;
        let used_bytes = disk_space.total_space - disk_space.available_space;
        let used_percent = calculate_disk_usage_percentage(&disk_space);
        Ok(DiskSnapshot {
            total_bytes: disk_space.total_space,
            used_bytes,
            free_bytes: disk_space.available_space,
            used_percent,
            level: self.classify(used_percent),
            checked_at: utc_now!(),
        })
    }

    /// Bytes owned by the data directory itself. This walks the tree, so
    /// callers reach for it on demand rather than on every periodic check.
    pub async fn data_dir_usage(&self) -> RustScribeResult<u64> {
        directory_size(&self.data_dir).await
    }
}

fn calculate_disk_usage_percentage(disk_space: &DiskSpace) -> f64 {
    if disk_space.total_space == 0 {
        return 0.0;
    }
    let used_space = disk_space.total_space - disk_space.available_space;
    (used_space as f64 / disk_space.total_space as f64) * 100.0
}

fn mount_points() -> Vec<(PathBuf, DiskSpace)> {
    let disks = Disks::new_with_refreshed_list();
    let mut mount_points = Vec::new();

    for disk in disks.list() {
        mount_points.push((
            disk.mount_point().to_path_buf(),
            DiskSpace {
                total_space: disk.total_space(),
                available_space: disk.available_space(),
            },
        ));
    }

    mount_points
}

/// Resolves the deepest mount point that contains `file_path`, so a data
/// directory on a dedicated volume reports that volume rather than `/`.
pub fn get_mount_disk_space(file_path: &Path) -> Option<DiskSpace> {
    let mount_points = mount_points();

    let mut mount_depths: Vec<(PathBuf, usize, DiskSpace)> = mount_points
        .into_iter()
        .map(|mount| (mount.0.clone(), mount.0.components().count(), mount.1))
        .collect();

    mount_depths.sort_by(|a, b| b.1.cmp(&a.1));
    for (mount, _, disk_space) in mount_depths {
        if file_path.starts_with(&mount) {
            return Some(disk_space);
        }
    }

    None
}
