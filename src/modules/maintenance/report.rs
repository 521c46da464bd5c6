// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::utc_now;
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Enum)]
pub enum MaintenanceKind {
    Cleanup,
    DiskCheck,
    Optimize,
}

/// How eventful a maintenance run was. `Critical` is reserved for runs
/// triggered by (or observing) a critical disk situation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Enum)]
pub enum MaintenanceLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// A run is `High` once it removed more than this many files.
const HIGH_ACTIVITY_FILES: usize = 10;

#[derive(Clone, Debug, Serialize, Deserialize, Object)]
pub struct MaintenanceReport {
    pub kind: MaintenanceKind,
    pub level: MaintenanceLevel,
    pub started_at: i64,
    pub duration_ms: u64,
    pub actions: Vec<String>,
    pub files_cleaned: usize,
    pub space_freed: u64,
    pub errors: Vec<String>,
}

/// Accumulates what a maintenance run did; [`finish`](Self::finish) seals
/// it into a report with a level derived from the recorded activity.
pub struct ReportBuilder {
    kind: MaintenanceKind,
    started_at: i64,
    started: Instant,
    actions: Vec<String>,
    files_cleaned: usize,
    space_freed: u64,
    errors: Vec<String>,
    escalated: Option<MaintenanceLevel>,
}

impl ReportBuilder {
    pub fn new(kind: MaintenanceKind) -> Self {
        Self {
            kind,
            started_at: utc_now!(),
            started: Instant::now(),
            actions: Vec::new(),
            files_cleaned: 0,
            space_freed: 0,
            errors: Vec::new(),
            escalated: None,
        }
    }

    pub fn action(&mut self, action: impl Into<String>) {
        self.actions.push(action.into());
    }

    pub fn cleaned(&mut self, files: usize, bytes: u64) {
        self.files_cleaned += files;
        self.space_freed += bytes;
    }

    pub fn error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Forces the final level to at least `level`.
    pub fn escalate(&mut self, level: MaintenanceLevel) {
        self.escalated = Some(match self.escalated {
            Some(current) => current.max(level),
            None => level,
        });
    }

    pub fn finish(self) -> MaintenanceReport {
        let mut level = if self.files_cleaned > HIGH_ACTIVITY_FILES {
            MaintenanceLevel::High
        } else if !self.errors.is_empty() {
            MaintenanceLevel::Medium
        } else {
            MaintenanceLevel::Low
        };
        if let Some(escalated) = self.escalated {
            level = level.max(escalated);
        }
        MaintenanceReport {
            kind: self.kind,
            level,
            started_at: self.started_at,
            duration_ms: self.started.elapsed().as_millis() as u64,
            actions: self.actions,
            files_cleaned: self.files_cleaned,
            space_freed: self.space_freed,
            errors: self.errors,
        }
    }
}
