// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod cache;
pub mod common;
pub mod context;
pub mod disk;
pub mod download;
pub mod error;
pub mod index;
pub mod logger;
pub mod maintenance;
pub mod settings;
pub mod storage;
pub mod utils;
