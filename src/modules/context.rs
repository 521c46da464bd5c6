// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::RustScribeResult;

pub trait Initialize {
    async fn initialize() -> RustScribeResult<()>;
}
