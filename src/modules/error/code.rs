// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem::http::StatusCode;
use poem_openapi::Enum;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Enum, Eq, PartialEq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    MissingConfiguration = 10010,
    ExceedsLimitation = 10020,
    RequestTimeout = 10030,

    // Resource errors (30000–30999)
    ResourceNotFound = 30000,
    AlreadyExists = 30010,
    TooManyRequest = 30020,

    // Network and download errors (40000–40999)
    NetworkError = 40000,
    ConnectionTimeout = 40010,
    HttpResponseError = 40020,
    DownloadFailed = 40030,
    DownloadTimeout = 40040,
    DownloadCancelled = 40050,
    DownloadSourceRejected = 40060,

    // Maintenance and storage errors (50000–50999)
    MaintenanceBusy = 50000,
    IndexOperationFailed = 50010,
    IntegrityCheckFailed = 50020,
    DiskSpaceCritical = 50030,
    FileStoreError = 50040,
    CacheIoError = 50050,

    // Internal system errors (70000–70999)
    InternalError = 70000,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidParameter
            | ErrorCode::MissingConfiguration
            | ErrorCode::ExceedsLimitation => StatusCode::BAD_REQUEST,
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::RequestTimeout | ErrorCode::DownloadTimeout => StatusCode::REQUEST_TIMEOUT,
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::TooManyRequest | ErrorCode::MaintenanceBusy => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ErrorCode::DownloadSourceRejected => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::NetworkError
            | ErrorCode::ConnectionTimeout
            | ErrorCode::HttpResponseError
            | ErrorCode::DownloadFailed
            | ErrorCode::DownloadCancelled
            | ErrorCode::IndexOperationFailed
            | ErrorCode::IntegrityCheckFailed
            | ErrorCode::DiskSpaceCritical
            | ErrorCode::FileStoreError
            | ErrorCode::CacheIoError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a failed download attempt carrying this code may be retried.
    /// Permanent rejections (malformed input, 4xx-equivalent) are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError
                | ErrorCode::ConnectionTimeout
                | ErrorCode::HttpResponseError
                | ErrorCode::DownloadTimeout
                | ErrorCode::RequestTimeout
        )
    }
}
