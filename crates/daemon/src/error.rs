// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon's single error enum. Wraps `clud_core::CoreError` and
//! `clud_storage::StorageError`, adds the process/runtime error kinds
//! (`PoolSaturated`, `InstanceGone`, ...) from §7, and is the single place
//! HTTP status codes are decided (`IntoResponse` below), mirroring how the
//! teacher codebase centralizes its API error mapping in one `IntoResponse`
//! impl at the web boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use clud_core::{CoreError, CronError};
use clud_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid cron expression")]
    InvalidCron(#[from] CronError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("instance pool saturated: no evictable instance and capacity exhausted")]
    PoolSaturated,

    #[error("instance for session {0:?} has exited")]
    InstanceGone(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("internal error ({correlation_id}): {message}")]
    Internal { correlation_id: String, message: String },
}

impl DaemonError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { correlation_id: clud_core::new_id("err"), message: message.into() }
    }

    /// The `{kind}` label used in both the structured log record (§7) and
    /// the JSON error body.
    pub fn kind(&self) -> &'static str {
        match self {
            DaemonError::Validation(_) | DaemonError::InvalidCron(_) => "ValidationError",
            DaemonError::NotFound(_) => "NotFound",
            DaemonError::Conflict(_) => "Conflict",
            DaemonError::PoolSaturated => "PoolSaturated",
            DaemonError::InstanceGone(_) => "InstanceGone",
            DaemonError::DeadlineExceeded => "DeadlineExceeded",
            DaemonError::Io(_) | DaemonError::Storage(_) => "IOError",
            DaemonError::Core(_) => "ValidationError",
            DaemonError::Internal { .. } => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            DaemonError::Validation(_) | DaemonError::InvalidCron(_) | DaemonError::Core(_) => {
                StatusCode::BAD_REQUEST
            }
            DaemonError::NotFound(_) => StatusCode::NOT_FOUND,
            DaemonError::Conflict(_) => StatusCode::CONFLICT,
            DaemonError::PoolSaturated => StatusCode::SERVICE_UNAVAILABLE,
            DaemonError::InstanceGone(_) => StatusCode::GONE,
            DaemonError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            DaemonError::Io(_) | DaemonError::Storage(_) | DaemonError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
}

impl IntoResponse for DaemonError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!(
            component = "daemon::http",
            kind = self.kind(),
            message = %self,
            "request failed"
        );
        (status, Json(ErrorBody { error: ErrorDetail { kind: self.kind(), message: self.to_string() } }))
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_saturated_maps_to_503() {
        assert_eq!(DaemonError::PoolSaturated.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(DaemonError::PoolSaturated.kind(), "PoolSaturated");
    }

    #[test]
    fn instance_gone_maps_to_410() {
        let err = DaemonError::InstanceGone("s1".into());
        assert_eq!(err.status(), StatusCode::GONE);
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(DaemonError::NotFound("task x".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_carries_a_correlation_id() {
        let err = DaemonError::internal("boom");
        match err {
            DaemonError::Internal { correlation_id, .. } => assert!(correlation_id.starts_with("err_")),
            _ => panic!("expected Internal"),
        }
    }
}
