// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the API surface and the generation pipeline.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadInput(_) => (StatusCode::UNPROCESSABLE_ENTITY, "BAD_INPUT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Errors raised inside a generation job.
///
/// Everything here is captured by the worker and marks the task FAILURE;
/// element-level geometry failures are caught earlier and skipped, except
/// unsupported configurations which stay fatal.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Geometry error: {0}")]
    Geometry(#[from] terrabim_tin::Error),

    #[error("Model assembly failed: {0}")]
    Assembly(#[from] terrabim_core::Error),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Upstream(err.to_string())
    }
}

impl From<zip::result::ZipError> for GenerationError {
    fn from(err: zip::result::ZipError) -> Self {
        GenerationError::Upstream(format!("asset archive: {err}"))
    }
}

impl From<cacache::Error> for GenerationError {
    fn from(err: cacache::Error) -> Self {
        GenerationError::Cache(err.to_string())
    }
}

impl GenerationError {
    /// Whether an element-level failure must abort the whole job.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GenerationError::Assembly(terrabim_core::Error::UnsupportedConfiguration(_))
        )
    }
}
