//! Error types for the LaTeX server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use latex_engine::{CompileFailure, Diagnostic, FailureKind};
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// A compilation request that ended in a classified failure
    #[error("{}", .0.message)]
    Compile(CompileFailure),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    #[serde(rename = "errorKind")]
    error_kind: FailureKind,
    error: String,
    diagnostics: Vec<Diagnostic>,
}

/// HTTP status for each failure kind
pub fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::TemplateNotFound => StatusCode::NOT_FOUND,
        FailureKind::InvalidBinding => StatusCode::BAD_REQUEST,
        FailureKind::CompilationFailed => StatusCode::UNPROCESSABLE_ENTITY,
        FailureKind::CompilationTimeout => StatusCode::REQUEST_TIMEOUT,
        FailureKind::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::CompilerNotFound | FailureKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ServerError::Compile(failure) => (
                status_for(failure.kind),
                ErrorResponse {
                    success: false,
                    error_kind: failure.kind,
                    error: failure.message,
                    diagnostics: failure.diagnostics,
                },
            ),
            ServerError::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    success: false,
                    error_kind: FailureKind::InvalidBinding,
                    error: msg,
                    diagnostics: Vec::new(),
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<CompileFailure> for ServerError {
    fn from(failure: CompileFailure) -> Self {
        ServerError::Compile(failure)
    }
}
