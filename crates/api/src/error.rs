use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use vidgen_core::error::CoreError;
use vidgen_pipeline::{ErrorKind, GenerationFailed};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors, [`GenerationFailed`] for pipeline
/// failures, and adds HTTP-specific variants. Every variant renders as
/// `{"error": msg, "code": CODE}`; generation failures also carry
/// `"stage"` and `"kind"`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Generation(#[from] GenerationFailed),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Generation(failed) => return generation_response(failed),
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// HTTP status for a generation failure class.
///
/// Template problems are our own misconfiguration (500); anything the
/// engine did wrong is a bad gateway; a missed completion deadline is a
/// gateway timeout; shutdown cancellation is 503.
pub fn generation_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Template => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::CompletionTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Transport
        | ErrorKind::RejectedByEngine
        | ErrorKind::JobFailed
        | ErrorKind::NoOutputProduced
        | ErrorKind::ChannelLost
        | ErrorKind::ArtifactFetch
        | ErrorKind::Probe => StatusCode::BAD_GATEWAY,
    }
}

fn generation_response(failed: &GenerationFailed) -> Response {
    let kind = failed.kind();
    let status = generation_status(kind);

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(stage = %failed.stage, error = %failed, "Generation misconfigured");
        "Generation is misconfigured on the server".to_string()
    } else {
        tracing::warn!(stage = %failed.stage, kind = kind.as_str(), error = %failed, "Generation failed");
        failed.to_string()
    };

    let body = json!({
        "error": message,
        "code": "GENERATION_FAILED",
        "stage": failed.stage.as_str(),
        "kind": kind.as_str(),
    });

    (status, axum::Json(body)).into_response()
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique violation.
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
