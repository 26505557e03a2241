//! Error handling for the API server.
//!
//! Unlike the teacher's own `{error, message, details}` shape, the
//! envelope here is `{code, message, success: false, data: null}` —
//! mirrors `controllers.respError`'s `ResponseData`, including `code`
//! being the stringified HTTP status rather than a short error slug.
//! Successful responses are never wrapped: a handler's `Ok(Json(v))`
//! serializes `v` directly, exactly as `controllers.respOK` does.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use taskd_worker::error::SchedulerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ResponseData {
    code: String,
    message: String,
    success: bool,
    data: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => {
                tracing::error!(%msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        let body = ResponseData { code: status.as_u16().to_string(), message, success: false, data: None };
        (status, Json(body)).into_response()
    }
}

/// Maps the scheduler's own error taxonomy onto HTTP status the way
/// spec.md's route table dictates, not a blanket 500 — unlike
/// `original_source`'s uniform `respError(c, http.StatusInternalServerError, err)`
/// from `dao`, this distinguishes not-found from any other failure (see
/// `DESIGN.md`, Open Question 1).
impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::TemplateNotFound(_) | SchedulerError::PoolNotFound(_) | SchedulerError::TaskNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            SchedulerError::EmptyTemplate => ApiError::BadRequest(err.to_string()),
            SchedulerError::TaskAlreadyExists(_) => ApiError::BadRequest(err.to_string()),
            SchedulerError::NoPoolAvailable(_) => ApiError::BadRequest(err.to_string()),
            SchedulerError::PoolSaturated => ApiError::ServiceUnavailable(err.to_string()),
            SchedulerError::PoolBusy(..) => ApiError::Conflict(err.to_string()),
            SchedulerError::UnknownEngine(_) | SchedulerError::Template(_) | SchedulerError::Job(_) | SchedulerError::Pool(_) => {
                ApiError::BadRequest(err.to_string())
            }
            SchedulerError::Index(_) | SchedulerError::Db(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.constraint().is_some() {
                    ApiError::Conflict(db_err.to_string())
                } else {
                    ApiError::Internal(db_err.to_string())
                }
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let resp = ApiError::NotFound("task [x] not found".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn pool_saturated_maps_to_503() {
        let err: ApiError = SchedulerError::PoolSaturated.into();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
