//! API error handling for consistent JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::recorder::RecorderError;
use crate::tasks::TaskError;

/// API error type that converts to JSON responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}

impl From<RecorderError> for ApiError {
    fn from(err: RecorderError) -> Self {
        let status = match &err {
            RecorderError::AlreadyRecording(_) | RecorderError::NotRecording(_) => {
                StatusCode::CONFLICT
            }
            RecorderError::NoTargetChannel => StatusCode::UNPROCESSABLE_ENTITY,
            RecorderError::EventNotFound(_) => StatusCode::NOT_FOUND,
            RecorderError::ConnectionFailure(_) | RecorderError::Calendar(_) => {
                StatusCode::BAD_GATEWAY
            }
            RecorderError::EncoderSpawn(_)
            | RecorderError::EncoderFault(_)
            | RecorderError::EncoderTimeout(_)
            | RecorderError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        let status = match &err {
            TaskError::PortfolioNotFound(_) | TaskError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            TaskError::InvalidDeadline(_)
            | TaskError::InvalidStatus(_)
            | TaskError::InvalidPriority(_)
            | TaskError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TaskError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::GuildId;

    #[test]
    fn test_recorder_errors_map_to_status_codes() {
        let cases = [
            (RecorderError::AlreadyRecording(GuildId(1)), StatusCode::CONFLICT),
            (RecorderError::NotRecording(GuildId(1)), StatusCode::CONFLICT),
            (RecorderError::NoTargetChannel, StatusCode::UNPROCESSABLE_ENTITY),
            (
                RecorderError::ConnectionFailure("refused".into()),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_task_errors_map_to_status_codes() {
        assert_eq!(
            ApiError::from(TaskError::TaskNotFound(3)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(TaskError::InvalidDeadline("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
