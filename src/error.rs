use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::config::Environment;

/// Request-level failures. Every variant except `Unexpected` is operational:
/// anticipated, user-facing, and safe to describe verbatim. The status code
/// is bound at construction, never at the point of dispatch.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    EmailDelivery(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::EmailDelivery(_) | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Unexpected(_))
    }

    /// Production keeps non-operational detail out of responses; development
    /// returns the full error chain.
    pub fn render(&self, env: Environment) -> (StatusCode, ErrorBody) {
        let status = self.status_code();
        let label = if status.is_client_error() { "fail" } else { "error" };
        let message = match self {
            Self::Unexpected(err) => {
                if env.is_production() {
                    "Something went wrong on our side. Please try again later.".to_string()
                } else {
                    format!("{err:#}")
                }
            }
            other => other.to_string(),
        };
        (
            status,
            ErrorBody {
                status: label,
                message,
            },
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Unexpected(err) = &self {
            error!("unhandled error: {err:#}");
        }
        let (status, body) = self.render(Environment::from_env());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_bound_at_construction() {
        assert_eq!(
            ApiError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Authentication("who".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("no".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("gone".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::EmailDelivery("smtp down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Unexpected(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn operational_errors_keep_their_message_in_production() {
        let err = ApiError::Authentication("Incorrect email or password".into());
        let (status, body) = err.render(Environment::Production);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.status, "fail");
        assert_eq!(body.message, "Incorrect email or password");
    }

    #[test]
    fn unexpected_errors_are_masked_in_production() {
        let err = ApiError::Unexpected(anyhow::anyhow!("connection refused to 10.0.0.3"));
        let (status, body) = err.render(Environment::Production);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.status, "error");
        assert!(!body.message.contains("10.0.0.3"));
    }

    #[test]
    fn unexpected_errors_are_verbose_in_development() {
        let err = ApiError::Unexpected(anyhow::anyhow!("connection refused to 10.0.0.3"));
        let (_, body) = err.render(Environment::Development);
        assert!(body.message.contains("10.0.0.3"));
    }

    #[test]
    fn only_unexpected_is_non_operational() {
        assert!(ApiError::Validation("x".into()).is_operational());
        assert!(ApiError::EmailDelivery("x".into()).is_operational());
        assert!(!ApiError::Unexpected(anyhow::anyhow!("x")).is_operational());
    }

    #[test]
    fn client_errors_are_fail_server_errors_are_error() {
        let (_, body) = ApiError::NotFound("x".into()).render(Environment::Development);
        assert_eq!(body.status, "fail");
        let (_, body) = ApiError::EmailDelivery("x".into()).render(Environment::Development);
        assert_eq!(body.status, "error");
    }
}
