use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

/// Application-level errors surfaced by the HTTP host
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// First schema violation found in an instance configuration
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{path}: {message}")]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `search.genres[1]`
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

/// Failure of a single call against the upstream catalog API
#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl UpstreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UpstreamError::Cancelled)
    }
}

/// The upstream response parsed but did not have the expected shape
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AggregationError {
    #[error("Release listing contains no days")]
    MissingDay,
}

/// Everything that can fail inside one poll cycle
#[derive(thiserror::Error, Debug)]
pub enum PollError {
    #[error("Loading provider list failed ({0})")]
    Providers(#[source] UpstreamError),

    #[error("Loading release list failed ({0})")]
    Releases(#[source] UpstreamError),

    #[error("Processing release list failed ({0})")]
    Aggregation(#[from] AggregationError),
}

impl PollError {
    /// True when the cycle was aborted by teardown rather than by a failure
    pub fn is_cancelled(&self) -> bool {
        match self {
            PollError::Providers(e) | PollError::Releases(e) => e.is_cancelled(),
            PollError::Aggregation(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_error_messages_name_the_failing_call() {
        let err = PollError::Providers(UpstreamError::Decode("expected array".to_string()));
        assert_eq!(
            err.to_string(),
            "Loading provider list failed (Unexpected response body: expected array)"
        );

        let err = PollError::Releases(UpstreamError::Status {
            status: reqwest::StatusCode::BAD_GATEWAY,
            body: "upstream down".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Loading release list failed (API returned status 502 Bad Gateway: upstream down)"
        );
    }

    #[test]
    fn test_cancelled_detection() {
        assert!(PollError::Releases(UpstreamError::Cancelled).is_cancelled());
        assert!(!PollError::Aggregation(AggregationError::MissingDay).is_cancelled());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("search.genres[0]", "unknown variant `xyz`");
        assert_eq!(err.to_string(), "search.genres[0]: unknown variant `xyz`");

        let app: AppError = err.into();
        assert!(matches!(app, AppError::InvalidInput(msg) if msg.starts_with("search.genres[0]")));
    }

    #[test]
    fn test_app_error_status_codes() {
        let response = AppError::NotFound("instance x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = AppError::InvalidInput("bad".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
