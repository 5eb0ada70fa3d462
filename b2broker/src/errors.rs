use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Required B2 credentials missing from the server configuration
    #[error("B2 key configuration is incomplete: missing {}", missing.join(", "))]
    Configuration { missing: Vec<&'static str> },

    /// B2 rejected the account key pair
    #[error("B2 authentication error: {message}")]
    Authentication { message: String },

    /// An authorized upstream call (upload URL or file listing) failed
    #[error("Failed to {operation}: {message}")]
    Upstream {
        operation: &'static str,
        message: String,
    },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Error::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details.
    ///
    /// Authentication and upstream errors embed the provider's reported reason
    /// so the caller can act on it; unexpected errors keep their detail in the
    /// logs only.
    pub fn user_message(&self) -> String {
        match self {
            Error::Configuration { .. } => "B2 key configuration is incomplete on the server.".to_string(),
            Error::Authentication { message } => format!("B2 authentication error: {message}"),
            Error::Upstream { operation, message } => format!("Failed to {operation}: {message}"),
            Error::Other(_) => "Internal error while processing the request.".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Configuration { .. } | Error::Upstream { .. } => {
                tracing::error!("{}", self);
            }
            Error::Authentication { .. } => {
                tracing::warn!("{}", self);
            }
            Error::Other(_) => {
                tracing::error!("Unexpected broker error: {:#}", self);
            }
        }

        let status = self.status_code();
        let body = json!({ "error": self.user_message() });

        (status, axum::Json(body)).into_response()
    }
}

/// Convert transport-level failures (connect errors, timeouts, body decode
/// errors) into the generic internal error class.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Other(anyhow::Error::new(err))
    }
}

/// Type alias for broker operation results
pub type Result<T> = std::result::Result<T, Error>;
