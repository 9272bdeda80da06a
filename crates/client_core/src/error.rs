use shared::error::ApiError;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Configuration(String),
    #[error("authentication error: {0}")]
    Authentication(#[from] AuthError),
    #[error("request failed with status {}: {}", .0.status, .0.message)]
    Transport(#[from] ApiError),
    #[error("could not reach the presentation service: {0}")]
    Connection(String),
    #[error("unexpected response from the presentation service: {0}")]
    UnexpectedResponse(String),
    #[error("malformed handoff state: {0}")]
    MalformedHandoff(String),
    #[error("{0}")]
    Validation(String),
    #[error("handoff storage failed: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn missing_api_url() -> Self {
        Self::Configuration("API URL is not configured.".to_string())
    }

    pub fn malformed(detail: impl std::fmt::Display) -> Self {
        Self::MalformedHandoff(detail.to_string())
    }

    /// True when the user has to sign in again before retrying.
    pub fn requires_reauth(&self) -> bool {
        match self {
            Self::Authentication(_) => true,
            Self::Transport(api) => api.is_auth_failure(),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(api) => Some(api.status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for WorkflowError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Transport(ApiError::new(status.as_u16(), err.to_string())),
            None if err.is_decode() => Self::UnexpectedResponse(err.to_string()),
            None => Self::Connection(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for WorkflowError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}
