//! Error type for API client operations

use thiserror::Error;

/// Error type for API client operations
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success response outside the auth endpoints
    #[error("HTTP {status}: {detail}")]
    Api { status: u16, detail: String },

    /// Login or registration rejected; the message is shown to the user as is
    #[error("{0}")]
    Auth(String),

    #[error(transparent)]
    Core(#[from] chatbot_core::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<ClientError> for chatbot_core::Error {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Core(inner) => inner,
            ClientError::Auth(detail) => chatbot_core::Error::Unauthorized(detail),
            ClientError::Api { status: 401, detail } => chatbot_core::Error::Unauthorized(detail),
            other => chatbot_core::Error::Transport(other.to_string()),
        }
    }
}
