//! API error taxonomy shared by the session, workflow and history layers

use thiserror::Error;

/// Fallback message for failed sign-in style calls
pub const AUTH_FAILED: &str = "Authentication failed";

/// Fallback message for any other failed call
pub const GENERIC_FAILURE: &str = "Something went wrong";

/// Errors surfaced by every operation in this crate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Bad credentials, missing token, or an expired/invalid refresh token
    #[error("authentication error: {message}")]
    Authentication { message: String },

    /// Client-side field rule violation; never reaches the network
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// Server answered with a non-2xx status or a non-success envelope
    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Network unreachable, timeout, or an unparseable response body
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Secure store could not be read or written
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl ApiError {
    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        ApiError::Authentication {
            message: message.into(),
        }
    }

    /// Create a validation error for a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a remote error from an HTTP status and server message
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        ApiError::Remote {
            status,
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        ApiError::Transport {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        ApiError::Storage {
            message: message.into(),
        }
    }

    /// Check if this is an authentication error
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ApiError::Authentication { .. })
    }

    /// Check if this error was raised before any network I/O
    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::Validation { .. })
    }

    /// Message suitable for showing to a user.
    ///
    /// Transport and storage failures collapse to `fallback`; the detail only
    /// goes to the log.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Authentication { message }
            | ApiError::Validation { message, .. }
            | ApiError::Remote { message, .. } => message.clone(),
            ApiError::Transport { .. } | ApiError::Storage { .. } => fallback.to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::transport(err.to_string())
    }
}

impl From<crate::session::store::StoreError> for ApiError {
    fn from(err: crate::session::store::StoreError) -> Self {
        ApiError::storage(err.to_string())
    }
}
