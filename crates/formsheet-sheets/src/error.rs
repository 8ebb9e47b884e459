//! Sheets Error Types
//!
//! Typed failures for the credential flow and the Sheets API. Callers map
//! these to transport-level responses; nothing here knows about HTTP status
//! codes of the intake server.

use thiserror::Error;

/// Errors raised while authenticating or appending rows.
#[derive(Debug, Error)]
pub enum SheetsError {
    /// Key file missing, unreadable, or not a usable service-account key
    #[error("credential source unusable: {0}")]
    Credentials(String),

    /// Token endpoint refused the signed assertion
    #[error("token exchange rejected: {0}")]
    TokenExchange(String),

    /// Request never produced a response
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited by Google API")]
    RateLimited,

    /// Google API error envelope (or bare status when the body had none)
    #[error("Google API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body was not the JSON we expected
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl SheetsError {
    /// True for failures in obtaining credentials, as opposed to failures
    /// writing to the sheet.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Credentials(_) | Self::TokenExchange(_))
    }

    pub(crate) fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials(message.into())
    }
}

/// Result alias for the adapter.
pub type SheetsResult<T> = Result<T, SheetsError>;
