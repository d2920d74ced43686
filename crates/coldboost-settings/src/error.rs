//! Settings error types.

use thiserror::Error;

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Failures fetching or decoding cold-start settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings url: {0}")]
    InvalidUrl(String),

    #[error("settings request failed: {0}")]
    Transport(String),

    #[error("settings request timed out: {0}")]
    Timeout(String),

    #[error("settings service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode settings request: {0}")]
    Encode(String),

    #[error("failed to decode settings response: {0}")]
    Decode(String),

    #[error("invalid pod spec patch: {0}")]
    InvalidPatch(String),
}
