//! Boost error types.

use thiserror::Error;

use coldboost_core::PatchError;
use coldboost_settings::SettingsError;

pub type BoostResult<T> = Result<T, BoostError>;

/// Errors `ColdBooster::inform` reports to the reconciler.
///
/// Cluster failures are not in here: they are logged and counted, and the
/// boost carries on.
#[derive(Debug, Error)]
pub enum BoostError {
    #[error("cold start settings unavailable: {0}")]
    Settings(#[from] SettingsError),

    #[error("cold start patch rejected: {0}")]
    Patch(#[from] PatchError),

    #[error("invalid scale target: {0}")]
    Target(String),
}
