//! Cluster client error types.

use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Failures talking to the cluster. All of them are treated as transient
/// by the boost lifecycle.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("api request failed: {0}")]
    Api(String),

    #[error("deployment already exists: {0}")]
    AlreadyExists(String),

    #[error("deployment not found: {0}")]
    NotFound(String),

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("patch failed: {0}")]
    Patch(#[from] coldboost_core::PatchError),
}
