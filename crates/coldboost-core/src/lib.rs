//! coldboost-core — shared types for the scale-from-zero boost subsystem.
//!
//! - `types`: the slice of the cluster object model the boost lifecycle
//!   reads and writes (deployments, pod templates, pods).
//! - `patch`: RFC 6902 operations applied to pod templates, plus the
//!   structural diff used for diff-based deployment updates.
//! - `config`: `BoostConfig`, loaded from TOML.

pub mod config;
pub mod patch;
pub mod types;

pub use config::{BoostConfig, parse_duration};
pub use patch::{PatchError, PatchOperation, apply_patch, diff, patch_template};
pub use types::*;
