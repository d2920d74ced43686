//! coldboost — hide scale-from-zero latency behind a parallel boost
//! deployment.
//!
//! When a scale target goes from zero to N replicas, a boost deployment is
//! brought up at one replica from the target's pod template with an
//! operator-supplied patch applied. It stays up until a pod of the primary
//! revision serves traffic, then is scaled back to zero. Going back to zero
//! desired replicas cancels an in-flight boost.
//!
//! # Architecture
//!
//! ```text
//! reconciler
//!   └── ColdBooster::inform(current, desired, target)
//!         ├── notify_scale_from_zero (spawned, fire-and-forget)
//!         ├── SettingsCache::get(namespace, service) → enabled + patch
//!         └── ColdBoost
//!               ├── start: reconcile "<target>-cold" to 1 replica
//!               ├── poll task: list primary pods every poll_interval
//!               └── finalize (once): reconcile to 0 replicas
//!
//! BoostMetrics (shared)
//!   ├── counters: started / ready / stopped / failures
//!   └── BoostWindow: starts in the trailing window
//! ```
//!
//! Cluster access goes through `coldboost_cluster::ClusterClient`; settings
//! come from `coldboost_settings::SettingsService`.

pub mod boost;
pub mod booster;
pub mod error;
pub mod metrics;
pub mod target;
pub mod window;

pub use boost::{BoostContext, BoostStatus, ColdBoost};
pub use booster::ColdBooster;
pub use error::{BoostError, BoostResult};
pub use metrics::{BoostMetrics, MetricsSnapshot, render_prometheus};
pub use target::BoostTarget;
pub use window::BoostWindow;
