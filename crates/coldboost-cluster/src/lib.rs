//! coldboost-cluster — the cluster API as seen by the boost lifecycle.
//!
//! The lifecycle needs four capabilities: get a deployment by name, create
//! one, patch one with a structural diff, and list pods by label selector.
//! They are expressed by the `ClusterClient` trait so the lifecycle can run
//! against a real API server (`KubeCluster`, feature `kube`) or against the
//! in-memory `MemoryCluster` used in tests.
//!
//! # Architecture
//!
//! ```text
//! ClusterClient (async trait)
//!   ├── MemoryCluster  — HashMap-backed, records mutations, fault injection
//!   └── KubeCluster    — kube::Api<Deployment> / kube::Api<Pod>
//! ```

pub mod client;
pub mod error;
#[cfg(feature = "kube")]
pub mod kube_client;
pub mod memory;

pub use client::{ClusterClient, LabelSelector};
pub use error::{ClusterError, ClusterResult};
#[cfg(feature = "kube")]
pub use kube_client::KubeCluster;
pub use memory::{MemoryCluster, Mutation};
