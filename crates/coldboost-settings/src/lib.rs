//! coldboost-settings — per-service cold-start settings.
//!
//! Settings decide whether a scale-from-zero is boosted and how the boost
//! pod spec differs from the primary one. They live in a remote service and
//! are cached in process for a fixed TTL.
//!
//! # Architecture
//!
//! ```text
//! SettingsCache (TTL, one fetch per key at a time)
//!   └── SettingsService (async trait)
//!       ├── HttpSettingsClient — POST JSON over hyper
//!       └── StaticSettings     — in-process table, for tests and local runs
//! ```
//!
//! The patch document arrives as a JSON string and is parsed into typed
//! `PatchOperation`s when fetched, so a broken patch fails the fetch
//! instead of every later boost.

pub mod cache;
pub mod client;
pub mod error;
pub mod static_service;
pub mod types;

pub use cache::SettingsCache;
pub use error::{SettingsError, SettingsResult};
pub use client::HttpSettingsClient;
pub use static_service::StaticSettings;
pub use types::{ColdStartSettings, SettingsKey, SettingsResponse, SettingsService};
