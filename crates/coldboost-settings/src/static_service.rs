//! In-process `SettingsService`.
//!
//! Serves settings from a table keyed by service, with a fallback for
//! unknown services. Counts calls and can be told to fail or to delay
//! fetches, which makes it the test double for the rest of the workspace.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use coldboost_core::ScaleTarget;

use crate::error::{SettingsError, SettingsResult};
use crate::types::{ColdStartSettings, SettingsKey, SettingsService};

#[derive(Default)]
pub struct StaticSettings {
    table: Mutex<HashMap<SettingsKey, ColdStartSettings>>,
    fallback: Mutex<ColdStartSettings>,
    fetch_delay: Mutex<Option<Duration>>,
    fail_fetches: AtomicBool,
    fail_notifies: AtomicBool,
    fetches: AtomicUsize,
    notifies: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StaticSettings {
    /// Every service gets `settings`.
    pub fn new(settings: ColdStartSettings) -> Self {
        Self {
            fallback: Mutex::new(settings),
            ..Default::default()
        }
    }

    /// Override the settings of one service.
    pub fn set(&self, key: SettingsKey, settings: ColdStartSettings) {
        lock(&self.table).insert(key, settings);
    }

    /// Sleep this long inside every fetch.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *lock(&self.fetch_delay) = delay;
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_notifies(&self, fail: bool) {
        self.fail_notifies.store(fail, Ordering::SeqCst);
    }

    /// Number of `fetch_settings` calls, including failed ones.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn notify_count(&self) -> usize {
        self.notifies.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsService for StaticSettings {
    async fn fetch_settings(&self, key: &SettingsKey) -> SettingsResult<ColdStartSettings> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.fetch_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(SettingsError::Transport(format!("{key}: injected failure")));
        }
        let settings = lock(&self.table).get(key).cloned();
        Ok(settings.unwrap_or_else(|| lock(&self.fallback).clone()))
    }

    async fn notify_scale_from_zero(&self, target: &ScaleTarget) -> SettingsResult<()> {
        self.notifies.fetch_add(1, Ordering::SeqCst);
        if self.fail_notifies.load(Ordering::SeqCst) {
            return Err(SettingsError::Transport(format!(
                "notify {}: injected failure",
                target.key()
            )));
        }
        Ok(())
    }
}
