//! TTL cache in front of the settings service.
//!
//! Each key owns a slot guarded by its own async mutex. The outer map lock
//! is only held to find or create a slot, so a slow fetch for one service
//! never blocks lookups for another, while concurrent lookups for the same
//! service queue on the slot and reuse the first caller's fetch.
//!
//! An expired entry is never served: if the refresh fails, the error is
//! returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use coldboost_core::BoostConfig;

use crate::error::SettingsResult;
use crate::types::{ColdStartSettings, SettingsKey, SettingsService};

struct CachedSettings {
    settings: Arc<ColdStartSettings>,
    fetched_at: Instant,
}

impl CachedSettings {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now < self.fetched_at + ttl
    }
}

type Slot = Arc<Mutex<Option<CachedSettings>>>;

pub struct SettingsCache {
    service: Arc<dyn SettingsService>,
    ttl: Duration,
    slots: RwLock<HashMap<SettingsKey, Slot>>,
}

impl SettingsCache {
    pub fn new(service: Arc<dyn SettingsService>, ttl: Duration) -> Self {
        Self {
            service,
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(service: Arc<dyn SettingsService>, config: &BoostConfig) -> Self {
        Self::new(service, config.settings_ttl_duration())
    }

    /// The backing service, for calls that bypass the cache.
    pub fn service(&self) -> &Arc<dyn SettingsService> {
        &self.service
    }

    /// Settings for a service, fetched if absent or older than the TTL.
    pub async fn get(
        &self,
        namespace: &str,
        service: &str,
    ) -> SettingsResult<Arc<ColdStartSettings>> {
        let key = SettingsKey::new(namespace, service);
        let slot = self.slot(&key).await;
        let mut entry = slot.lock().await;

        let now = Instant::now();
        if let Some(cached) = entry.as_ref().filter(|c| c.is_fresh(now, self.ttl)) {
            return Ok(cached.settings.clone());
        }

        debug!(%key, "fetching cold start settings");
        let settings = match self.service.fetch_settings(&key).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                warn!(%key, error = %e, "cold start settings fetch failed");
                return Err(e);
            }
        };
        *entry = Some(CachedSettings {
            settings: settings.clone(),
            fetched_at: now,
        });
        Ok(settings)
    }

    /// Drop the cached entry for a service; the next `get` refetches.
    pub async fn invalidate(&self, namespace: &str, service: &str) {
        let key = SettingsKey::new(namespace, service);
        if self.slots.write().await.remove(&key).is_some() {
            debug!(%key, "cold start settings invalidated");
        }
    }

    /// Number of services with a slot (fresh or not).
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn slot(&self, key: &SettingsKey) -> Slot {
        if let Some(slot) = self.slots.read().await.get(key) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }
}
