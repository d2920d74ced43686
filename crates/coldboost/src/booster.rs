//! Per-service boost coordinator.
//!
//! The reconciler calls `inform` with every replica transition of a scale
//! target. `ColdBooster` decides whether a boost should start or stop and
//! keeps at most one live boost at a time.

use std::sync::Arc;

use tracing::{debug, info, warn};

use coldboost_core::ScaleTarget;
use coldboost_settings::SettingsCache;

use crate::boost::{BoostContext, BoostStatus, ColdBoost};
use crate::error::BoostResult;
use crate::target::{BoostTarget, settings_key};

/// One per scale target. `inform` takes `&mut self`, so calls for a
/// service are serialized by whoever owns the booster.
pub struct ColdBooster {
    ctx: BoostContext,
    settings: Arc<SettingsCache>,
    current: Option<ColdBoost>,
}

impl ColdBooster {
    pub fn new(ctx: BoostContext, settings: Arc<SettingsCache>) -> Self {
        Self {
            ctx,
            settings,
            current: None,
        }
    }

    /// The most recent boost, which may already be done.
    pub fn current(&self) -> Option<&ColdBoost> {
        self.current.as_ref()
    }

    /// React to the target moving from `current` to `desired` replicas.
    ///
    /// Only a settings fetch failure, and on a scale from zero an unusable
    /// target or a patch that does not apply, are reported. Cluster
    /// failures are absorbed by the boost itself.
    pub async fn inform(
        &mut self,
        current: i32,
        desired: i32,
        target: &ScaleTarget,
    ) -> BoostResult<()> {
        if current == desired {
            return Ok(());
        }

        let from_zero = current == 0 && desired > 0;
        if from_zero {
            self.notify_scale_from_zero(target);
        }

        let key = settings_key(target, &self.ctx.config);
        let settings = self.settings.get(&key.namespace, &key.service).await?;
        if !settings.enabled {
            debug!(%key, "cold boost disabled");
            return Ok(());
        }

        if from_zero {
            if let Some(boost) = &self.current {
                match boost.status() {
                    BoostStatus::Running => {
                        debug!(scale_target = %target.key(), "cold boost already running");
                        return Ok(());
                    }
                    BoostStatus::Stopping => {
                        debug!(
                            scale_target = %target.key(),
                            "waiting for previous cold boost to finish"
                        );
                        boost.wait().await;
                    }
                    BoostStatus::Done => {}
                }
            }
            let snapshot = BoostTarget::from_scale_target(target, &self.ctx.config)?;
            self.current = Some(ColdBoost::start(snapshot, settings, self.ctx.clone()).await?);
        } else if desired == 0 {
            if let Some(boost) = &self.current {
                info!(scale_target = %target.key(), "scale to zero, stopping cold boost");
                boost.stop();
            }
        }
        Ok(())
    }

    /// Stop the current boost and wait for it to finish.
    pub async fn shutdown(&mut self) {
        if let Some(boost) = self.current.take() {
            boost.end().await;
            boost.wait().await;
        }
    }

    fn notify_scale_from_zero(&self, target: &ScaleTarget) {
        let service = self.settings.service().clone();
        let target = target.clone();
        tokio::spawn(async move {
            if let Err(e) = service.notify_scale_from_zero(&target).await {
                warn!(
                    scale_target = %target.key(),
                    error = %e,
                    "scale from zero notification failed"
                );
            }
        });
    }
}
