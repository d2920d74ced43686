//! One boost episode.
//!
//! A `ColdBoost` scales the boost deployment to one replica, then polls the
//! primary revision's pods in a background task until one of them serves
//! traffic. Readiness and an explicit stop race to end the boost; both go
//! through `finalize`, which a compare-and-swap on the status lets run
//! exactly once. The winner scales the boost deployment back to zero.
//!
//! ```text
//!            start()                    poll tick sees a serving pod
//!   ──────────────────▶ Running ───────────────────────┐
//!                         │  stop() / end()             ▼
//!                         └──────────────────────▶ Stopping ──▶ Done
//!                                                 (scale to 0)
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use coldboost_cluster::{ClusterClient, ClusterError, ClusterResult};
use coldboost_core::{BoostConfig, Deployment, PatchOperation, Pod, diff};
use coldboost_settings::ColdStartSettings;

use crate::error::BoostResult;
use crate::metrics::BoostMetrics;
use crate::target::BoostTarget;

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const DONE: u8 = 2;

/// Collaborators shared by every boost of a process.
#[derive(Clone)]
pub struct BoostContext {
    pub cluster: Arc<dyn ClusterClient>,
    pub config: Arc<BoostConfig>,
    pub metrics: Arc<BoostMetrics>,
}

impl BoostContext {
    pub fn new(cluster: Arc<dyn ClusterClient>, config: BoostConfig) -> Self {
        let metrics = Arc::new(BoostMetrics::from_config(&config));
        Self {
            cluster,
            config: Arc::new(config),
            metrics,
        }
    }
}

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostStatus {
    /// Boost deployment up, waiting for the primary.
    Running,
    /// Stop requested or scale-down in progress.
    Stopping,
    Done,
}

#[derive(Debug, Clone, Copy)]
enum EndReason {
    Ready,
    Stopped,
}

struct Shared {
    target: BoostTarget,
    settings: Arc<ColdStartSettings>,
    ctx: BoostContext,
    status: AtomicU8,
    stop_tx: watch::Sender<bool>,
    done_tx: watch::Sender<bool>,
    last_error: Mutex<Option<String>>,
}

pub struct ColdBoost {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ColdBoost {
    /// Scale the boost deployment to one replica and start polling.
    ///
    /// The caller has checked that `settings` is enabled. A patch that does
    /// not apply to the target's pod spec is returned before anything
    /// touches the cluster. Cluster failures are logged and counted; the
    /// boost runs regardless.
    pub async fn start(
        target: BoostTarget,
        settings: Arc<ColdStartSettings>,
        ctx: BoostContext,
    ) -> BoostResult<Self> {
        let desired = target.boost_deployment(&settings, 1, &ctx.config)?;

        info!(
            namespace = %target.namespace,
            service = %target.service,
            deployment = %desired.metadata.name,
            revision = %target.revision,
            "starting cold boost"
        );
        ctx.metrics.record_start();
        if let Err(e) = reconcile(ctx.cluster.as_ref(), &desired).await {
            warn!(
                deployment = %desired.metadata.name,
                error = %e,
                "failed to scale boost deployment up"
            );
            ctx.metrics.record_reconcile_failure();
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            target,
            settings,
            ctx,
            status: AtomicU8::new(RUNNING),
            stop_tx,
            done_tx,
            last_error: Mutex::new(None),
        });

        let task = tokio::spawn(run_poll_loop(shared.clone(), stop_rx));
        Ok(Self {
            shared,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn target(&self) -> &BoostTarget {
        &self.shared.target
    }

    pub fn settings(&self) -> &Arc<ColdStartSettings> {
        &self.shared.settings
    }

    pub fn status(&self) -> BoostStatus {
        match self.shared.status.load(Ordering::Acquire) {
            DONE => BoostStatus::Done,
            STOPPING => BoostStatus::Stopping,
            _ if *self.shared.stop_tx.borrow() => BoostStatus::Stopping,
            _ => BoostStatus::Running,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status() == BoostStatus::Done
    }

    /// Stop requested but the scale-down has not completed yet.
    pub fn is_stopping(&self) -> bool {
        self.status() == BoostStatus::Stopping
    }

    /// Ask the boost to end. Never blocks; the background task does the
    /// scale-down. A no-op once the boost is done.
    pub fn stop(&self) {
        if self.shared.status.load(Ordering::Acquire) == DONE {
            return;
        }
        self.shared.stop_tx.send_replace(true);
    }

    /// End the boost from the caller's task. Returns `false` if another
    /// caller (or the poll loop) got there first.
    pub async fn end(&self) -> bool {
        self.shared.finalize(EndReason::Stopped).await
    }

    /// Wait until the boost is done and its poll task has exited.
    pub async fn wait(&self) {
        let mut done = self.shared.done_tx.subscribe();
        // The sender lives in `shared`, which we hold.
        let _ = done.wait_for(|d| *d).await;

        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(
                    boost = %self.shared.target.key(),
                    error = %e,
                    "cold boost poll task failed"
                );
            }
        }
    }

    /// Why the last scale-down failed, if it did.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.last_error).clone()
    }
}

impl Shared {
    /// Scale the boost deployment to zero, once.
    async fn finalize(&self, reason: EndReason) -> bool {
        if self
            .status
            .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // Wake the poll loop if it is still sleeping.
        self.stop_tx.send_replace(true);

        let config = &self.ctx.config;
        let name = self.target.boost_name(config);
        info!(
            namespace = %self.target.namespace,
            service = %self.target.service,
            deployment = %name,
            ?reason,
            "ending cold boost"
        );

        let result = match self.target.boost_deployment(&self.settings, 0, config) {
            Ok(desired) => reconcile(self.ctx.cluster.as_ref(), &desired)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = result {
            error!(
                namespace = %self.target.namespace,
                deployment = %name,
                error = %e,
                "failed to scale boost deployment to zero"
            );
            self.ctx.metrics.record_scale_down_failure();
            *lock(&self.last_error) = Some(e);
        }

        match reason {
            EndReason::Ready => self.ctx.metrics.record_ready(),
            EndReason::Stopped => self.ctx.metrics.record_stopped(),
        }
        self.status.store(DONE, Ordering::Release);
        self.done_tx.send_replace(true);
        true
    }
}

async fn run_poll_loop(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let config = &shared.ctx.config;
    let selector = shared.target.readiness_selector(config);
    let interval = config.poll_interval_duration();
    let namespace = &shared.target.namespace;

    debug!(%namespace, %selector, "cold boost poll loop starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match shared.ctx.cluster.list_pods(namespace, &selector).await {
                    Ok(pods) => {
                        debug!(%namespace, %selector, pods = pods.len(), "cold boost poll");
                        if pods.iter().any(Pod::is_serving) {
                            info!(
                                %namespace,
                                revision = %shared.target.revision,
                                "primary revision ready"
                            );
                            shared.finalize(EndReason::Ready).await;
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(%namespace, %selector, error = %e, "failed to list primary pods");
                        shared.ctx.metrics.record_poll_failure();
                    }
                }
            }
            _ = stop.changed() => {
                shared.finalize(EndReason::Stopped).await;
                break;
            }
        }
    }

    debug!(%namespace, revision = %shared.target.revision, "cold boost poll loop exited");
}

/// Converge the cluster on `desired`: create it if missing, otherwise patch
/// the fields that differ. No-op when nothing differs.
async fn reconcile(cluster: &dyn ClusterClient, desired: &Deployment) -> ClusterResult<()> {
    let meta = &desired.metadata;
    let client = cluster.name();
    let Some(current) = cluster.get_deployment(&meta.namespace, &meta.name).await? else {
        cluster.create_deployment(desired).await?;
        debug!(
            client,
            deployment = %desired.key(),
            replicas = ?desired.spec.replicas,
            "created boost deployment"
        );
        return Ok(());
    };

    let ops = update_ops(&current, desired)?;
    if ops.is_empty() {
        debug!(client, deployment = %desired.key(), "boost deployment up to date");
        return Ok(());
    }
    cluster.patch_deployment(&meta.namespace, &meta.name, &ops).await?;
    debug!(client, deployment = %desired.key(), ops = ops.len(), "patched boost deployment");
    Ok(())
}

/// Operations taking `current`'s spec and labels to `desired`'s.
fn update_ops(current: &Deployment, desired: &Deployment) -> ClusterResult<Vec<PatchOperation>> {
    let mut ops: Vec<PatchOperation> = diff(&to_json(&current.spec)?, &to_json(&desired.spec)?)
        .into_iter()
        .map(|op| prefixed("/spec", op))
        .collect();

    let (from, to) = (&current.metadata.labels, &desired.metadata.labels);
    if from.is_empty() {
        // An empty label map is not serialized, so there is no object to
        // diff into.
        if !to.is_empty() {
            ops.push(PatchOperation::Add {
                path: "/metadata/labels".to_string(),
                value: to_json(to)?,
            });
        }
    } else {
        ops.extend(
            diff(&to_json(from)?, &to_json(to)?)
                .into_iter()
                .map(|op| prefixed("/metadata/labels", op)),
        );
    }
    Ok(ops)
}

fn to_json<T: Serialize>(value: &T) -> ClusterResult<Value> {
    serde_json::to_value(value).map_err(|e| ClusterError::Invalid(e.to_string()))
}

fn prefixed(prefix: &str, op: PatchOperation) -> PatchOperation {
    let at = |path: String| format!("{prefix}{path}");
    match op {
        PatchOperation::Add { path, value } => PatchOperation::Add { path: at(path), value },
        PatchOperation::Remove { path } => PatchOperation::Remove { path: at(path) },
        PatchOperation::Replace { path, value } => PatchOperation::Replace {
            path: at(path),
            value,
        },
        PatchOperation::Move { from, path } => PatchOperation::Move {
            from: at(from),
            path: at(path),
        },
        PatchOperation::Copy { from, path } => PatchOperation::Copy {
            from: at(from),
            path: at(path),
        },
        PatchOperation::Test { path, value } => PatchOperation::Test { path: at(path), value },
    }
}
