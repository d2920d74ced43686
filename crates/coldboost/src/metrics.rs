//! Boost metrics — counters for boost outcomes plus the recent-start window.
//!
//! Counters are lock-free atomics; the window sits behind a mutex since
//! it is only touched once per boost start and on scrape.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use coldboost_core::BoostConfig;

use crate::window::BoostWindow;

/// Shared across every booster of a process.
#[derive(Debug)]
pub struct BoostMetrics {
    boosts_started: AtomicU64,
    boosts_ready: AtomicU64,
    boosts_stopped: AtomicU64,
    reconcile_failures: AtomicU64,
    scale_down_failures: AtomicU64,
    poll_failures: AtomicU64,
    window: Mutex<BoostWindow>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub boosts_started: u64,
    pub boosts_ready: u64,
    pub boosts_stopped: u64,
    pub reconcile_failures: u64,
    pub scale_down_failures: u64,
    pub poll_failures: u64,
    /// Boost starts inside the trailing window.
    pub recent_boosts: u64,
}

impl BoostMetrics {
    pub fn new(window: BoostWindow) -> Self {
        Self {
            boosts_started: AtomicU64::new(0),
            boosts_ready: AtomicU64::new(0),
            boosts_stopped: AtomicU64::new(0),
            reconcile_failures: AtomicU64::new(0),
            scale_down_failures: AtomicU64::new(0),
            poll_failures: AtomicU64::new(0),
            window: Mutex::new(window),
        }
    }

    pub fn from_config(config: &BoostConfig) -> Self {
        Self::new(BoostWindow::new(
            config.boost_window_duration(),
            config.boost_window_capacity,
        ))
    }

    fn window(&self) -> MutexGuard<'_, BoostWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record_start(&self) {
        self.boosts_started.fetch_add(1, Ordering::Relaxed);
        self.window().record(Instant::now());
    }

    pub(crate) fn record_ready(&self) {
        self.boosts_ready.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stopped(&self) {
        self.boosts_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconcile_failure(&self) {
        self.reconcile_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scale_down_failure(&self) {
        self.scale_down_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_poll_failure(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Boost starts inside the trailing window.
    pub fn recent_boosts(&self) -> usize {
        self.window().count(Instant::now())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            boosts_started: self.boosts_started.load(Ordering::Relaxed),
            boosts_ready: self.boosts_ready.load(Ordering::Relaxed),
            boosts_stopped: self.boosts_stopped.load(Ordering::Relaxed),
            reconcile_failures: self.reconcile_failures.load(Ordering::Relaxed),
            scale_down_failures: self.scale_down_failures.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            recent_boosts: self.recent_boosts() as u64,
        }
    }
}

impl Default for BoostMetrics {
    fn default() -> Self {
        Self::new(BoostWindow::default())
    }
}

/// Render a snapshot in the Prometheus text exposition format.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let series: [(&str, &str, &str, u64); 7] = [
        (
            "coldboost_boosts_started_total",
            "counter",
            "Boosts started.",
            snapshot.boosts_started,
        ),
        (
            "coldboost_boosts_ready_total",
            "counter",
            "Boosts ended by primary readiness.",
            snapshot.boosts_ready,
        ),
        (
            "coldboost_boosts_stopped_total",
            "counter",
            "Boosts ended by an explicit stop.",
            snapshot.boosts_stopped,
        ),
        (
            "coldboost_reconcile_failures_total",
            "counter",
            "Failed boost deployment reconciliations.",
            snapshot.reconcile_failures,
        ),
        (
            "coldboost_scale_down_failures_total",
            "counter",
            "Boost deployments left running after a failed scale to zero.",
            snapshot.scale_down_failures,
        ),
        (
            "coldboost_poll_failures_total",
            "counter",
            "Failed primary pod listings.",
            snapshot.poll_failures,
        ),
        (
            "coldboost_recent_boosts",
            "gauge",
            "Boosts started inside the trailing window.",
            snapshot.recent_boosts,
        ),
    ];

    let mut out = String::new();
    for (name, kind, help, value) in series {
        out.push_str(&format!("# HELP {name} {help}\n"));
        out.push_str(&format!("# TYPE {name} {kind}\n"));
        out.push_str(&format!("{name} {value}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn counters_and_window() {
        let metrics = BoostMetrics::new(BoostWindow::new(Duration::from_secs(60), 10));
        metrics.record_start();
        metrics.record_start();
        metrics.record_ready();
        metrics.record_scale_down_failure();

        let snap = metrics.snapshot();
        assert_eq!(snap.boosts_started, 2);
        assert_eq!(snap.boosts_ready, 1);
        assert_eq!(snap.scale_down_failures, 1);
        assert_eq!(snap.recent_boosts, 2);

        tokio::time::advance(Duration::from_secs(60)).await;
        let snap = metrics.snapshot();
        assert_eq!(snap.boosts_started, 2);
        assert_eq!(snap.recent_boosts, 0);
    }

    #[test]
    fn from_config_uses_window_settings() {
        let config = BoostConfig {
            boost_window: "30s".to_string(),
            boost_window_capacity: 5,
            ..Default::default()
        };
        let metrics = BoostMetrics::from_config(&config);
        let window = metrics.window();
        assert_eq!(window.duration(), Duration::from_secs(30));
        assert_eq!(window.capacity(), 5);
    }

    #[test]
    fn prometheus_format() {
        let snap = MetricsSnapshot {
            boosts_started: 3,
            poll_failures: 7,
            recent_boosts: 1,
            ..Default::default()
        };
        let output = render_prometheus(&snap);

        assert!(output.contains("# TYPE coldboost_boosts_started_total counter"));
        assert!(output.contains("coldboost_boosts_started_total 3\n"));
        assert!(output.contains("coldboost_poll_failures_total 7\n"));
        assert!(output.contains("coldboost_boosts_ready_total 0\n"));
        assert!(output.contains("# TYPE coldboost_recent_boosts gauge"));
        assert!(output.contains("coldboost_recent_boosts 1\n"));
    }
}
