//! coldboost.toml configuration.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```toml
//! settings_url = "http://cold-start-settings.platform:8000"
//! settings_ttl = "5m"
//! poll_interval = "2s"
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

const DEFAULT_SETTINGS_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SETTINGS_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_BOOST_WINDOW: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostConfig {
    /// Base URL of the cold-start settings service.
    pub settings_url: String,
    /// Per-request timeout for the settings service.
    pub settings_timeout: String,
    /// How long fetched settings stay valid.
    pub settings_ttl: String,
    /// Readiness poll interval of a running boost.
    pub poll_interval: String,
    /// Trailing window over which boost starts are counted.
    pub boost_window: String,
    /// Soft cap on entries kept in the boost window.
    pub boost_window_capacity: usize,
    /// Pod label carrying the revision identity.
    pub revision_label: String,
    /// Label carrying the owning service name.
    pub service_label: String,
    /// Marker label present on boost deployments and their pods.
    pub cold_label: String,
    /// Suffix appended to the target name to name the boost deployment.
    pub name_suffix: String,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            settings_url: "http://localhost:8000".to_string(),
            settings_timeout: "10s".to_string(),
            settings_ttl: "5m".to_string(),
            poll_interval: "2s".to_string(),
            boost_window: "10m".to_string(),
            boost_window_capacity: 600,
            revision_label: "serving.knative.dev/revision".to_string(),
            service_label: "serving.knative.dev/service".to_string(),
            cold_label: "cold".to_string(),
            name_suffix: "-cold".to_string(),
        }
    }
}

impl BoostConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: BoostConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject unparsable durations and empty label keys.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (field, value) in [
            ("settings_timeout", &self.settings_timeout),
            ("settings_ttl", &self.settings_ttl),
            ("poll_interval", &self.poll_interval),
            ("boost_window", &self.boost_window),
        ] {
            match parse_duration(value) {
                Some(d) if !d.is_zero() => {}
                _ => anyhow::bail!("{field}: invalid duration {value:?}"),
            }
        }
        for (field, value) in [
            ("revision_label", &self.revision_label),
            ("service_label", &self.service_label),
            ("cold_label", &self.cold_label),
            ("name_suffix", &self.name_suffix),
        ] {
            if value.is_empty() {
                anyhow::bail!("{field} must not be empty");
            }
        }
        if self.boost_window_capacity == 0 {
            anyhow::bail!("boost_window_capacity must be positive");
        }
        Ok(())
    }

    pub fn settings_timeout_duration(&self) -> Duration {
        parse_duration(&self.settings_timeout).unwrap_or(DEFAULT_SETTINGS_TIMEOUT)
    }

    pub fn settings_ttl_duration(&self) -> Duration {
        parse_duration(&self.settings_ttl).unwrap_or(DEFAULT_SETTINGS_TTL)
    }

    pub fn poll_interval_duration(&self) -> Duration {
        parse_duration(&self.poll_interval).unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn boost_window_duration(&self) -> Duration {
        parse_duration(&self.boost_window).unwrap_or(DEFAULT_BOOST_WINDOW)
    }
}

/// Parse a duration string like "500ms", "2s", "5m", "1h". A bare number
/// is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
