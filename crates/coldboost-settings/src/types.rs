//! Settings types and the `SettingsService` trait.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use coldboost_core::{PatchOperation, ScaleTarget};

use crate::error::{SettingsError, SettingsResult};

/// Cache and lookup key. Settings are per service: every revision of a
/// service shares one patch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettingsKey {
    pub namespace: String,
    pub service: String,
}

impl SettingsKey {
    pub fn new(namespace: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for SettingsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.service)
    }
}

/// Cold-start settings for one service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColdStartSettings {
    /// Whether scale-from-zero should be boosted at all.
    pub enabled: bool,
    /// Operations turning the primary pod spec into the boost pod spec.
    pub patch: Vec<PatchOperation>,
}

impl ColdStartSettings {
    pub fn enabled(patch: Vec<PatchOperation>) -> Self {
        Self {
            enabled: true,
            patch,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

/// Wire format of the settings endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub enabled: bool,
    /// RFC 6902 patch document, JSON-encoded as a string.
    #[serde(default)]
    pub pod_spec_json_patch: Option<String>,
}

impl TryFrom<SettingsResponse> for ColdStartSettings {
    type Error = SettingsError;

    fn try_from(resp: SettingsResponse) -> SettingsResult<Self> {
        let patch = match resp.pod_spec_json_patch.as_deref().map(str::trim) {
            None | Some("") => Vec::new(),
            Some(raw) => parse_patch(raw)?,
        };
        Ok(Self {
            enabled: resp.enabled,
            patch,
        })
    }
}

fn parse_patch(raw: &str) -> SettingsResult<Vec<PatchOperation>> {
    let ops: Vec<PatchOperation> =
        serde_json::from_str(raw).map_err(|e| SettingsError::InvalidPatch(e.to_string()))?;
    for op in &ops {
        op.validate()
            .map_err(|e| SettingsError::InvalidPatch(e.to_string()))?;
    }
    Ok(ops)
}

/// The remote settings service.
#[async_trait]
pub trait SettingsService: Send + Sync {
    /// Fetch the current settings for a service.
    async fn fetch_settings(&self, key: &SettingsKey) -> SettingsResult<ColdStartSettings>;

    /// Tell the service a target is scaling up from zero. Callers treat
    /// this as fire-and-forget.
    async fn notify_scale_from_zero(&self, target: &ScaleTarget) -> SettingsResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(enabled: bool, patch: Option<&str>) -> SettingsResponse {
        SettingsResponse {
            enabled,
            pod_spec_json_patch: patch.map(str::to_string),
        }
    }

    #[test]
    fn decodes_wire_response() {
        let body = r#"{
            "enabled": true,
            "pod_spec_json_patch": "[{\"op\":\"remove\",\"path\":\"/nodeSelector\"}]"
        }"#;
        let resp: SettingsResponse = serde_json::from_str(body).unwrap();
        let settings = ColdStartSettings::try_from(resp).unwrap();
        assert!(settings.enabled);
        assert_eq!(
            settings.patch,
            vec![PatchOperation::Remove {
                path: "/nodeSelector".to_string()
            }]
        );
    }

    #[test]
    fn missing_or_blank_patch_is_empty() {
        let resp: SettingsResponse = serde_json::from_str(r#"{"enabled": false}"#).unwrap();
        assert_eq!(
            ColdStartSettings::try_from(resp).unwrap(),
            ColdStartSettings::disabled()
        );

        let settings = ColdStartSettings::try_from(response(true, Some("  "))).unwrap();
        assert!(settings.enabled);
        assert!(settings.patch.is_empty());
    }

    #[test]
    fn malformed_patch_fails_fast() {
        let err = ColdStartSettings::try_from(response(true, Some("{not json"))).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidPatch(_)));

        let resp = response(true, Some(r#"[{"op":"jump","path":"/a"}]"#));
        let err = ColdStartSettings::try_from(resp).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidPatch(_)));
    }

    #[test]
    fn bad_pointer_fails_fast() {
        let resp = response(true, Some(r#"[{"op":"remove","path":"nodeSelector"}]"#));
        let err = ColdStartSettings::try_from(resp).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidPatch(_)));
    }

    #[test]
    fn key_display() {
        assert_eq!(SettingsKey::new("default", "api").to_string(), "default/api");
    }
}
