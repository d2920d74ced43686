//! Boost target snapshot and the boost deployment built from it.

use std::collections::BTreeMap;

use coldboost_cluster::LabelSelector;
use coldboost_core::{
    BoostConfig, Deployment, DeploymentSpec, ObjectMeta, PatchError, PodTemplateSpec,
    ScaleTarget, SelectorSpec, patch_template,
};
use coldboost_settings::{ColdStartSettings, SettingsKey};

use crate::error::{BoostError, BoostResult};

/// Value of the cold marker label.
pub const COLD_VALUE: &str = "true";

/// What a boost needs to know about its scale target, copied out of the
/// caller's object when the boost is considered.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostTarget {
    pub namespace: String,
    pub name: String,
    pub service: String,
    pub revision: String,
    pub labels: BTreeMap<String, String>,
    pub selector: BTreeMap<String, String>,
    pub template: PodTemplateSpec,
}

impl BoostTarget {
    /// Snapshot `target`. The revision label is looked up on the object and
    /// then on its pod template, and must be present. The service label
    /// falls back to the object name.
    pub fn from_scale_target(target: &ScaleTarget, config: &BoostConfig) -> BoostResult<Self> {
        let meta = &target.metadata;
        if meta.name.is_empty() || meta.namespace.is_empty() {
            return Err(BoostError::Target(format!(
                "scale target {:?} has no name or namespace",
                target.key()
            )));
        }
        let revision = target_label(target, &config.revision_label).ok_or_else(|| {
            BoostError::Target(format!(
                "{} has no {} label",
                target.key(),
                config.revision_label
            ))
        })?;

        Ok(Self {
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
            service: service_name(target, config),
            revision,
            labels: meta.labels.clone(),
            selector: target.spec.selector.match_labels.clone(),
            template: target.spec.template.clone(),
        })
    }

    /// `{namespace}/{name}`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn boost_name(&self, config: &BoostConfig) -> String {
        format!("{}{}", self.name, config.name_suffix)
    }

    /// Pods of the primary revision, excluding boost pods.
    pub fn readiness_selector(&self, config: &BoostConfig) -> LabelSelector {
        LabelSelector::new()
            .equals(&config.revision_label, &self.revision)
            .does_not_exist(&config.cold_label)
    }

    /// The boost deployment at `replicas`: the target's template with the
    /// settings patch applied, everything marked with the cold label.
    pub fn boost_deployment(
        &self,
        settings: &ColdStartSettings,
        replicas: i32,
        config: &BoostConfig,
    ) -> Result<Deployment, PatchError> {
        let mut template = patch_template(&self.template, &settings.patch)?;
        mark_cold(&mut template.metadata.labels, config);

        let mut labels = self.labels.clone();
        mark_cold(&mut labels, config);

        let mut selector = if self.selector.is_empty() {
            BTreeMap::from([(config.revision_label.clone(), self.revision.clone())])
        } else {
            self.selector.clone()
        };
        mark_cold(&mut selector, config);
        // Pods must satisfy their own selector.
        for (k, v) in &selector {
            template.metadata.labels.entry(k.clone()).or_insert_with(|| v.clone());
        }

        Ok(Deployment {
            metadata: ObjectMeta {
                name: self.boost_name(config),
                namespace: self.namespace.clone(),
                labels,
                ..Default::default()
            },
            spec: DeploymentSpec {
                replicas: Some(replicas),
                selector: SelectorSpec {
                    match_labels: selector,
                },
                template,
            },
        })
    }
}

/// Settings lookup key of `target`. Needs no revision label, so it works
/// for any transition.
pub fn settings_key(target: &ScaleTarget, config: &BoostConfig) -> SettingsKey {
    SettingsKey::new(&target.metadata.namespace, service_name(target, config))
}

/// The service label, falling back to the object name.
fn service_name(target: &ScaleTarget, config: &BoostConfig) -> String {
    target_label(target, &config.service_label).unwrap_or_else(|| target.metadata.name.clone())
}

/// A non-empty label of the object, else of its pod template.
fn target_label(target: &ScaleTarget, key: &str) -> Option<String> {
    target
        .metadata
        .labels
        .get(key)
        .or_else(|| target.spec.template.metadata.labels.get(key))
        .filter(|v| !v.is_empty())
        .cloned()
}

fn mark_cold(labels: &mut BTreeMap<String, String>, config: &BoostConfig) {
    labels.insert(config.cold_label.clone(), COLD_VALUE.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldboost_core::{Container, PatchOperation, PodSpec};
    use serde_json::json;

    const REVISION: &str = "serving.knative.dev/revision";
    const SERVICE: &str = "serving.knative.dev/service";

    fn scale_target() -> ScaleTarget {
        let labels = BTreeMap::from([
            (REVISION.to_string(), "api-00001".to_string()),
            (SERVICE.to_string(), "api".to_string()),
        ]);
        Deployment {
            metadata: ObjectMeta {
                name: "api-00001-deployment".to_string(),
                namespace: "default".to_string(),
                labels: labels.clone(),
                resource_version: Some("42".to_string()),
                ..Default::default()
            },
            spec: DeploymentSpec {
                replicas: Some(0),
                selector: SelectorSpec {
                    match_labels: BTreeMap::from([(
                        REVISION.to_string(),
                        "api-00001".to_string(),
                    )]),
                },
                template: PodTemplateSpec {
                    metadata: ObjectMeta {
                        labels,
                        ..Default::default()
                    },
                    spec: PodSpec {
                        containers: vec![Container {
                            name: "user-container".to_string(),
                            image: Some("registry/api:1".to_string()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    },
                },
            },
        }
    }

    #[test]
    fn snapshot_reads_labels() {
        let t = BoostTarget::from_scale_target(&scale_target(), &BoostConfig::default()).unwrap();
        assert_eq!(t.key(), "default/api-00001-deployment");
        assert_eq!(t.service, "api");
        assert_eq!(t.revision, "api-00001");
        assert_eq!(t.boost_name(&BoostConfig::default()), "api-00001-deployment-cold");
    }

    #[test]
    fn snapshot_is_independent_of_the_source() {
        let mut source = scale_target();
        let t = BoostTarget::from_scale_target(&source, &BoostConfig::default()).unwrap();
        source.spec.template.spec.containers[0].image = Some("registry/api:2".to_string());
        assert_eq!(t.template.spec.containers[0].image.as_deref(), Some("registry/api:1"));
    }

    #[test]
    fn revision_label_is_required() {
        let mut source = scale_target();
        source.metadata.labels.remove(REVISION);
        source.spec.template.metadata.labels.remove(REVISION);
        let err = BoostTarget::from_scale_target(&source, &BoostConfig::default()).unwrap_err();
        assert!(matches!(err, BoostError::Target(_)));
    }

    #[test]
    fn revision_falls_back_to_template_and_service_to_name() {
        let mut source = scale_target();
        source.metadata.labels.clear();
        source.spec.template.metadata.labels.remove(SERVICE);
        let t = BoostTarget::from_scale_target(&source, &BoostConfig::default()).unwrap();
        assert_eq!(t.revision, "api-00001");
        assert_eq!(t.service, "api-00001-deployment");
    }

    #[test]
    fn settings_key_does_not_need_a_revision() {
        let config = BoostConfig::default();
        let mut source = scale_target();
        source.metadata.labels.remove(REVISION);
        source.spec.template.metadata.labels.remove(REVISION);
        assert_eq!(settings_key(&source, &config), SettingsKey::new("default", "api"));

        source.metadata.labels.clear();
        source.spec.template.metadata.labels.clear();
        assert_eq!(
            settings_key(&source, &config),
            SettingsKey::new("default", "api-00001-deployment")
        );
    }

    #[test]
    fn boost_deployment_is_marked_cold() {
        let config = BoostConfig::default();
        let t = BoostTarget::from_scale_target(&scale_target(), &config).unwrap();
        let d = t
            .boost_deployment(&ColdStartSettings::enabled(vec![]), 1, &config)
            .unwrap();

        assert_eq!(d.metadata.name, "api-00001-deployment-cold");
        assert_eq!(d.metadata.resource_version, None);
        assert_eq!(d.spec.replicas, Some(1));
        assert_eq!(d.metadata.labels["cold"], "true");
        assert_eq!(d.spec.selector.match_labels["cold"], "true");
        assert_eq!(d.spec.template.metadata.labels["cold"], "true");
        assert_eq!(d.spec.template.spec, t.template.spec);

        // Boost pods never satisfy the readiness selector.
        let selector = t.readiness_selector(&config);
        assert_eq!(selector.to_string(), "serving.knative.dev/revision=api-00001,!cold");
        assert!(!selector.matches(&d.spec.template.metadata.labels));
        assert!(selector.matches(&t.template.metadata.labels));
    }

    #[test]
    fn boost_deployment_applies_patch() {
        let config = BoostConfig::default();
        let t = BoostTarget::from_scale_target(&scale_target(), &config).unwrap();
        let settings = ColdStartSettings::enabled(vec![PatchOperation::Add {
            path: "/nodeSelector".to_string(),
            value: json!({"pool": "warm"}),
        }]);
        let d = t.boost_deployment(&settings, 0, &config).unwrap();
        assert_eq!(d.spec.template.spec.extra["nodeSelector"], json!({"pool": "warm"}));
        assert_eq!(d.spec.replicas, Some(0));
        // The snapshot itself is untouched.
        assert!(t.template.spec.extra.is_empty());
    }

    #[test]
    fn bad_patch_is_reported() {
        let config = BoostConfig::default();
        let t = BoostTarget::from_scale_target(&scale_target(), &config).unwrap();
        let settings = ColdStartSettings::enabled(vec![PatchOperation::Remove {
            path: "/containers".to_string(),
        }]);
        assert!(t.boost_deployment(&settings, 1, &config).is_err());
    }
}
