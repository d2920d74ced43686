//! Cluster object model.
//!
//! Mirrors the parts of `apps/v1.Deployment` and `core/v1.Pod` the boost
//! lifecycle needs. Field names follow the Kubernetes JSON encoding so the
//! same documents can be exchanged with a real API server, and unknown pod
//! spec fields are carried through untouched in `extra` maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Object metadata shared by deployments, templates and pods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Set by the API server once graceful deletion has started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<String>,
}

// ── Deployment ─────────────────────────────────────────────────────

/// A replicated workload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DeploymentSpec,
}

/// The scalable target handed over by the reconciler. It has the shape of
/// a deployment (metadata, replicas, selector, template).
pub type ScaleTarget = Deployment;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub selector: SelectorSpec,
    #[serde(default)]
    pub template: PodTemplateSpec,
}

/// Equality-based selector stored on a deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

/// Pod template: labels for the pods plus the pod spec itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodTemplateSpec {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
    /// Everything else in the pod spec (volumes, nodeSelector, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Pod ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PodCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

pub const POD_RUNNING: &str = "Running";
pub const POD_READY: &str = "Ready";
pub const CONDITION_TRUE: &str = "True";

impl Pod {
    /// Whether the pod can serve traffic: running, `Ready=True`, and not
    /// being deleted.
    pub fn is_serving(&self) -> bool {
        self.status.phase.as_deref() == Some(POD_RUNNING)
            && self.is_ready()
            && self.metadata.deletion_timestamp.is_none()
    }

    /// Value of the `Ready` condition. A pod without one is not ready.
    pub fn is_ready(&self) -> bool {
        self.status
            .conditions
            .iter()
            .find(|c| c.kind == POD_READY)
            .is_some_and(|c| c.status == CONDITION_TRUE)
    }
}

impl Deployment {
    /// `{namespace}/{name}`, used in log fields.
    pub fn key(&self) -> String {
        format!("{}/{}", self.metadata.namespace, self.metadata.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(phase: &str, ready: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: "api-00001-abc".to_string(),
                namespace: "default".to_string(),
                ..Default::default()
            },
            status: PodStatus {
                phase: Some(phase.to_string()),
                conditions: vec![PodCondition {
                    kind: POD_READY.to_string(),
                    status: ready.to_string(),
                }],
            },
        }
    }

    #[test]
    fn running_ready_pod_is_serving() {
        assert!(pod("Running", "True").is_serving());
    }

    #[test]
    fn pending_pod_is_not_serving() {
        assert!(!pod("Pending", "True").is_serving());
    }

    #[test]
    fn unready_pod_is_not_serving() {
        assert!(!pod("Running", "False").is_serving());
    }

    #[test]
    fn terminating_pod_is_not_serving() {
        let mut p = pod("Running", "True");
        p.metadata.deletion_timestamp = Some("2024-01-01T00:00:00Z".to_string());
        assert!(!p.is_serving());
    }

    #[test]
    fn pod_without_ready_condition_is_not_ready() {
        let mut p = pod("Running", "True");
        p.status.conditions.clear();
        assert!(!p.is_ready());
    }

    #[test]
    fn deployment_parses_kubernetes_json_and_keeps_unknown_fields() {
        let json = serde_json::json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "api-00001-deployment",
                "namespace": "default",
                "resourceVersion": "42",
                "labels": {"serving.knative.dev/revision": "api-00001"}
            },
            "spec": {
                "replicas": 0,
                "selector": {"matchLabels": {"serving.knative.dev/revision": "api-00001"}},
                "template": {
                    "metadata": {"labels": {"serving.knative.dev/revision": "api-00001"}},
                    "spec": {
                        "containers": [{
                            "name": "user-container",
                            "image": "ghcr.io/acme/api:1",
                            "ports": [{"containerPort": 8080}]
                        }],
                        "nodeSelector": {"pool": "gpu"}
                    }
                }
            },
            "status": {"readyReplicas": 0}
        });

        let d: Deployment = serde_json::from_value(json).unwrap();
        assert_eq!(d.key(), "default/api-00001-deployment");
        assert_eq!(d.spec.replicas, Some(0));
        assert_eq!(d.metadata.resource_version.as_deref(), Some("42"));
        let spec = &d.spec.template.spec;
        assert_eq!(spec.containers[0].image.as_deref(), Some("ghcr.io/acme/api:1"));
        assert!(spec.containers[0].extra.contains_key("ports"));
        assert_eq!(spec.extra["nodeSelector"]["pool"], "gpu");

        let back = serde_json::to_value(&d.spec.template.spec).unwrap();
        assert_eq!(back["nodeSelector"]["pool"], "gpu");
        assert_eq!(back["containers"][0]["ports"][0]["containerPort"], 8080);
    }
}
