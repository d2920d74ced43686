//! The `ClusterClient` trait and label selectors.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use coldboost_core::{Deployment, PatchOperation, Pod};

use crate::error::ClusterResult;

/// Deployment and pod access needed by the boost lifecycle.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch a deployment. A missing deployment is `Ok(None)`, not an error.
    async fn get_deployment(&self, namespace: &str, name: &str)
    -> ClusterResult<Option<Deployment>>;

    /// Create a deployment in `deployment.metadata.namespace`.
    async fn create_deployment(&self, deployment: &Deployment) -> ClusterResult<Deployment>;

    /// Apply RFC 6902 operations to an existing deployment.
    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        ops: &[PatchOperation],
    ) -> ClusterResult<Deployment>;

    /// List pods in a namespace matching `selector`.
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> ClusterResult<Vec<Pod>>;

    /// Client name (for logging).
    fn name(&self) -> &str;
}

/// One term of a label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    /// `key=value`
    Equals { key: String, value: String },
    /// `!key`
    DoesNotExist { key: String },
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Equals { key, value } => labels.get(key) == Some(value),
            Self::DoesNotExist { key } => !labels.contains_key(key),
        }
    }
}

/// Conjunction of label requirements, rendered in the Kubernetes selector
/// grammar (`serving.knative.dev/revision=api-00001,!cold`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.push(Requirement::Equals {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn does_not_exist(mut self, key: impl Into<String>) -> Self {
        self.requirements
            .push(Requirement::DoesNotExist { key: key.into() });
        self
    }

    /// Whether every requirement holds for `labels`. An empty selector
    /// matches everything.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, req) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match req {
                Requirement::Equals { key, value } => write!(f, "{key}={value}")?,
                Requirement::DoesNotExist { key } => write!(f, "!{key}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn revision_selector() -> LabelSelector {
        LabelSelector::new()
            .equals("serving.knative.dev/revision", "api-00001")
            .does_not_exist("cold")
    }

    #[test]
    fn renders_kubernetes_grammar() {
        assert_eq!(
            revision_selector().to_string(),
            "serving.knative.dev/revision=api-00001,!cold"
        );
        assert_eq!(LabelSelector::new().to_string(), "");
    }

    #[test]
    fn matches_primary_pod() {
        let l = labels(&[("serving.knative.dev/revision", "api-00001"), ("app", "api")]);
        assert!(revision_selector().matches(&l));
    }

    #[test]
    fn excludes_cold_pod() {
        let l = labels(&[("serving.knative.dev/revision", "api-00001"), ("cold", "true")]);
        assert!(!revision_selector().matches(&l));
    }

    #[test]
    fn excludes_other_revision() {
        let l = labels(&[("serving.knative.dev/revision", "api-00002")]);
        assert!(!revision_selector().matches(&l));
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert!(LabelSelector::new().matches(&BTreeMap::new()));
    }
}
