//! Kubernetes-backed `ClusterClient` (feature `kube`).
//!
//! Objects cross the boundary as JSON: the k8s-openapi types are
//! serialized and read back into the coldboost model, which keeps unknown
//! pod spec fields in its `extra` maps. Patches are applied to the live
//! object and written back with `replace`, so a concurrent writer makes
//! the update fail on `resourceVersion` instead of being overwritten.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment as K8sDeployment;
use k8s_openapi::api::core::v1::Pod as K8sPod;
use kube::api::{Api, ListParams, PostParams};
use serde_json::Value;
use tracing::debug;

use coldboost_core::{Deployment, PatchOperation, Pod, apply_patch};

use crate::client::{ClusterClient, LabelSelector};
use crate::error::{ClusterError, ClusterResult};

pub struct KubeCluster {
    client: kube::Client,
}

impl KubeCluster {
    /// Connect using the in-cluster or kubeconfig defaults.
    pub async fn try_default() -> ClusterResult<Self> {
        let client = kube::Client::try_default()
            .await
            .map_err(|e| ClusterError::Api(format!("failed to create Kubernetes client: {e}")))?;
        Ok(Self { client })
    }

    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn deployments(&self, namespace: &str) -> Api<K8sDeployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn api_error(action: &str, target: &str, e: kube::Error) -> ClusterError {
    ClusterError::Api(format!("{action} {target}: {e}"))
}

fn to_model<S: serde::Serialize, T: serde::de::DeserializeOwned>(object: &S) -> ClusterResult<T> {
    let doc = serde_json::to_value(object).map_err(|e| ClusterError::Invalid(e.to_string()))?;
    serde_json::from_value(doc).map_err(|e| ClusterError::Invalid(e.to_string()))
}

fn to_k8s(doc: Value) -> ClusterResult<K8sDeployment> {
    serde_json::from_value(doc).map_err(|e| ClusterError::Invalid(e.to_string()))
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<Deployment>> {
        let live = self
            .deployments(namespace)
            .get_opt(name)
            .await
            .map_err(|e| api_error("get", &format!("{namespace}/{name}"), e))?;
        live.as_ref().map(to_model).transpose()
    }

    async fn create_deployment(&self, deployment: &Deployment) -> ClusterResult<Deployment> {
        let mut doc =
            serde_json::to_value(deployment).map_err(|e| ClusterError::Invalid(e.to_string()))?;
        if let Value::Object(map) = &mut doc {
            map.insert("apiVersion".to_string(), Value::from("apps/v1"));
            map.insert("kind".to_string(), Value::from("Deployment"));
        }

        let created = self
            .deployments(&deployment.metadata.namespace)
            .create(&PostParams::default(), &to_k8s(doc)?)
            .await
            .map_err(|e| match e {
                kube::Error::Api(ref resp) if resp.code == 409 => {
                    ClusterError::AlreadyExists(deployment.key())
                }
                other => api_error("create", &deployment.key(), other),
            })?;
        debug!(deployment = %deployment.key(), "created deployment");
        to_model(&created)
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        ops: &[PatchOperation],
    ) -> ClusterResult<Deployment> {
        let target = format!("{namespace}/{name}");
        let api = self.deployments(namespace);
        let live = api
            .get_opt(name)
            .await
            .map_err(|e| api_error("get", &target, e))?
            .ok_or_else(|| ClusterError::NotFound(target.clone()))?;

        let doc = serde_json::to_value(&live).map_err(|e| ClusterError::Invalid(e.to_string()))?;
        let patched = to_k8s(apply_patch(&doc, ops)?)?;
        let updated = api
            .replace(name, &PostParams::default(), &patched)
            .await
            .map_err(|e| api_error("replace", &target, e))?;
        debug!(deployment = %target, ops = ops.len(), "patched deployment");
        to_model(&updated)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> ClusterResult<Vec<Pod>> {
        let pods: Api<K8sPod> = Api::namespaced(self.client.clone(), namespace);
        let selector = selector.to_string();
        let list = pods
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| api_error("list pods", &format!("{namespace} [{selector}]"), e))?;
        list.items.iter().map(to_model).collect()
    }

    fn name(&self) -> &str {
        "kube"
    }
}
