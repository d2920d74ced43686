//! In-memory cluster.
//!
//! Deployments are stored as JSON documents, the way an API server stores
//! them, so patches are applied with the same engine a real server would
//! use. Every successful mutation is recorded, and each capability can be
//! made to fail on demand.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use coldboost_core::{Deployment, PatchOperation, Pod, apply_patch};

use crate::client::{ClusterClient, LabelSelector};
use crate::error::{ClusterError, ClusterResult};

/// A successful write against the cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create {
        namespace: String,
        name: String,
        replicas: Option<i32>,
    },
    Patch {
        namespace: String,
        name: String,
        ops: Vec<PatchOperation>,
    },
}

#[derive(Default)]
struct Inner {
    /// (namespace, name) → deployment document.
    deployments: HashMap<(String, String), Value>,
    pods: Vec<Pod>,
    mutations: Vec<Mutation>,
    list_calls: usize,
    fail_get: bool,
    fail_create: bool,
    fail_patch: bool,
    fail_list: bool,
}

/// `ClusterClient` backed by process memory. Cheap to clone; clones share
/// state.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a deployment without recording a mutation.
    pub fn insert_deployment(&self, deployment: &Deployment) -> ClusterResult<()> {
        let doc = serde_json::to_value(deployment)
            .map_err(|e| ClusterError::Invalid(e.to_string()))?;
        self.lock().deployments.insert(
            (
                deployment.metadata.namespace.clone(),
                deployment.metadata.name.clone(),
            ),
            doc,
        );
        Ok(())
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        let inner = self.lock();
        let doc = inner
            .deployments
            .get(&(namespace.to_string(), name.to_string()))?;
        serde_json::from_value(doc.clone()).ok()
    }

    /// Replica count of a stored deployment.
    pub fn replicas(&self, namespace: &str, name: &str) -> Option<i32> {
        self.deployment(namespace, name)?.spec.replicas
    }

    pub fn add_pod(&self, pod: Pod) {
        self.lock().pods.push(pod);
    }

    pub fn clear_pods(&self) {
        self.lock().pods.clear();
    }

    /// All successful mutations, oldest first.
    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    /// Number of `list_pods` calls, including failed ones.
    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn fail_gets(&self, fail: bool) {
        self.lock().fail_get = fail;
    }

    pub fn fail_creates(&self, fail: bool) {
        self.lock().fail_create = fail;
    }

    pub fn fail_patches(&self, fail: bool) {
        self.lock().fail_patch = fail;
    }

    pub fn fail_lists(&self, fail: bool) {
        self.lock().fail_list = fail;
    }
}

fn decode(doc: &Value) -> ClusterResult<Deployment> {
    serde_json::from_value(doc.clone()).map_err(|e| ClusterError::Invalid(e.to_string()))
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<Deployment>> {
        let inner = self.lock();
        if inner.fail_get {
            return Err(ClusterError::Api(format!("get {namespace}/{name}: injected failure")));
        }
        inner
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .map(decode)
            .transpose()
    }

    async fn create_deployment(&self, deployment: &Deployment) -> ClusterResult<Deployment> {
        let key = (
            deployment.metadata.namespace.clone(),
            deployment.metadata.name.clone(),
        );
        let mut inner = self.lock();
        if inner.fail_create {
            return Err(ClusterError::Api(format!(
                "create {}: injected failure",
                deployment.key()
            )));
        }
        if inner.deployments.contains_key(&key) {
            return Err(ClusterError::AlreadyExists(deployment.key()));
        }

        let mut stored = deployment.clone();
        stored.metadata.resource_version = Some("1".to_string());
        let doc = serde_json::to_value(&stored).map_err(|e| ClusterError::Invalid(e.to_string()))?;
        inner.deployments.insert(key.clone(), doc);
        inner.mutations.push(Mutation::Create {
            namespace: key.0,
            name: key.1,
            replicas: deployment.spec.replicas,
        });
        debug!(deployment = %deployment.key(), "memory cluster: created");
        Ok(stored)
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        ops: &[PatchOperation],
    ) -> ClusterResult<Deployment> {
        let key = (namespace.to_string(), name.to_string());
        let mut inner = self.lock();
        if inner.fail_patch {
            return Err(ClusterError::Api(format!("patch {namespace}/{name}: injected failure")));
        }
        let current = inner
            .deployments
            .get(&key)
            .ok_or_else(|| ClusterError::NotFound(format!("{namespace}/{name}")))?;

        let patched = apply_patch(current, ops)?;
        let deployment = decode(&patched)?;
        inner.deployments.insert(key, patched);
        inner.mutations.push(Mutation::Patch {
            namespace: namespace.to_string(),
            name: name.to_string(),
            ops: ops.to_vec(),
        });
        debug!(deployment = %deployment.key(), ops = ops.len(), "memory cluster: patched");
        Ok(deployment)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> ClusterResult<Vec<Pod>> {
        let mut inner = self.lock();
        inner.list_calls += 1;
        if inner.fail_list {
            return Err(ClusterError::Api(format!(
                "list pods {namespace} [{selector}]: injected failure"
            )));
        }
        Ok(inner
            .pods
            .iter()
            .filter(|p| p.metadata.namespace == namespace && selector.matches(&p.metadata.labels))
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
