//! In-memory view of orchestrator objects.
//!
//! The namespace controller enumerates the pods of a namespace when the
//! namespace is added and when multicast is enabled; [`PodCache`] is the
//! seam for that lookup. [`ObjectCache`] is the implementation the event
//! dispatcher keeps up to date.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::types::{LogicalPortInfo, Namespace, Pod};

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Pod cache unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the pods of a namespace and their logical ports.
pub trait PodCache: Send + Sync {
    /// Lists the pods currently known in `namespace`.
    fn pods(&self, namespace: &str) -> Result<Vec<Pod>, CacheError>;

    /// Looks up a logical switch port by name.
    fn logical_port(&self, name: &str) -> Option<LogicalPortInfo>;
}

/// Namespaces, pods, and logical ports as last delivered by the orchestrator.
#[derive(Debug, Default)]
pub struct ObjectCache {
    namespaces: RwLock<BTreeMap<String, Namespace>>,
    // namespace -> pod name -> pod
    pods: RwLock<BTreeMap<String, BTreeMap<String, Pod>>>,
    ports: RwLock<HashMap<String, LogicalPortInfo>>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_namespace(&self, ns: Namespace) {
        self.namespaces.write().insert(ns.name.clone(), ns);
    }

    pub fn remove_namespace(&self, name: &str) -> Option<Namespace> {
        self.namespaces.write().remove(name)
    }

    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.namespaces.read().get(name).cloned()
    }

    /// Names of every known namespace, sorted.
    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces.read().keys().cloned().collect()
    }

    pub fn upsert_pod(&self, pod: Pod) {
        self.pods
            .write()
            .entry(pod.namespace.clone())
            .or_default()
            .insert(pod.name.clone(), pod);
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        let mut pods = self.pods.write();
        let ns_pods = pods.get_mut(namespace)?;
        let removed = ns_pods.remove(name);
        if ns_pods.is_empty() {
            pods.remove(namespace);
        }
        removed
    }

    /// Drops every pod of `namespace` together with its logical port.
    /// Returns the number of pods removed.
    pub fn remove_namespace_pods(&self, namespace: &str) -> usize {
        let Some(removed) = self.pods.write().remove(namespace) else {
            return 0;
        };
        let mut ports = self.ports.write();
        for pod in removed.values() {
            ports.remove(&pod.logical_port_name());
        }
        removed.len()
    }

    pub fn set_logical_port(&self, port: LogicalPortInfo) {
        self.ports.write().insert(port.name.clone(), port);
    }

    pub fn remove_logical_port(&self, name: &str) -> Option<LogicalPortInfo> {
        self.ports.write().remove(name)
    }
}

impl PodCache for ObjectCache {
    fn pods(&self, namespace: &str) -> Result<Vec<Pod>, CacheError> {
        Ok(self
            .pods
            .read()
            .get(namespace)
            .map(|pods| pods.values().cloned().collect())
            .unwrap_or_default())
    }

    fn logical_port(&self, name: &str) -> Option<LogicalPortInfo> {
        self.ports.read().get(name).cloned()
    }
}
