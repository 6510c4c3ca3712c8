//! Event dispatch.
//!
//! Orchestrator events are queued on a bounded channel and drained by a
//! pool of workers sharing the receiver. Any worker may handle any event,
//! so events for the same namespace can run concurrently; the namespace
//! registry serializes them per namespace.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::ObjectCache;
use crate::namespace::NamespaceOrch;
use crate::types::{LogicalPortInfo, Namespace, Pod};

/// An orchestrator event, as read from the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchEvent {
    NamespaceAdded {
        namespace: Namespace,
    },
    NamespaceUpdated {
        old: Namespace,
        new: Namespace,
    },
    NamespaceDeleted {
        namespace: Namespace,
    },
    PodAdded {
        pod: Pod,
        /// Logical switch port UUID, once known.
        #[serde(default)]
        port_uuid: Option<String>,
    },
    PodDeleted {
        pod: Pod,
    },
    /// Authoritative namespace list; triggers address-set reconciliation.
    Sync {
        namespaces: Vec<String>,
    },
}

impl OrchEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            OrchEvent::NamespaceAdded { .. } => "namespace_added",
            OrchEvent::NamespaceUpdated { .. } => "namespace_updated",
            OrchEvent::NamespaceDeleted { .. } => "namespace_deleted",
            OrchEvent::PodAdded { .. } => "pod_added",
            OrchEvent::PodDeleted { .. } => "pod_deleted",
            OrchEvent::Sync { .. } => "sync",
        }
    }

    /// Namespace the event targets, if any.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            OrchEvent::NamespaceAdded { namespace } | OrchEvent::NamespaceDeleted { namespace } => {
                Some(&namespace.name)
            }
            OrchEvent::NamespaceUpdated { old, .. } => Some(&old.name),
            OrchEvent::PodAdded { pod, .. } | OrchEvent::PodDeleted { pod } => Some(&pod.namespace),
            OrchEvent::Sync { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Event queue closed")]
    Closed,
}

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub queue_depth: usize,
    pub resync_interval: Option<std::time::Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 1024,
            resync_interval: None,
        }
    }
}

/// Applies one event: updates the cache, then calls the handler.
///
/// Handler errors are logged, never returned.
pub async fn handle_event(orch: &NamespaceOrch, cache: &ObjectCache, event: OrchEvent) {
    debug!(kind = event.kind(), namespace = ?event.namespace(), "Handling event");
    match event {
        OrchEvent::NamespaceAdded { namespace } => {
            cache.upsert_namespace(namespace.clone());
            orch.add_namespace(&namespace).await;
        }
        OrchEvent::NamespaceUpdated { old, new } => {
            cache.upsert_namespace(new.clone());
            orch.update_namespace(&old, &new).await;
        }
        OrchEvent::NamespaceDeleted { namespace } => {
            cache.remove_namespace(&namespace.name);
            let stale = cache.remove_namespace_pods(&namespace.name);
            if stale > 0 {
                debug!(namespace = %namespace.name, pods = stale, "Dropped cached pods of deleted namespace");
            }
            orch.delete_namespace(&namespace.name).await;
        }
        OrchEvent::PodAdded { pod, port_uuid } => {
            cache.upsert_pod(pod.clone());
            let Some(port) = pod_port(&pod, port_uuid.unwrap_or_default()) else {
                return;
            };
            if !port.uuid.is_empty() {
                cache.set_logical_port(port.clone());
            }
            if let Err(e) = orch.add_pod_to_namespace(&pod.namespace, &port).await {
                error!(namespace = %pod.namespace, pod = %pod.name, error = %e, "Failed to add pod");
            }
        }
        OrchEvent::PodDeleted { pod } => {
            cache.remove_pod(&pod.namespace, &pod.name);
            let known = cache.remove_logical_port(&pod.logical_port_name());
            let uuid = known.map(|port| port.uuid).unwrap_or_default();
            let Some(port) = pod_port(&pod, uuid) else {
                return;
            };
            if let Err(e) = orch.delete_pod_from_namespace(&pod.namespace, &port).await {
                error!(namespace = %pod.namespace, pod = %pod.name, error = %e, "Failed to delete pod");
            }
        }
        OrchEvent::Sync { namespaces } => {
            if let Err(e) = orch.sync_namespaces(&namespaces).await {
                error!(error = %e, "Namespace reconciliation failed");
            }
        }
    }
}

/// Builds the logical port of a pod that has pod-network addresses.
fn pod_port(pod: &Pod, uuid: String) -> Option<LogicalPortInfo> {
    if !pod.has_pod_network_ip() {
        debug!(namespace = %pod.namespace, pod = %pod.name, "Pod has no pod-network address");
        return None;
    }
    match pod.addresses() {
        Ok(ips) => Some(LogicalPortInfo::new(pod.logical_port_name(), uuid, ips)),
        Err(e) => {
            warn!(namespace = %pod.namespace, pod = %pod.name, error = %e, "Skipping pod with unparsable address");
            None
        }
    }
}

/// Worker pool feeding events into a [`NamespaceOrch`].
pub struct EventDispatcher {
    sender: mpsc::Sender<OrchEvent>,
    workers: Vec<JoinHandle<()>>,
    resync: Option<JoinHandle<()>>,
}

impl EventDispatcher {
    pub fn start(orch: Arc<NamespaceOrch>, cache: Arc<ObjectCache>, config: DispatcherConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_depth.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..config.workers.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let orch = Arc::clone(&orch);
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    loop {
                        let event = receiver.lock().await.recv().await;
                        let Some(event) = event else {
                            break;
                        };
                        handle_event(&orch, &cache, event).await;
                    }
                    debug!(worker = id, "Event worker stopped");
                })
            })
            .collect();

        let resync = config.resync_interval.map(|period| {
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                // The first tick completes immediately.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let expected = cache.namespace_names();
                    if let Err(e) = orch.sync_namespaces(&expected).await {
                        error!(error = %e, "Periodic namespace reconciliation failed");
                    }
                }
            })
        });

        info!(workers = config.workers, queue_depth = config.queue_depth, "Event dispatcher started");
        Self {
            sender,
            workers,
            resync,
        }
    }

    /// Queues an event, waiting for room if the queue is full.
    pub async fn dispatch(&self, event: OrchEvent) -> Result<(), DispatchError> {
        self.sender.send(event).await.map_err(|_| DispatchError::Closed)
    }

    /// Closes the queue and waits for queued events to be handled.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Event worker panicked");
            }
        }
        if let Some(resync) = self.resync {
            resync.abort();
        }
        info!("Event dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PodCache;
    use crate::namespace::NamespaceOrchConfig;
    use ovn_nb_common::AddressSetName;
    use ovn_nb_test::{FakeNorthbound, NbVerifier};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn setup() -> (Arc<NamespaceOrch>, FakeNorthbound, Arc<ObjectCache>) {
        let nb = FakeNorthbound::new();
        let cache = Arc::new(ObjectCache::new());
        let orch = Arc::new(NamespaceOrch::new(
            NamespaceOrchConfig::default(),
            Arc::new(nb.clone()),
            Arc::new(nb.clone()),
            cache.clone(),
        ));
        (orch, nb, cache)
    }

    #[test]
    fn test_event_json_format() {
        let line = r#"{"type":"pod_added","pod":{"name":"a","namespace":"ns1","pod_ip":"10.0.0.1"},"port_uuid":"lsp-a"}"#;
        let event: OrchEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.kind(), "pod_added");
        assert_eq!(event.namespace(), Some("ns1"));
        match event {
            OrchEvent::PodAdded { pod, port_uuid } => {
                assert_eq!(pod.pod_ip, "10.0.0.1");
                assert_eq!(port_uuid.as_deref(), Some("lsp-a"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let sync: OrchEvent = serde_json::from_str(r#"{"type":"sync","namespaces":["a","b"]}"#).unwrap();
        assert_eq!(sync.namespace(), None);
    }

    #[tokio::test]
    async fn test_pod_before_namespace_is_picked_up_on_add() {
        let (orch, nb, cache) = setup();

        let pod = Pod::new("ns1", "a").with_ip("10.0.0.1");
        handle_event(&orch, &cache, OrchEvent::PodAdded { pod, port_uuid: None }).await;
        assert!(!orch.registry().contains("ns1"));

        handle_event(
            &orch,
            &cache,
            OrchEvent::NamespaceAdded {
                namespace: Namespace::new("ns1"),
            },
        )
        .await;

        NbVerifier::new(&nb)
            .assert_address_set("ns1", &["10.0.0.1".parse().unwrap()])
            .unwrap();
    }

    #[tokio::test]
    async fn test_pod_delete_updates_cache_and_address_set() {
        let (orch, nb, cache) = setup();
        let ns = Namespace::new("ns1");
        let pod = Pod::new("ns1", "a").with_ip("10.0.0.1");

        handle_event(&orch, &cache, OrchEvent::NamespaceAdded { namespace: ns }).await;
        handle_event(
            &orch,
            &cache,
            OrchEvent::PodAdded {
                pod: pod.clone(),
                port_uuid: Some("lsp-a".to_string()),
            },
        )
        .await;
        assert!(cache.logical_port("ns1_a").is_some());

        handle_event(&orch, &cache, OrchEvent::PodDeleted { pod }).await;
        assert!(cache.logical_port("ns1_a").is_none());
        NbVerifier::new(&nb).assert_address_set("ns1", &[]).unwrap();
    }

    #[tokio::test]
    async fn test_recreated_namespace_starts_without_stale_pods() {
        let (orch, nb, cache) = setup();
        let ns = Namespace::new("ns1");
        handle_event(&orch, &cache, OrchEvent::NamespaceAdded { namespace: ns.clone() }).await;
        handle_event(
            &orch,
            &cache,
            OrchEvent::PodAdded {
                pod: Pod::new("ns1", "a").with_ip("10.0.0.1"),
                port_uuid: Some("lsp-a".to_string()),
            },
        )
        .await;

        // The pod delete is never delivered.
        handle_event(&orch, &cache, OrchEvent::NamespaceDeleted { namespace: ns.clone() }).await;
        assert!(cache.pods("ns1").unwrap().is_empty());
        assert!(cache.logical_port("ns1_a").is_none());

        handle_event(&orch, &cache, OrchEvent::NamespaceAdded { namespace: ns }).await;
        NbVerifier::new(&nb).assert_address_set("ns1", &[]).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dispatcher_drains_queue_on_shutdown() {
        let (orch, nb, cache) = setup();
        let dispatcher = EventDispatcher::start(
            Arc::clone(&orch),
            Arc::clone(&cache),
            DispatcherConfig {
                workers: 4,
                queue_depth: 8,
                resync_interval: None,
            },
        );

        for i in 0..20 {
            dispatcher
                .dispatch(OrchEvent::NamespaceAdded {
                    namespace: Namespace::new(format!("ns{}", i)),
                })
                .await
                .unwrap();
        }
        dispatcher.shutdown().await;

        assert_eq!(orch.registry().len(), 20);
        assert_eq!(nb.address_set_names().len(), 20);
    }

    #[tokio::test]
    async fn test_periodic_resync_destroys_orphans() {
        let (orch, nb, cache) = setup();
        nb.seed_address_set(AddressSetName::namespace_set("orphan"), &[]);
        cache.upsert_namespace(Namespace::new("live"));
        nb.seed_address_set(AddressSetName::namespace_set("live"), &[]);

        let dispatcher = EventDispatcher::start(
            orch,
            cache,
            DispatcherConfig {
                resync_interval: Some(Duration::from_millis(20)),
                ..Default::default()
            },
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        dispatcher.shutdown().await;

        assert!(nb.namespace_address_set("orphan").is_none());
        assert!(nb.namespace_address_set("live").is_some());
    }
}
