//! Shared fixtures for nsorchd integration tests.

#![allow(dead_code)]

use ovn_nb_test::{FakeNorthbound, NbVerifier};
use ovn_nsorchd::annotations::MULTICAST_ENABLED_ANNOTATION;
use ovn_nsorchd::{LogicalPortInfo, Namespace, NamespaceOrch, NamespaceOrchConfig, ObjectCache, Pod};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// A namespace controller wired to an in-memory northbound store.
pub struct TestEnv {
    pub nb: FakeNorthbound,
    pub cache: Arc<ObjectCache>,
    pub orch: Arc<NamespaceOrch>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(NamespaceOrchConfig {
            enable_multicast: true,
            wait_timeout: Duration::from_secs(10),
            wait_poll_interval: Duration::from_millis(10),
        })
    }

    pub fn with_config(config: NamespaceOrchConfig) -> Self {
        let nb = FakeNorthbound::new();
        let cache = Arc::new(ObjectCache::new());
        let orch = Arc::new(NamespaceOrch::new(
            config,
            Arc::new(nb.clone()),
            Arc::new(nb.clone()),
            cache.clone(),
        ));
        Self { nb, cache, orch }
    }

    pub fn verifier(&self) -> NbVerifier<'_> {
        NbVerifier::new(&self.nb)
    }

    /// Adds a running pod and its logical port to the cache.
    pub fn seed_pod(&self, namespace: &str, name: &str, addr: &str) -> LogicalPortInfo {
        let pod = running_pod(namespace, name, addr);
        let port = LogicalPortInfo::new(pod.logical_port_name(), format!("lsp-{}", name), vec![ip(addr)]);
        self.cache.upsert_pod(pod);
        self.cache.set_logical_port(port.clone());
        port
    }
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn running_pod(namespace: &str, name: &str, addr: &str) -> Pod {
    Pod::new(namespace, name).with_ip(addr)
}

pub fn multicast_namespace(name: &str) -> Namespace {
    Namespace::new(name).with_annotation(MULTICAST_ENABLED_ANNOTATION, "true")
}
