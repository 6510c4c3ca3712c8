//! Namespace orchestration logic.

use ovn_nb_common::{AddressSetFactory, AddressSetName, NbResult, PolicyStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::info::{HybridOverlayOverrides, NamespaceSnapshot};
use super::reconcile::{NamespaceReconciler, ReconcileReport};
use super::registry::{NamespaceGuard, NamespaceRegistry};
use crate::cache::PodCache;
use crate::error::{NamespaceOrchError, Result};
use crate::types::{collect_pod_ips, LogicalPortInfo, Namespace};

#[derive(Debug, Clone)]
pub struct NamespaceOrchConfig {
    /// Controller-wide multicast support.
    pub enable_multicast: bool,
    pub wait_timeout: Duration,
    pub wait_poll_interval: Duration,
}

impl Default for NamespaceOrchConfig {
    fn default() -> Self {
        Self {
            enable_multicast: false,
            wait_timeout: Duration::from_secs(10),
            wait_poll_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceOrchStats {
    pub namespaces_added: u64,
    pub namespaces_updated: u64,
    pub namespaces_deleted: u64,
    pub pod_events_applied: u64,
    pub pod_events_ignored: u64,
    pub multicast_enabled: u64,
    pub multicast_disabled: u64,
    pub backend_errors: u64,
    pub annotation_errors: u64,
    pub registry_overwrites: u64,
}

/// Translates namespace and pod events into registry operations and
/// backend side effects.
///
/// Backend failures are logged and counted; only pod operations return
/// them to the caller.
pub struct NamespaceOrch {
    pub(super) config: NamespaceOrchConfig,
    registry: NamespaceRegistry,
    address_sets: Arc<dyn AddressSetFactory>,
    pub(super) policies: Arc<dyn PolicyStore>,
    pub(super) pods: Arc<dyn PodCache>,
    pub(super) stats: Mutex<NamespaceOrchStats>,
}

impl NamespaceOrch {
    pub fn new(
        config: NamespaceOrchConfig,
        address_sets: Arc<dyn AddressSetFactory>,
        policies: Arc<dyn PolicyStore>,
        pods: Arc<dyn PodCache>,
    ) -> Self {
        Self {
            config,
            registry: NamespaceRegistry::new(),
            address_sets,
            policies,
            pods,
            stats: Mutex::new(NamespaceOrchStats::default()),
        }
    }

    pub fn config(&self) -> &NamespaceOrchConfig {
        &self.config
    }

    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    pub fn stats(&self) -> NamespaceOrchStats {
        let mut stats = self.stats.lock().clone();
        stats.registry_overwrites = self.registry.overwritten();
        stats
    }

    pub(super) fn record_backend_error(&self) {
        self.stats.lock().backend_errors += 1;
    }

    #[instrument(skip_all, fields(namespace = %ns.name))]
    pub async fn add_namespace(&self, ns: &Namespace) {
        debug!("Adding namespace");
        let mut info = self.registry.create_locked(&ns.name).await;

        let pods = match self.pods.pods(&ns.name) {
            Ok(pods) => pods,
            Err(e) => {
                warn!(error = %e, "Failed to list pods, continuing with none");
                Vec::new()
            }
        };
        let ips = collect_pod_ips(&pods);

        let annotation_errors = info.update_hybrid_overlay(ns);

        let name = AddressSetName::namespace_set(&ns.name);
        match self.address_sets.new_address_set(&name, &ips).await {
            Ok(set) => info.address_set = Some(set),
            Err(e) => {
                error!(error = %e, "Failed to create address set");
                self.record_backend_error();
            }
        }

        self.multicast_update_namespace(ns, &mut info).await;

        let mut stats = self.stats.lock();
        stats.namespaces_added += 1;
        stats.annotation_errors += annotation_errors;
        drop(stats);
        info!(pods = ips.len(), "Namespace added");
    }

    #[instrument(skip_all, fields(namespace = %old.name))]
    pub async fn update_namespace(&self, old: &Namespace, new: &Namespace) {
        let Some(mut info) = self.registry.get_locked(&old.name).await else {
            warn!("Update for unknown namespace ignored");
            return;
        };

        let annotation_errors = info.update_hybrid_overlay(new);
        self.multicast_update_namespace(new, &mut info).await;

        let mut stats = self.stats.lock();
        stats.namespaces_updated += 1;
        stats.annotation_errors += annotation_errors;
    }

    #[instrument(skip(self))]
    pub async fn delete_namespace(&self, namespace: &str) {
        let Some(mut info) = self.registry.delete_locked(namespace).await else {
            debug!("Delete for unknown namespace ignored");
            return;
        };

        self.multicast_delete_namespace(&mut info).await;

        if let Some(set) = info.address_set.take() {
            if let Err(e) = set.destroy().await {
                error!(error = %e, "Failed to destroy address set");
                self.record_backend_error();
            }
        }

        self.stats.lock().namespaces_deleted += 1;
        info!("Namespace deleted");
    }

    /// Adds a pod's addresses to its namespace.
    ///
    /// A pod whose namespace is not registered is ignored.
    #[instrument(skip(self, port), fields(port = %port.name))]
    pub async fn add_pod_to_namespace(&self, namespace: &str, port: &LogicalPortInfo) -> Result<()> {
        let Some(info) = self.registry.get_locked(namespace).await else {
            debug!("Pod add for unknown namespace ignored");
            self.stats.lock().pod_events_ignored += 1;
            return Ok(());
        };

        let result = self.apply_pod_add(&info, port).await;
        self.finish_pod_event(&result);
        result
    }

    /// Removes a pod's addresses from its namespace.
    ///
    /// A pod whose namespace is not registered is ignored.
    #[instrument(skip(self, port), fields(port = %port.name))]
    pub async fn delete_pod_from_namespace(
        &self,
        namespace: &str,
        port: &LogicalPortInfo,
    ) -> Result<()> {
        let Some(info) = self.registry.get_locked(namespace).await else {
            debug!("Pod delete for unknown namespace ignored");
            self.stats.lock().pod_events_ignored += 1;
            return Ok(());
        };

        let result = self.apply_pod_delete(&info, port).await;
        self.finish_pod_event(&result);
        result
    }

    async fn apply_pod_add(&self, info: &NamespaceGuard, port: &LogicalPortInfo) -> Result<()> {
        let set = info
            .address_set()
            .ok_or_else(|| NamespaceOrchError::AddressSetMissing(info.name().to_string()))?;
        set.add_ips(&port.ips)
            .await
            .map_err(NamespaceOrchError::backend(info.name(), "add pod addresses"))?;

        if self.config.enable_multicast && info.multicast_enabled() {
            self.pod_add_allow_multicast(info.name(), port).await?;
        }
        Ok(())
    }

    async fn apply_pod_delete(&self, info: &NamespaceGuard, port: &LogicalPortInfo) -> Result<()> {
        let set = info
            .address_set()
            .ok_or_else(|| NamespaceOrchError::AddressSetMissing(info.name().to_string()))?;
        set.delete_ips(&port.ips)
            .await
            .map_err(NamespaceOrchError::backend(info.name(), "delete pod addresses"))?;

        if self.config.enable_multicast && info.multicast_enabled() {
            self.pod_delete_allow_multicast(info.name(), port).await?;
        }
        Ok(())
    }

    fn finish_pod_event(&self, result: &Result<()>) {
        let mut stats = self.stats.lock();
        match result {
            Ok(()) => stats.pod_events_applied += 1,
            Err(NamespaceOrchError::Backend { .. }) => stats.backend_errors += 1,
            Err(_) => {}
        }
    }

    /// Locks a registered namespace, for subsystems sharing its state.
    pub async fn get_namespace_locked(&self, namespace: &str) -> Option<NamespaceGuard> {
        self.registry.get_locked(namespace).await
    }

    /// Waits up to the configured timeout for `namespace` to be added, then
    /// locks it.
    pub async fn wait_for_namespace_locked(&self, namespace: &str) -> Result<NamespaceGuard> {
        let guard = self
            .registry
            .wait_locked(
                namespace,
                self.config.wait_timeout,
                self.config.wait_poll_interval,
            )
            .await?;
        Ok(guard)
    }

    pub async fn namespace_snapshot(&self, namespace: &str) -> Option<NamespaceSnapshot> {
        let info = self.registry.get_locked(namespace).await?;
        Some(info.snapshot())
    }

    /// Hybrid overlay overrides of a namespace, waiting for it to be added.
    pub async fn hybrid_overlay_overrides(&self, namespace: &str) -> Result<HybridOverlayOverrides> {
        let info = self.wait_for_namespace_locked(namespace).await?;
        Ok(info.hybrid_overlay())
    }

    /// Creates the cluster-wide default multicast deny policy when
    /// multicast support is on.
    pub async fn init_multicast(&self) -> NbResult<()> {
        if !self.config.enable_multicast {
            return Ok(());
        }
        self.policies.create_default_deny_multicast().await?;
        info!("Default multicast deny policy installed");
        Ok(())
    }

    /// Destroys namespace address sets for namespaces not in `expected`.
    pub async fn sync_namespaces<S: AsRef<str>>(&self, expected: &[S]) -> NbResult<ReconcileReport> {
        let report = NamespaceReconciler::new(Arc::clone(&self.address_sets))
            .reconcile(expected)
            .await?;
        if !report.failed.is_empty() {
            self.stats.lock().backend_errors += report.failed.len() as u64;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{HYBRID_OVERLAY_EXTERNAL_GW_ANNOTATION, HYBRID_OVERLAY_VTEP_ANNOTATION};
    use crate::cache::ObjectCache;
    use crate::types::Pod;
    use ovn_nb_test::{FakeNorthbound, NbOp, NbVerifier};
    use pretty_assertions::assert_eq;
    use std::net::IpAddr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn setup() -> (NamespaceOrch, FakeNorthbound, Arc<ObjectCache>) {
        let nb = FakeNorthbound::new();
        let cache = Arc::new(ObjectCache::new());
        let orch = NamespaceOrch::new(
            NamespaceOrchConfig::default(),
            Arc::new(nb.clone()),
            Arc::new(nb.clone()),
            cache.clone(),
        );
        (orch, nb, cache)
    }

    fn port(ns: &str, pod: &str, addr: &str) -> LogicalPortInfo {
        LogicalPortInfo::new(crate::types::logical_port_name(ns, pod), "", vec![ip(addr)])
    }

    #[tokio::test]
    async fn test_add_namespace_seeds_address_set() {
        let (orch, nb, cache) = setup();
        cache.upsert_pod(Pod::new("ns1", "a").with_ip("10.0.0.1"));
        cache.upsert_pod(Pod::new("ns1", "h").with_ip("192.168.0.9").with_host_network());
        cache.upsert_pod(Pod::new("ns1", "pending"));

        orch.add_namespace(&Namespace::new("ns1")).await;

        NbVerifier::new(&nb)
            .assert_address_set("ns1", &[ip("10.0.0.1")])
            .unwrap();
        assert!(orch.registry().contains("ns1"));
        assert_eq!(orch.stats().namespaces_added, 1);
    }

    #[tokio::test]
    async fn test_add_namespace_survives_address_set_failure() {
        let (orch, nb, _cache) = setup();
        nb.fail_on(NbOp::CreateAddressSet);

        orch.add_namespace(&Namespace::new("ns1")).await;

        let snapshot = orch.namespace_snapshot("ns1").await.unwrap();
        assert_eq!(snapshot.address_set, None);
        assert_eq!(orch.stats().backend_errors, 1);

        let err = orch
            .add_pod_to_namespace("ns1", &port("ns1", "a", "10.0.0.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, NamespaceOrchError::AddressSetMissing(_)));
    }

    #[tokio::test]
    async fn test_pod_add_and_delete() {
        let (orch, nb, _cache) = setup();
        orch.add_namespace(&Namespace::new("ns1")).await;

        orch.add_pod_to_namespace("ns1", &port("ns1", "a", "10.0.0.1"))
            .await
            .unwrap();
        orch.add_pod_to_namespace("ns1", &port("ns1", "b", "10.0.0.2"))
            .await
            .unwrap();
        orch.delete_pod_from_namespace("ns1", &port("ns1", "a", "10.0.0.1"))
            .await
            .unwrap();

        NbVerifier::new(&nb)
            .assert_address_set("ns1", &[ip("10.0.0.2")])
            .unwrap();
        assert_eq!(orch.stats().pod_events_applied, 3);
    }

    #[tokio::test]
    async fn test_pod_backend_error_is_returned() {
        let (orch, nb, _cache) = setup();
        orch.add_namespace(&Namespace::new("ns1")).await;
        nb.fail_on(NbOp::AddIps);

        let err = orch
            .add_pod_to_namespace("ns1", &port("ns1", "a", "10.0.0.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, NamespaceOrchError::Backend { .. }));
        assert_eq!(orch.stats().backend_errors, 1);
    }

    #[tokio::test]
    async fn test_update_replaces_hybrid_overlay() {
        let (orch, _nb, _cache) = setup();
        let old = Namespace::new("ns1")
            .with_annotation(HYBRID_OVERLAY_EXTERNAL_GW_ANNOTATION, "10.1.1.1")
            .with_annotation(HYBRID_OVERLAY_VTEP_ANNOTATION, "10.1.1.2");
        orch.add_namespace(&old).await;

        let overrides = orch.hybrid_overlay_overrides("ns1").await.unwrap();
        assert_eq!(overrides.external_gw, Some(ip("10.1.1.1")));
        assert_eq!(overrides.vtep, Some(ip("10.1.1.2")));

        let new = Namespace::new("ns1").with_annotation(HYBRID_OVERLAY_VTEP_ANNOTATION, "10.1.1.x");
        orch.update_namespace(&old, &new).await;

        let overrides = orch.hybrid_overlay_overrides("ns1").await.unwrap();
        assert_eq!(overrides, HybridOverlayOverrides::default());
        assert_eq!(orch.stats().annotation_errors, 1);
    }

    #[tokio::test]
    async fn test_update_unknown_namespace_is_ignored() {
        let (orch, _nb, _cache) = setup();
        let ns = Namespace::new("ghost");
        orch.update_namespace(&ns, &ns).await;
        assert!(!orch.registry().contains("ghost"));
        assert_eq!(orch.stats().namespaces_updated, 0);
    }

    #[tokio::test]
    async fn test_delete_destroys_address_set() {
        let (orch, nb, _cache) = setup();
        orch.add_namespace(&Namespace::new("ns1")).await;

        orch.delete_namespace("ns1").await;
        orch.delete_namespace("ns1").await;

        NbVerifier::new(&nb).assert_no_address_set("ns1").unwrap();
        assert!(!orch.registry().contains("ns1"));
        assert_eq!(orch.stats().namespaces_deleted, 1);
        assert_eq!(nb.count_calls(NbOp::DestroyAddressSet, "ns1"), 1);
    }

    #[tokio::test]
    async fn test_init_multicast_requires_support() {
        let (orch, nb, _cache) = setup();
        orch.init_multicast().await.unwrap();
        assert!(!nb.default_deny_installed());
    }

    #[tokio::test]
    async fn test_sync_namespaces_counts_failures() {
        let (orch, nb, _cache) = setup();
        nb.seed_address_set(AddressSetName::namespace_set("stale"), &[]);
        nb.fail_on(NbOp::DestroyAddressSetInBackingStore);

        let report = orch.sync_namespaces::<&str>(&[]).await.unwrap();
        assert_eq!(report.failed, vec!["stale".to_string()]);
        assert_eq!(orch.stats().backend_errors, 1);
    }
}
