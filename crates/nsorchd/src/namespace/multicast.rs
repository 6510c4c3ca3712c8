//! Per-namespace multicast policy.
//!
//! The multicast annotation is edge-triggered: backend calls are only made
//! when the requested state differs from the recorded one. Enabling
//! provisions the namespace port group, the allow ACLs, and the logical
//! ports of every pod already in the namespace. Disabling removes the ACLs
//! and the port group.

use tracing::{error, info, warn};

use super::info::NamespaceInfo;
use super::orch::NamespaceOrch;
use crate::annotations;
use crate::error::{NamespaceOrchError, Result};
use crate::types::{LogicalPortInfo, Namespace};

impl NamespaceOrch {
    /// Applies the namespace's multicast annotation.
    ///
    /// The requested state is recorded even when the backend calls fail.
    pub(super) async fn multicast_update_namespace(&self, ns: &Namespace, info: &mut NamespaceInfo) {
        if !self.config.enable_multicast {
            return;
        }
        let enabled = annotations::multicast_enabled(ns);
        if enabled == info.multicast_enabled {
            return;
        }

        let result = if enabled {
            self.create_multicast_allow_policy(info).await
        } else {
            self.delete_multicast_allow_policy(info).await
        };
        info.multicast_enabled = enabled;

        {
            let mut stats = self.stats.lock();
            if enabled {
                stats.multicast_enabled += 1;
            } else {
                stats.multicast_disabled += 1;
            }
        }

        match result {
            Ok(()) => info!(namespace = %ns.name, enabled, "Multicast policy updated"),
            Err(e) => {
                error!(namespace = %ns.name, enabled, error = %e, "Failed to update multicast policy");
                self.record_backend_error();
            }
        }
    }

    /// Removes the multicast policy of a namespace being deleted.
    pub(super) async fn multicast_delete_namespace(&self, info: &mut NamespaceInfo) {
        if !info.multicast_enabled {
            return;
        }
        info.multicast_enabled = false;
        if let Err(e) = self.delete_multicast_allow_policy(info).await {
            error!(namespace = %info.name(), error = %e, "Failed to delete multicast policy");
            self.record_backend_error();
        }
    }

    async fn create_multicast_allow_policy(&self, info: &mut NamespaceInfo) -> Result<()> {
        let namespace = info.name().to_string();
        info.update_port_group(self.policies.as_ref(), true)
            .await
            .map_err(NamespaceOrchError::backend(&namespace, "create port group"))?;

        self.policies
            .create_multicast_allow(&namespace)
            .await
            .map_err(NamespaceOrchError::backend(&namespace, "create multicast allow"))?;

        let pods = match self.pods.pods(&namespace) {
            Ok(pods) => pods,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Failed to list pods for multicast");
                Vec::new()
            }
        };
        let mut port_uuids = Vec::new();
        for pod in pods.iter().filter(|pod| pod.has_pod_network_ip()) {
            let name = pod.logical_port_name();
            match self.pods.logical_port(&name) {
                Some(port) if !port.uuid.is_empty() => port_uuids.push(port.uuid),
                _ => warn!(namespace = %namespace, port = %name, "Logical port not found"),
            }
        }
        if !port_uuids.is_empty() {
            self.policies
                .add_ports_to_port_group(&namespace, &port_uuids)
                .await
                .map_err(NamespaceOrchError::backend(&namespace, "add ports to port group"))?;
        }
        Ok(())
    }

    /// Deletes the allow ACLs, then the port group. The port group is
    /// removed even if the ACL deletion fails.
    async fn delete_multicast_allow_policy(&self, info: &mut NamespaceInfo) -> Result<()> {
        let namespace = info.name().to_string();
        let acls = self
            .policies
            .delete_multicast_allow(&namespace)
            .await
            .map_err(NamespaceOrchError::backend(&namespace, "delete multicast allow"));
        let port_group = info
            .update_port_group(self.policies.as_ref(), false)
            .await
            .map_err(NamespaceOrchError::backend(&namespace, "delete port group"));
        acls.and(port_group)
    }

    pub(super) async fn pod_add_allow_multicast(
        &self,
        namespace: &str,
        port: &LogicalPortInfo,
    ) -> Result<()> {
        if port.uuid.is_empty() {
            warn!(namespace, port = %port.name, "Logical port UUID unknown, not added to port group");
            return Ok(());
        }
        self.policies
            .add_ports_to_port_group(namespace, std::slice::from_ref(&port.uuid))
            .await
            .map_err(NamespaceOrchError::backend(namespace, "add port to port group"))
    }

    pub(super) async fn pod_delete_allow_multicast(
        &self,
        namespace: &str,
        port: &LogicalPortInfo,
    ) -> Result<()> {
        if port.uuid.is_empty() {
            return Ok(());
        }
        self.policies
            .remove_ports_from_port_group(namespace, std::slice::from_ref(&port.uuid))
            .await
            .map_err(NamespaceOrchError::backend(namespace, "remove port from port group"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::MULTICAST_ENABLED_ANNOTATION;
    use crate::cache::ObjectCache;
    use crate::namespace::NamespaceOrchConfig;
    use crate::types::Pod;
    use ovn_nb_test::{FakeNorthbound, NbOp, NbVerifier};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn setup(enable_multicast: bool) -> (NamespaceOrch, FakeNorthbound, Arc<ObjectCache>) {
        let nb = FakeNorthbound::new();
        let cache = Arc::new(ObjectCache::new());
        let config = NamespaceOrchConfig {
            enable_multicast,
            ..Default::default()
        };
        let orch = NamespaceOrch::new(config, Arc::new(nb.clone()), Arc::new(nb.clone()), cache.clone());
        (orch, nb, cache)
    }

    fn mcast(name: &str, value: &str) -> Namespace {
        Namespace::new(name).with_annotation(MULTICAST_ENABLED_ANNOTATION, value)
    }

    #[tokio::test]
    async fn test_toggle_is_edge_triggered() {
        let (orch, nb, _cache) = setup(true);
        let on = mcast("ns1", "true");
        orch.add_namespace(&on).await;
        orch.update_namespace(&on, &on).await;
        orch.update_namespace(&on, &on).await;
        assert_eq!(nb.count_calls(NbOp::CreateMulticastAllow, "ns1"), 1);

        let off = Namespace::new("ns1");
        orch.update_namespace(&on, &off).await;
        orch.update_namespace(&off, &off).await;
        assert_eq!(nb.count_calls(NbOp::DeleteMulticastAllow, "ns1"), 1);

        let stats = orch.stats();
        assert_eq!(stats.multicast_enabled, 1);
        assert_eq!(stats.multicast_disabled, 1);
    }

    #[tokio::test]
    async fn test_port_group_follows_flag() {
        let (orch, nb, _cache) = setup(true);
        let verifier = NbVerifier::new(&nb);
        let off = Namespace::new("ns1");
        let on = mcast("ns1", "true");

        orch.add_namespace(&off).await;
        verifier.assert_port_group("ns1", false).unwrap();

        orch.update_namespace(&off, &on).await;
        verifier.assert_port_group("ns1", true).unwrap();
        verifier.assert_multicast("ns1", true).unwrap();
        assert!(orch.namespace_snapshot("ns1").await.unwrap().port_group_id.is_some());

        orch.update_namespace(&on, &off).await;
        verifier.assert_port_group("ns1", false).unwrap();
        verifier.assert_multicast("ns1", false).unwrap();
        assert!(orch.namespace_snapshot("ns1").await.unwrap().port_group_id.is_none());
    }

    #[tokio::test]
    async fn test_multicast_support_disabled_is_noop() {
        let (orch, nb, _cache) = setup(false);
        orch.add_namespace(&mcast("ns1", "true")).await;

        assert!(!orch.namespace_snapshot("ns1").await.unwrap().multicast_enabled);
        assert_eq!(nb.count_calls(NbOp::CreatePortGroup, "ns1"), 0);
    }

    #[tokio::test]
    async fn test_enable_adds_existing_pod_ports() {
        let (orch, nb, cache) = setup(true);
        cache.upsert_pod(Pod::new("ns1", "a").with_ip("10.0.0.1"));
        cache.upsert_pod(Pod::new("ns1", "b").with_ip("10.0.0.2"));
        cache.upsert_pod(Pod::new("ns1", "h").with_ip("192.168.0.1").with_host_network());
        cache.set_logical_port(LogicalPortInfo::new("ns1_a", "lsp-a", vec![]));
        cache.set_logical_port(LogicalPortInfo::new("ns1_b", "lsp-b", vec![]));

        orch.add_namespace(&mcast("ns1", "true")).await;

        NbVerifier::new(&nb)
            .assert_port_group_ports("ns1", &["lsp-a", "lsp-b"])
            .unwrap();
    }

    #[tokio::test]
    async fn test_pod_events_update_port_group() {
        let (orch, nb, _cache) = setup(true);
        orch.add_namespace(&mcast("ns1", "true")).await;

        let port = LogicalPortInfo::new("ns1_a", "lsp-a", vec!["10.0.0.1".parse().unwrap()]);
        orch.add_pod_to_namespace("ns1", &port).await.unwrap();
        NbVerifier::new(&nb)
            .assert_port_group_ports("ns1", &["lsp-a"])
            .unwrap();

        orch.delete_pod_from_namespace("ns1", &port).await.unwrap();
        NbVerifier::new(&nb)
            .assert_port_group_ports("ns1", &[])
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_enable_still_commits_flag() {
        let (orch, nb, _cache) = setup(true);
        nb.fail_on(NbOp::CreateMulticastAllow);

        orch.add_namespace(&mcast("ns1", "true")).await;

        let snapshot = orch.namespace_snapshot("ns1").await.unwrap();
        assert!(snapshot.multicast_enabled);
        assert_eq!(orch.stats().backend_errors, 1);

        // Same value again: no retry.
        let on = mcast("ns1", "true");
        orch.update_namespace(&on, &on).await;
        assert_eq!(nb.count_calls(NbOp::CreateMulticastAllow, "ns1"), 1);
    }

    #[tokio::test]
    async fn test_disable_removes_port_group_when_acl_delete_fails() {
        let (orch, nb, _cache) = setup(true);
        let on = mcast("ns1", "true");
        orch.add_namespace(&on).await;
        nb.fail_on(NbOp::DeleteMulticastAllow);

        orch.update_namespace(&on, &Namespace::new("ns1")).await;

        NbVerifier::new(&nb).assert_port_group("ns1", false).unwrap();
        let snapshot = orch.namespace_snapshot("ns1").await.unwrap();
        assert!(!snapshot.multicast_enabled);
        assert!(snapshot.port_group_id.is_none());
    }

    #[tokio::test]
    async fn test_delete_namespace_removes_multicast_policy() {
        let (orch, nb, _cache) = setup(true);
        orch.add_namespace(&mcast("ns1", "true")).await;

        orch.delete_namespace("ns1").await;

        let verifier = NbVerifier::new(&nb);
        verifier.assert_multicast("ns1", false).unwrap();
        verifier.assert_port_group("ns1", false).unwrap();
        verifier.assert_no_address_set("ns1").unwrap();
        verifier
            .assert_call_count(NbOp::DeleteMulticastAllow, "ns1", 1)
            .unwrap();
    }
}
