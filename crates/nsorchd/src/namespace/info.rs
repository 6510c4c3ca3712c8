//! Per-namespace network state.

use ovn_nb_common::{AddressSet, NbResult, PolicyStore, PortGroupId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::warn;

use crate::annotations::{
    parse_ip_annotation, HYBRID_OVERLAY_EXTERNAL_GW_ANNOTATION, HYBRID_OVERLAY_VTEP_ANNOTATION,
};
use crate::types::Namespace;

/// Network policy state kept by the policy controller under the namespace lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespacePolicy {
    pub name: String,
    pub port_group: Option<PortGroupId>,
}

/// Mutable state of one namespace.
///
/// Only reachable through a guard handed out by
/// [`NamespaceRegistry`](super::NamespaceRegistry), so every access holds
/// the entry lock.
#[derive(Debug)]
pub struct NamespaceInfo {
    name: String,
    pub(crate) address_set: Option<Box<dyn AddressSet>>,
    pub(crate) multicast_enabled: bool,
    pub(crate) port_group_id: Option<PortGroupId>,
    pub(crate) hybrid_overlay_external_gw: Option<IpAddr>,
    pub(crate) hybrid_overlay_vtep: Option<IpAddr>,
    /// Owned by the network policy controller.
    pub network_policies: HashMap<String, NamespacePolicy>,
}

/// Read-only copy of a namespace's state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSnapshot {
    pub name: String,
    /// Hashed backend name of the address set, if one was created.
    pub address_set: Option<String>,
    pub multicast_enabled: bool,
    pub port_group_id: Option<PortGroupId>,
    pub hybrid_overlay_external_gw: Option<IpAddr>,
    pub hybrid_overlay_vtep: Option<IpAddr>,
    pub network_policies: Vec<String>,
}

/// Hybrid overlay values served to the overlay subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridOverlayOverrides {
    pub external_gw: Option<IpAddr>,
    pub vtep: Option<IpAddr>,
}

impl NamespaceInfo {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address_set: None,
            multicast_enabled: false,
            port_group_id: None,
            hybrid_overlay_external_gw: None,
            hybrid_overlay_vtep: None,
            network_policies: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address_set(&self) -> Option<&dyn AddressSet> {
        self.address_set.as_deref()
    }

    pub fn multicast_enabled(&self) -> bool {
        self.multicast_enabled
    }

    pub fn port_group_id(&self) -> Option<&PortGroupId> {
        self.port_group_id.as_ref()
    }

    pub fn hybrid_overlay(&self) -> HybridOverlayOverrides {
        HybridOverlayOverrides {
            external_gw: self.hybrid_overlay_external_gw,
            vtep: self.hybrid_overlay_vtep,
        }
    }

    pub fn snapshot(&self) -> NamespaceSnapshot {
        let mut network_policies: Vec<String> = self.network_policies.keys().cloned().collect();
        network_policies.sort();
        NamespaceSnapshot {
            name: self.name.clone(),
            address_set: self.address_set.as_ref().map(|set| set.hashed_name()),
            multicast_enabled: self.multicast_enabled,
            port_group_id: self.port_group_id.clone(),
            hybrid_overlay_external_gw: self.hybrid_overlay_external_gw,
            hybrid_overlay_vtep: self.hybrid_overlay_vtep,
            network_policies,
        }
    }

    /// Replaces both hybrid overlay overrides from the namespace annotations.
    ///
    /// Absent or malformed annotations clear the override. Returns the number
    /// of malformed annotations.
    pub(crate) fn update_hybrid_overlay(&mut self, ns: &Namespace) -> u64 {
        let mut errors = 0;
        let mut parse = |key: &str| match parse_ip_annotation(ns, key) {
            Ok(ip) => ip,
            Err(e) => {
                warn!(namespace = %ns.name, error = %e, "Ignoring malformed annotation");
                errors += 1;
                None
            }
        };
        self.hybrid_overlay_external_gw = parse(HYBRID_OVERLAY_EXTERNAL_GW_ANNOTATION);
        self.hybrid_overlay_vtep = parse(HYBRID_OVERLAY_VTEP_ANNOTATION);
        errors
    }

    /// Provisions or removes the namespace port group.
    ///
    /// Creation is skipped when a port group is already recorded. Removal is
    /// always requested and the recorded id is cleared even if it fails.
    pub(crate) async fn update_port_group(
        &mut self,
        policies: &dyn PolicyStore,
        provisioned: bool,
    ) -> NbResult<()> {
        if provisioned {
            if self.port_group_id.is_some() {
                return Ok(());
            }
            let id = policies.create_port_group(&self.name).await?;
            self.port_group_id = Some(id);
            Ok(())
        } else {
            let result = policies.delete_port_group(&self.name).await;
            self.port_group_id = None;
            result
        }
    }
}
