//! Port group and multicast policy abstractions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::NbResult;

/// Priority of the cluster-wide default multicast deny ACLs.
pub const DEFAULT_MCAST_DENY_PRIORITY: u16 = 1011;

/// Priority of the per-namespace multicast allow ACLs.
pub const DEFAULT_MCAST_ALLOW_PRIORITY: u16 = 1012;

/// Match expression selecting IPv4 multicast traffic.
pub const MCAST_MATCH: &str = "ip4.mcast";

/// Backend identifier (row UUID) of a provisioned port group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortGroupId(pub String);

impl PortGroupId {
    /// Creates a new port group identifier.
    pub fn new(uuid: impl Into<String>) -> Self {
        Self(uuid.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traffic direction of an ACL, from the logical switch's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AclDirection {
    /// Traffic leaving a pod (`from-lport`).
    Egress,
    /// Traffic arriving at a pod (`to-lport`).
    Ingress,
}

impl AclDirection {
    /// Returns the OVN direction keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            AclDirection::Egress => "from-lport",
            AclDirection::Ingress => "to-lport",
        }
    }

    /// Builds the match expression restricting `matcher` to ports in `port_group`.
    pub fn port_group_match(&self, port_group: &str, matcher: &str) -> String {
        match self {
            AclDirection::Egress => format!("inport == @{} && {}", port_group, matcher),
            AclDirection::Ingress => format!("outport == @{} && {}", port_group, matcher),
        }
    }
}

/// Create/delete contract for namespace port groups and multicast ACLs.
///
/// Port groups are addressed by namespace; implementations derive the
/// backend name with [`crate::hashed_port_group`]. Logical ports are
/// identified by their logical switch port UUID.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Creates the namespace port group and returns its identifier.
    async fn create_port_group(&self, namespace: &str) -> NbResult<PortGroupId>;

    /// Deletes the namespace port group. Deleting a missing group is not an error.
    async fn delete_port_group(&self, namespace: &str) -> NbResult<()>;

    /// Adds logical ports to the namespace port group.
    async fn add_ports_to_port_group(&self, namespace: &str, port_uuids: &[String]) -> NbResult<()>;

    /// Removes logical ports from the namespace port group.
    async fn remove_ports_from_port_group(
        &self,
        namespace: &str,
        port_uuids: &[String],
    ) -> NbResult<()>;

    /// Creates the ingress and egress multicast allow ACLs for the
    /// namespace port group, which must already exist.
    async fn create_multicast_allow(&self, namespace: &str) -> NbResult<()>;

    /// Removes the multicast allow ACLs of the namespace.
    async fn delete_multicast_allow(&self, namespace: &str) -> NbResult<()>;

    /// Creates the cluster-wide default multicast deny ACLs.
    async fn create_default_deny_multicast(&self) -> NbResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_direction_match() {
        assert_eq!(
            AclDirection::Egress.port_group_match("a1", MCAST_MATCH),
            "inport == @a1 && ip4.mcast"
        );
        assert_eq!(
            AclDirection::Ingress.port_group_match("a1", MCAST_MATCH),
            "outport == @a1 && ip4.mcast"
        );
        assert_eq!(AclDirection::Egress.as_str(), "from-lport");
        assert_eq!(AclDirection::Ingress.as_str(), "to-lport");
    }

    #[test]
    fn test_port_group_id() {
        let id = PortGroupId::new("7f1c");
        assert_eq!(id.as_str(), "7f1c");
        assert_eq!(id.to_string(), "7f1c");
    }
}
