//! Orchestrator object types consumed by the namespace controller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{AddrParseError, IpAddr};
use tracing::warn;

/// Returns the logical switch port name of a pod.
pub fn logical_port_name(namespace: &str, pod: &str) -> String {
    format!("{}_{}", namespace, pod)
}

/// A cluster namespace as delivered by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Builder-style annotation setter.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// A pod as delivered by the orchestrator.
///
/// Only the fields relevant to address-set membership are carried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub host_network: bool,
    /// Primary address; empty until the pod is scheduled and running.
    #[serde(default)]
    pub pod_ip: String,
    /// All assigned addresses (dual-stack). Falls back to `pod_ip` when empty.
    #[serde(default)]
    pub pod_ips: Vec<String>,
}

impl Pod {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Builder-style address setter; the first address becomes `pod_ip`.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        let ip = ip.into();
        if self.pod_ip.is_empty() {
            self.pod_ip = ip.clone();
        }
        self.pod_ips.push(ip);
        self
    }

    pub fn with_host_network(mut self) -> Self {
        self.host_network = true;
        self
    }

    pub fn logical_port_name(&self) -> String {
        logical_port_name(&self.namespace, &self.name)
    }

    /// Returns true if the pod's addresses belong in the namespace address set.
    pub fn has_pod_network_ip(&self) -> bool {
        !self.host_network && !self.pod_ip.is_empty()
    }

    /// Parses the pod's addresses.
    ///
    /// Host-network pods and pods without an assigned address yield an
    /// empty list.
    pub fn addresses(&self) -> Result<Vec<IpAddr>, AddrParseError> {
        if !self.has_pod_network_ip() {
            return Ok(Vec::new());
        }
        if self.pod_ips.is_empty() {
            return Ok(vec![self.pod_ip.parse()?]);
        }
        self.pod_ips.iter().map(|ip| ip.parse()).collect()
    }
}

/// Collects the addresses of every running, non-host-network pod.
///
/// Pods with an unparsable address are skipped with a warning.
pub fn collect_pod_ips(pods: &[Pod]) -> Vec<IpAddr> {
    let mut ips = Vec::new();
    for pod in pods {
        match pod.addresses() {
            Ok(addrs) => ips.extend(addrs),
            Err(e) => warn!(
                namespace = %pod.namespace,
                pod = %pod.name,
                error = %e,
                "Skipping pod with unparsable address"
            ),
        }
    }
    ips
}

/// Logical switch port of a pod, as known to the northbound database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalPortInfo {
    /// Logical port name (`<namespace>_<pod>`).
    pub name: String,
    /// Row UUID of the logical switch port; empty if not yet known.
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub ips: Vec<IpAddr>,
}

impl LogicalPortInfo {
    pub fn new(name: impl Into<String>, uuid: impl Into<String>, ips: Vec<IpAddr>) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
            ips,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_logical_port_name() {
        assert_eq!(logical_port_name("ns1", "web-0"), "ns1_web-0");
        assert_eq!(Pod::new("ns1", "web-0").logical_port_name(), "ns1_web-0");
    }

    #[test]
    fn test_pod_addresses() {
        let pod = Pod::new("ns1", "p").with_ip("10.0.0.1").with_ip("fd00::1");
        assert_eq!(
            pod.addresses().unwrap(),
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "fd00::1".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[test]
    fn test_pod_addresses_falls_back_to_pod_ip() {
        let pod = Pod {
            pod_ip: "10.0.0.7".to_string(),
            ..Pod::new("ns1", "p")
        };
        assert_eq!(pod.addresses().unwrap(), vec!["10.0.0.7".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_host_network_and_pending_pods_have_no_addresses() {
        let host = Pod::new("ns1", "h").with_ip("192.168.0.5").with_host_network();
        let pending = Pod::new("ns1", "pending");
        assert!(host.addresses().unwrap().is_empty());
        assert!(pending.addresses().unwrap().is_empty());
    }

    #[test]
    fn test_collect_pod_ips_skips_malformed() {
        let pods = vec![
            Pod::new("ns1", "a").with_ip("10.0.0.1"),
            Pod::new("ns1", "b").with_ip("not-an-ip"),
            Pod::new("ns1", "c").with_ip("10.0.0.3"),
        ];
        let ips = collect_pod_ips(&pods);
        assert_eq!(
            ips,
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "10.0.0.3".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[test]
    fn test_namespace_deserialize_without_annotations() {
        let ns: Namespace = serde_json::from_str(r#"{"name":"ns1"}"#).unwrap();
        assert_eq!(ns, Namespace::new("ns1"));
    }
}
