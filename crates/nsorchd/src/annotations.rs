//! Namespace annotations consumed by the controller.

use std::net::IpAddr;
use thiserror::Error;

use crate::types::Namespace;

/// Enables multicast for the namespace when set to exactly `"true"`.
pub const MULTICAST_ENABLED_ANNOTATION: &str = "k8s.ovn.org/multicast-enabled";

/// Hybrid overlay external gateway override.
pub const HYBRID_OVERLAY_EXTERNAL_GW_ANNOTATION: &str = "k8s.ovn.org/hybrid-overlay-external-gw";

/// Hybrid overlay VTEP override.
pub const HYBRID_OVERLAY_VTEP_ANNOTATION: &str = "k8s.ovn.org/hybrid-overlay-vtep";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid IP in annotation {key}: {value:?}")]
pub struct AnnotationError {
    pub key: String,
    pub value: String,
}

/// Returns the multicast state requested by the namespace.
pub fn multicast_enabled(ns: &Namespace) -> bool {
    ns.annotation(MULTICAST_ENABLED_ANNOTATION) == Some("true")
}

/// Parses an IP literal annotation. An absent or empty annotation is
/// `Ok(None)`.
pub fn parse_ip_annotation(ns: &Namespace, key: &str) -> Result<Option<IpAddr>, AnnotationError> {
    match ns.annotation(key).map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| AnnotationError {
                key: key.to_string(),
                value: value.to_string(),
            }),
    }
}
