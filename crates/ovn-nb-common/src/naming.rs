//! Backend object naming.
//!
//! OVN object names are limited in what characters they may contain, so
//! every logical name is hashed into `a<decimal fnv64a>`. The logical
//! name is kept in `external_ids:name` so the controller can map backend
//! objects back to namespaces.
//!
//! Address-set logical names follow `<namespace>[.<suffix>]`. An empty
//! suffix marks the namespace-level set holding every pod IP of that
//! namespace; other consumers (network policies, egress rules) append a
//! suffix and are never touched by namespace reconciliation.

use serde::{Deserialize, Serialize};
use std::fmt;

const FNV64_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Separator between the namespace and the suffix of an address-set name.
pub const ADDRESS_SET_SEPARATOR: char = '.';

/// Hashes a logical name into an OVN-safe object name.
///
/// ```
/// use ovn_nb_common::hash_for_ovn;
///
/// assert!(hash_for_ovn("default").starts_with('a'));
/// assert_eq!(hash_for_ovn("default"), hash_for_ovn("default"));
/// ```
pub fn hash_for_ovn(name: &str) -> String {
    let hash = name.bytes().fold(FNV64_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV64_PRIME)
    });
    format!("a{}", hash)
}

/// Returns the backend name of the port group shared by a namespace.
pub fn hashed_port_group(namespace: &str) -> String {
    hash_for_ovn(namespace)
}

/// A parsed address-set logical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressSetName {
    /// Namespace the set belongs to.
    pub namespace: String,
    /// Consumer-specific suffix; empty for the namespace-level set.
    pub suffix: String,
}

impl AddressSetName {
    /// Name of the namespace-level set.
    pub fn namespace_set(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            suffix: String::new(),
        }
    }

    /// Name of a consumer-specific set within a namespace.
    pub fn with_suffix(namespace: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            suffix: suffix.into(),
        }
    }

    /// Parses a logical name as stored in `external_ids:name`.
    ///
    /// Returns `None` for an empty name.
    pub fn parse(name: &str) -> Option<Self> {
        if name.is_empty() {
            return None;
        }
        let (namespace, suffix) = name
            .split_once(ADDRESS_SET_SEPARATOR)
            .unwrap_or((name, ""));
        if namespace.is_empty() {
            return None;
        }
        Some(Self::with_suffix(namespace, suffix))
    }

    /// Returns true if this is a namespace-level set.
    pub fn is_namespace_set(&self) -> bool {
        self.suffix.is_empty()
    }

    /// Returns the hashed backend name.
    pub fn hashed(&self) -> String {
        hash_for_ovn(&self.to_string())
    }
}

impl fmt::Display for AddressSetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.suffix.is_empty() {
            write!(f, "{}", self.namespace)
        } else {
            write!(f, "{}{}{}", self.namespace, ADDRESS_SET_SEPARATOR, self.suffix)
        }
    }
}
