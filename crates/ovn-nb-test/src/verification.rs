//! Verification helpers for testing the namespace controller
//!
//! Provides assertion helpers over the state of a [`FakeNorthbound`].

use crate::fake::{FakeNorthbound, NbOp};
use std::collections::BTreeSet;
use std::net::IpAddr;
use thiserror::Error;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected address set for namespace '{namespace}' not found")]
    AddressSetNotFound { namespace: String },

    #[error("Unexpected address set for namespace '{namespace}'")]
    UnexpectedAddressSet { namespace: String },

    #[error("Address set members mismatch for '{namespace}': expected {expected:?}, got {actual:?}")]
    MembersMismatch {
        namespace: String,
        expected: BTreeSet<IpAddr>,
        actual: BTreeSet<IpAddr>,
    },

    #[error("Port group for '{namespace}': expected present={expected}, got present={actual}")]
    PortGroupMismatch {
        namespace: String,
        expected: bool,
        actual: bool,
    },

    #[error("Port group ports mismatch for '{namespace}': expected {expected:?}, got {actual:?}")]
    PortsMismatch {
        namespace: String,
        expected: BTreeSet<String>,
        actual: BTreeSet<String>,
    },

    #[error("Multicast allow for '{namespace}': expected {expected}, got {actual}")]
    MulticastMismatch {
        namespace: String,
        expected: bool,
        actual: bool,
    },

    #[error("Expected {expected} {op:?} calls against '{target}', found {actual}")]
    CallCountMismatch {
        op: NbOp,
        target: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Northbound state verification helper
pub struct NbVerifier<'a> {
    nb: &'a FakeNorthbound,
}

impl<'a> NbVerifier<'a> {
    /// Create a new verifier over `nb`
    pub fn new(nb: &'a FakeNorthbound) -> Self {
        Self { nb }
    }

    /// Verify the namespace-level address set holds exactly `expected`
    pub fn assert_address_set(&self, namespace: &str, expected: &[IpAddr]) -> VerifyResult<()> {
        let actual = self.nb.namespace_address_set(namespace).ok_or_else(|| {
            VerificationError::AddressSetNotFound {
                namespace: namespace.to_string(),
            }
        })?;
        let expected: BTreeSet<IpAddr> = expected.iter().copied().collect();
        if actual != expected {
            return Err(VerificationError::MembersMismatch {
                namespace: namespace.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify the namespace has no namespace-level address set
    pub fn assert_no_address_set(&self, namespace: &str) -> VerifyResult<()> {
        if self.nb.namespace_address_set(namespace).is_some() {
            return Err(VerificationError::UnexpectedAddressSet {
                namespace: namespace.to_string(),
            });
        }
        Ok(())
    }

    /// Verify whether the namespace port group exists
    pub fn assert_port_group(&self, namespace: &str, expected: bool) -> VerifyResult<()> {
        let actual = self.nb.port_group(namespace).is_some();
        if actual != expected {
            return Err(VerificationError::PortGroupMismatch {
                namespace: namespace.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify the namespace port group holds exactly `expected` ports
    pub fn assert_port_group_ports(&self, namespace: &str, expected: &[&str]) -> VerifyResult<()> {
        let (_, actual) =
            self.nb
                .port_group(namespace)
                .ok_or_else(|| VerificationError::PortGroupMismatch {
                    namespace: namespace.to_string(),
                    expected: true,
                    actual: false,
                })?;
        let expected: BTreeSet<String> = expected.iter().map(|p| p.to_string()).collect();
        if actual != expected {
            return Err(VerificationError::PortsMismatch {
                namespace: namespace.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify whether multicast allow ACLs exist for the namespace
    pub fn assert_multicast(&self, namespace: &str, expected: bool) -> VerifyResult<()> {
        let actual = self.nb.has_multicast_allow(namespace);
        if actual != expected {
            return Err(VerificationError::MulticastMismatch {
                namespace: namespace.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify the number of recorded `op` calls against `target`
    pub fn assert_call_count(&self, op: NbOp, target: &str, expected: usize) -> VerifyResult<()> {
        let actual = self.nb.count_calls(op, target);
        if actual != expected {
            return Err(VerificationError::CallCountMismatch {
                op,
                target: target.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}
