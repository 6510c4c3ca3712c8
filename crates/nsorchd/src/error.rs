//! Error types for nsorchd.

use ovn_nb_common::NbError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Registry acquisition errors.
///
/// Not-found and stale entries are reported as `None`, not as errors.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Timed out after {waited:?} waiting for namespace {namespace}")]
    Timeout { namespace: String, waited: Duration },
}

/// Errors surfaced by [`NamespaceOrch`](crate::NamespaceOrch) operations.
#[derive(Debug, Error)]
pub enum NamespaceOrchError {
    #[error("{operation} failed for namespace {namespace}: {source}")]
    Backend {
        namespace: String,
        operation: &'static str,
        #[source]
        source: NbError,
    },

    #[error("Namespace {0} has no address set")]
    AddressSetMissing(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl NamespaceOrchError {
    /// Returns a closure wrapping a backend error with its context.
    pub(crate) fn backend(namespace: &str, operation: &'static str) -> impl FnOnce(NbError) -> Self {
        let namespace = namespace.to_string();
        move |source| Self::Backend {
            namespace,
            operation,
            source,
        }
    }
}

/// Result type alias for namespace controller operations.
pub type Result<T> = std::result::Result<T, NamespaceOrchError>;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = NamespaceOrchError::backend("ns1", "create port group")(NbError::injected(
            "CreatePortGroup",
        ));
        assert_eq!(
            err.to_string(),
            "create port group failed for namespace ns1: Injected failure in CreatePortGroup"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = NamespaceOrchError::from(RegistryError::Timeout {
            namespace: "ns1".to_string(),
            waited: Duration::from_millis(250),
        });
        assert_eq!(
            err.to_string(),
            "Timed out after 250ms waiting for namespace ns1"
        );
    }
}
