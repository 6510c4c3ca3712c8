//! Orphaned address-set cleanup.

use ovn_nb_common::{AddressSetFactory, NbResult};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Namespace-level address sets found in the backend.
    pub examined: usize,
    /// Namespaces whose orphaned address set was destroyed.
    pub destroyed: Vec<String>,
    /// Namespaces whose orphaned address set could not be destroyed.
    pub failed: Vec<String>,
}

/// Destroys namespace-level address sets of namespaces that no longer exist.
///
/// Sets with a suffix belong to other consumers and are never touched.
#[derive(Clone)]
pub struct NamespaceReconciler {
    address_sets: Arc<dyn AddressSetFactory>,
}

impl NamespaceReconciler {
    pub fn new(address_sets: Arc<dyn AddressSetFactory>) -> Self {
        Self { address_sets }
    }

    /// Runs one pass against the authoritative namespace list.
    ///
    /// Fails only if the backend cannot be listed; individual destroy
    /// failures are logged and reported.
    #[instrument(skip_all, fields(expected = expected.len()))]
    pub async fn reconcile<S: AsRef<str>>(&self, expected: &[S]) -> NbResult<ReconcileReport> {
        let expected: HashSet<&str> = expected.iter().map(AsRef::as_ref).collect();
        let mut report = ReconcileReport::default();

        let names = self.address_sets.list_address_sets().await?;
        for name in names.into_iter().filter(|name| name.is_namespace_set()) {
            report.examined += 1;
            if expected.contains(name.namespace.as_str()) {
                continue;
            }
            match self
                .address_sets
                .destroy_address_set_in_backing_store(&name)
                .await
            {
                Ok(()) => {
                    info!(namespace = %name.namespace, "Destroyed orphaned address set");
                    report.destroyed.push(name.namespace);
                }
                Err(e) => {
                    error!(namespace = %name.namespace, error = %e, "Failed to destroy orphaned address set");
                    report.failed.push(name.namespace);
                }
            }
        }

        info!(
            examined = report.examined,
            destroyed = report.destroyed.len(),
            failed = report.failed.len(),
            "Namespace address set reconciliation complete"
        );
        Ok(report)
    }
}
