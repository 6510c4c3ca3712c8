//! Namespace reconciliation core.
//!
//! - [`NamespaceRegistry`]: namespace name to locked [`NamespaceInfo`]
//! - [`NamespaceOrch`]: namespace and pod event handling, multicast toggling
//! - [`NamespaceReconciler`]: removal of orphaned namespace address sets

mod info;
mod multicast;
mod orch;
mod reconcile;
mod registry;

pub use info::{HybridOverlayOverrides, NamespaceInfo, NamespacePolicy, NamespaceSnapshot};
pub use orch::{NamespaceOrch, NamespaceOrchConfig, NamespaceOrchStats};
pub use reconcile::{NamespaceReconciler, ReconcileReport};
pub use registry::{NamespaceGuard, NamespaceRegistry};
