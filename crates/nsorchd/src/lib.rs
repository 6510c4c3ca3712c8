//! Namespace network-state reconciliation for OVN.
//!
//! Keeps the northbound database's view of which pod addresses belong to
//! which namespace, and which namespaces allow multicast, in step with the
//! orchestrator's namespace and pod objects.
//!
//! # Architecture
//!
//! ```text
//! events ──> EventDispatcher ──> NamespaceOrch ──> NamespaceRegistry
//!                 │                    │                  │
//!                 v                    v                  v
//!            ObjectCache     AddressSetFactory /    NamespaceInfo
//!                              PolicyStore          (per-entry lock)
//! ```
//!
//! Events may arrive out of order and are handled concurrently. Per
//! namespace, the registry's entry lock orders all mutations.

pub mod annotations;
pub mod cache;
pub mod config;
pub mod daemon;
pub mod error;
pub mod namespace;
pub mod types;

pub use cache::{CacheError, ObjectCache, PodCache};
pub use config::NsorchConfig;
pub use daemon::{handle_event, DispatchError, DispatcherConfig, EventDispatcher, OrchEvent};
pub use error::{ConfigError, NamespaceOrchError, RegistryError};
pub use namespace::{
    HybridOverlayOverrides, NamespaceGuard, NamespaceInfo, NamespaceOrch, NamespaceOrchConfig,
    NamespaceOrchStats, NamespacePolicy, NamespaceReconciler, NamespaceRegistry, NamespaceSnapshot,
    ReconcileReport,
};
pub use types::{LogicalPortInfo, Namespace, Pod};
