//! Common northbound abstractions for the OVN namespace controller.
//!
//! This crate provides the backend-facing leaf primitives used by the
//! namespace reconciliation core:
//!
//! - [`AddressSet`] / [`AddressSetFactory`]: named, mutable sets of IP
//!   addresses persisted in the OVN northbound database
//! - [`PolicyStore`]: per-namespace port groups and multicast ACLs
//! - [`naming`]: hashed backend names and the address-set naming convention
//! - [`nbctl`]: an implementation of both traits on top of `ovn-nbctl`
//! - [`shell`]: quoted shell command execution
//!
//! # Architecture
//!
//! ```text
//! [NamespaceOrch] ──> AddressSetFactory ──┐
//!        │                                ├──> [ovn-nbctl] ──> [OVN NB DB]
//!        └──────────> PolicyStore ────────┘
//! ```
//!
//! Every call can fail with an [`NbError`]; callers in the controller log
//! and continue rather than retrying.

pub mod address_set;
pub mod error;
pub mod naming;
pub mod nbctl;
pub mod policy;
pub mod shell;

pub use address_set::{AddressSet, AddressSetFactory};
pub use error::{NbError, NbResult};
pub use naming::{hash_for_ovn, hashed_port_group, AddressSetName};
pub use nbctl::{NbctlBackend, NbctlConfig};
pub use policy::{PolicyStore, PortGroupId};
