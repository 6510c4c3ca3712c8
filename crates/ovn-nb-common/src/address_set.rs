//! Address set abstractions.
//!
//! An address set is a named, mutable set of IP addresses persisted in the
//! northbound database and referenced from ACL match expressions. The
//! namespace controller owns exactly one per namespace.

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;

use crate::error::NbResult;
use crate::naming::AddressSetName;

/// Handle to a single backend address set.
///
/// A handle is exclusively owned by the object that created it; dropping
/// the handle does not remove the backend object, [`AddressSet::destroy`]
/// does.
#[async_trait]
pub trait AddressSet: Send + Sync + fmt::Debug {
    /// Logical name of the set.
    fn name(&self) -> &AddressSetName;

    /// Hashed backend name of the set.
    fn hashed_name(&self) -> String {
        self.name().hashed()
    }

    /// Adds addresses to the set. Adding an existing member is a no-op.
    async fn add_ips(&self, ips: &[IpAddr]) -> NbResult<()>;

    /// Removes addresses from the set. Removing a non-member is a no-op.
    async fn delete_ips(&self, ips: &[IpAddr]) -> NbResult<()>;

    /// Removes the set from the backend.
    async fn destroy(&self) -> NbResult<()>;
}

/// Creates, enumerates, and destroys address sets.
#[async_trait]
pub trait AddressSetFactory: Send + Sync {
    /// Creates (or takes over) the address set `name`, seeded with `ips`.
    async fn new_address_set(
        &self,
        name: &AddressSetName,
        ips: &[IpAddr],
    ) -> NbResult<Box<dyn AddressSet>>;

    /// Lists the logical names of every address set in the backend that
    /// follows the naming convention. Sets with foreign names are skipped.
    async fn list_address_sets(&self) -> NbResult<Vec<AddressSetName>>;

    /// Destroys an address set by name without holding a handle to it.
    ///
    /// Destroying a set that does not exist is not an error.
    async fn destroy_address_set_in_backing_store(&self, name: &AddressSetName) -> NbResult<()>;
}
