//! In-memory northbound backend.
//!
//! [`FakeNorthbound`] simulates the subset of the northbound database the
//! namespace controller touches, without `ovn-nbctl` or a database. Clones
//! share state, so a test can hand one clone to the controller and inspect
//! another.

use async_trait::async_trait;
use ovn_nb_common::{
    AddressSet, AddressSetFactory, AddressSetName, NbError, NbResult, PolicyStore, PortGroupId,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::IpAddr;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;

/// Backend operation kinds, used for the call journal and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NbOp {
    CreateAddressSet,
    AddIps,
    DeleteIps,
    DestroyAddressSet,
    ListAddressSets,
    DestroyAddressSetInBackingStore,
    CreatePortGroup,
    DeletePortGroup,
    AddPortsToPortGroup,
    RemovePortsFromPortGroup,
    CreateMulticastAllow,
    DeleteMulticastAllow,
    CreateDefaultDenyMulticast,
}

/// A single recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NbCall {
    /// The operation.
    pub op: NbOp,
    /// The address set or namespace the call targeted (empty for global calls).
    pub target: String,
}

#[derive(Debug, Clone)]
struct PortGroupState {
    uuid: PortGroupId,
    ports: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct State {
    address_sets: BTreeMap<AddressSetName, BTreeSet<IpAddr>>,
    port_groups: BTreeMap<String, PortGroupState>,
    multicast_allow: BTreeSet<String>,
    default_deny_multicast: bool,
    calls: Vec<NbCall>,
    failures: HashSet<NbOp>,
    latency: Option<Duration>,
    next_uuid: u64,
}

/// Shared in-memory northbound store.
#[derive(Debug, Clone, Default)]
pub struct FakeNorthbound {
    state: Arc<Mutex<State>>,
}

fn not_found(op: NbOp, target: &str) -> NbError {
    NbError::CommandFailed {
        command: format!("{:?} {}", op, target),
        exit_code: 1,
        output: format!("{}: row not found", target),
    }
}

impl FakeNorthbound {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }

    /// Records the call, applies failure injection and simulated latency.
    async fn begin(&self, op: NbOp, target: &str) -> NbResult<()> {
        let latency = {
            let mut state = self.lock();
            state.calls.push(NbCall {
                op,
                target: target.to_string(),
            });
            if state.failures.contains(&op) {
                tracing::debug!(?op, object = target, "injecting northbound failure");
                return Err(NbError::injected(format!("{:?}", op)));
            }
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    /// Makes every subsequent `op` call fail.
    pub fn fail_on(&self, op: NbOp) {
        self.lock().failures.insert(op);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Delays every backend call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// Pre-populates an address set, as if left behind by an earlier run.
    pub fn seed_address_set(&self, name: AddressSetName, ips: &[IpAddr]) {
        self.lock()
            .address_sets
            .insert(name, ips.iter().copied().collect());
    }

    /// Returns the members of an address set, if it exists.
    pub fn address_set(&self, name: &AddressSetName) -> Option<BTreeSet<IpAddr>> {
        self.lock().address_sets.get(name).cloned()
    }

    /// Returns the members of the namespace-level set of `namespace`.
    pub fn namespace_address_set(&self, namespace: &str) -> Option<BTreeSet<IpAddr>> {
        self.address_set(&AddressSetName::namespace_set(namespace))
    }

    /// Returns the names of every address set.
    pub fn address_set_names(&self) -> Vec<AddressSetName> {
        self.lock().address_sets.keys().cloned().collect()
    }

    /// Returns the identifier and member ports of a namespace port group.
    pub fn port_group(&self, namespace: &str) -> Option<(PortGroupId, BTreeSet<String>)> {
        self.lock()
            .port_groups
            .get(namespace)
            .map(|pg| (pg.uuid.clone(), pg.ports.clone()))
    }

    /// Returns true if multicast allow ACLs exist for the namespace.
    pub fn has_multicast_allow(&self, namespace: &str) -> bool {
        self.lock().multicast_allow.contains(namespace)
    }

    /// Returns true if the default multicast deny policy was installed.
    pub fn default_deny_installed(&self) -> bool {
        self.lock().default_deny_multicast
    }

    /// Returns every recorded call in order.
    pub fn calls(&self) -> Vec<NbCall> {
        self.lock().calls.clone()
    }

    /// Counts recorded calls of `op` against `target`.
    pub fn count_calls(&self, op: NbOp, target: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.op == op && call.target == target)
            .count()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

/// Address set handle into a [`FakeNorthbound`].
#[derive(Debug)]
pub struct FakeAddressSet {
    name: AddressSetName,
    nb: FakeNorthbound,
}

#[async_trait]
impl AddressSet for FakeAddressSet {
    fn name(&self) -> &AddressSetName {
        &self.name
    }

    async fn add_ips(&self, ips: &[IpAddr]) -> NbResult<()> {
        let target = self.name.to_string();
        self.nb.begin(NbOp::AddIps, &target).await?;
        let mut state = self.nb.lock();
        let members = state
            .address_sets
            .get_mut(&self.name)
            .ok_or_else(|| not_found(NbOp::AddIps, &target))?;
        members.extend(ips.iter().copied());
        Ok(())
    }

    async fn delete_ips(&self, ips: &[IpAddr]) -> NbResult<()> {
        let target = self.name.to_string();
        self.nb.begin(NbOp::DeleteIps, &target).await?;
        let mut state = self.nb.lock();
        if let Some(members) = state.address_sets.get_mut(&self.name) {
            for ip in ips {
                members.remove(ip);
            }
        }
        Ok(())
    }

    async fn destroy(&self) -> NbResult<()> {
        self.nb
            .begin(NbOp::DestroyAddressSet, &self.name.to_string())
            .await?;
        self.nb.lock().address_sets.remove(&self.name);
        Ok(())
    }
}

#[async_trait]
impl AddressSetFactory for FakeNorthbound {
    async fn new_address_set(
        &self,
        name: &AddressSetName,
        ips: &[IpAddr],
    ) -> NbResult<Box<dyn AddressSet>> {
        self.begin(NbOp::CreateAddressSet, &name.to_string()).await?;
        self.lock()
            .address_sets
            .insert(name.clone(), ips.iter().copied().collect());
        Ok(Box::new(FakeAddressSet {
            name: name.clone(),
            nb: self.clone(),
        }))
    }

    async fn list_address_sets(&self) -> NbResult<Vec<AddressSetName>> {
        self.begin(NbOp::ListAddressSets, "").await?;
        Ok(self.address_set_names())
    }

    async fn destroy_address_set_in_backing_store(&self, name: &AddressSetName) -> NbResult<()> {
        self.begin(NbOp::DestroyAddressSetInBackingStore, &name.to_string())
            .await?;
        self.lock().address_sets.remove(name);
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for FakeNorthbound {
    async fn create_port_group(&self, namespace: &str) -> NbResult<PortGroupId> {
        self.begin(NbOp::CreatePortGroup, namespace).await?;
        let mut state = self.lock();
        if let Some(existing) = state.port_groups.get(namespace) {
            return Ok(existing.uuid.clone());
        }
        state.next_uuid += 1;
        let uuid = PortGroupId::new(format!("pg-{:04}", state.next_uuid));
        state.port_groups.insert(
            namespace.to_string(),
            PortGroupState {
                uuid: uuid.clone(),
                ports: BTreeSet::new(),
            },
        );
        Ok(uuid)
    }

    async fn delete_port_group(&self, namespace: &str) -> NbResult<()> {
        self.begin(NbOp::DeletePortGroup, namespace).await?;
        let mut state = self.lock();
        state.port_groups.remove(namespace);
        // ACLs are only referenced from the port group.
        state.multicast_allow.remove(namespace);
        Ok(())
    }

    async fn add_ports_to_port_group(&self, namespace: &str, port_uuids: &[String]) -> NbResult<()> {
        self.begin(NbOp::AddPortsToPortGroup, namespace).await?;
        let mut state = self.lock();
        let pg = state
            .port_groups
            .get_mut(namespace)
            .ok_or_else(|| not_found(NbOp::AddPortsToPortGroup, namespace))?;
        pg.ports.extend(port_uuids.iter().cloned());
        Ok(())
    }

    async fn remove_ports_from_port_group(
        &self,
        namespace: &str,
        port_uuids: &[String],
    ) -> NbResult<()> {
        self.begin(NbOp::RemovePortsFromPortGroup, namespace).await?;
        let mut state = self.lock();
        if let Some(pg) = state.port_groups.get_mut(namespace) {
            for uuid in port_uuids {
                pg.ports.remove(uuid);
            }
        }
        Ok(())
    }

    async fn create_multicast_allow(&self, namespace: &str) -> NbResult<()> {
        self.begin(NbOp::CreateMulticastAllow, namespace).await?;
        let mut state = self.lock();
        if !state.port_groups.contains_key(namespace) {
            return Err(not_found(NbOp::CreateMulticastAllow, namespace));
        }
        state.multicast_allow.insert(namespace.to_string());
        Ok(())
    }

    async fn delete_multicast_allow(&self, namespace: &str) -> NbResult<()> {
        self.begin(NbOp::DeleteMulticastAllow, namespace).await?;
        self.lock().multicast_allow.remove(namespace);
        Ok(())
    }

    async fn create_default_deny_multicast(&self) -> NbResult<()> {
        self.begin(NbOp::CreateDefaultDenyMulticast, "").await?;
        self.lock().default_deny_multicast = true;
        Ok(())
    }
}
