//! `ovn-nbctl` backed implementation of the northbound traits.
//!
//! Command strings are built by the `build_*` functions so they can be
//! checked without a running northbound database; [`NbctlBackend`] and
//! [`NbctlAddressSet`] only execute them.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::address_set::{AddressSet, AddressSetFactory};
use crate::error::{NbError, NbResult};
use crate::naming::{hashed_port_group, AddressSetName};
use crate::policy::{
    AclDirection, PolicyStore, PortGroupId, DEFAULT_MCAST_ALLOW_PRIORITY,
    DEFAULT_MCAST_DENY_PRIORITY, MCAST_MATCH,
};
use crate::shell::{self, shellquote, OVN_NBCTL_CMD};

/// Name of the cluster-wide port group carrying default deny ACLs.
pub const CLUSTER_PORT_GROUP: &str = "clusterPortGroup";

/// `external_ids:type` of multicast allow ACLs.
const ACL_TYPE_MCAST_ALLOW: &str = "mcast-allow";

/// `external_ids:type` of multicast deny ACLs.
const ACL_TYPE_MCAST_DENY: &str = "mcast-deny";

/// Connection settings for `ovn-nbctl`.
#[derive(Debug, Clone)]
pub struct NbctlConfig {
    /// Path to the `ovn-nbctl` binary.
    pub nbctl_path: String,
    /// Per-command timeout in seconds passed via `--timeout`.
    pub timeout_secs: u64,
}

impl Default for NbctlConfig {
    fn default() -> Self {
        Self {
            nbctl_path: OVN_NBCTL_CMD.to_string(),
            timeout_secs: 15,
        }
    }
}

impl NbctlConfig {
    /// Returns the command prefix shared by every invocation.
    fn prefix(&self) -> String {
        format!("{} --timeout={}", self.nbctl_path, self.timeout_secs)
    }
}

fn quoted_ips(ips: &[IpAddr]) -> String {
    ips.iter()
        .map(|ip| shellquote(&format!("\"{}\"", ip)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quoted_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| shellquote(item))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build a lookup of the `_uuid` column of `table` rows matching every
/// one of `conditions`. Each condition becomes its own argument.
pub fn build_find_uuid_cmd(config: &NbctlConfig, table: &str, conditions: &[String]) -> String {
    format!(
        "{} --data=bare --no-heading --columns=_uuid find {} {}",
        config.prefix(),
        table,
        quoted_list(conditions)
    )
}

/// `find acl` conditions selecting the multicast allow ACLs of `namespace`.
pub fn mcast_allow_conditions(namespace: &str) -> Vec<String> {
    vec![
        format!("external_ids:type={}", ACL_TYPE_MCAST_ALLOW),
        format!("external_ids:namespace=\"{}\"", namespace),
    ]
}

/// Build address set creation with its initial members.
pub fn build_create_address_set_cmd(
    config: &NbctlConfig,
    name: &AddressSetName,
    ips: &[IpAddr],
) -> String {
    let mut cmd = format!(
        "{} create address_set name={} external-ids:name={}",
        config.prefix(),
        shellquote(&name.hashed()),
        shellquote(&name.to_string())
    );
    if !ips.is_empty() {
        let members = ips
            .iter()
            .map(|ip| format!("\"{}\"", ip))
            .collect::<Vec<_>>()
            .join(" ");
        cmd.push(' ');
        cmd.push_str(&shellquote(&format!("addresses={}", members)));
    }
    cmd
}

/// Build replacement of the full member list of an existing address set.
pub fn build_set_address_set_cmd(config: &NbctlConfig, uuid: &str, ips: &[IpAddr]) -> String {
    let members = ips
        .iter()
        .map(|ip| format!("\"{}\"", ip))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{} set address_set {} {}",
        config.prefix(),
        shellquote(uuid),
        shellquote(&format!("addresses=[{}]", members))
    )
}

/// Build member addition (`add = true`) or removal.
pub fn build_address_set_members_cmd(
    config: &NbctlConfig,
    hashed_name: &str,
    ips: &[IpAddr],
    add: bool,
) -> String {
    let (verb, if_exists) = if add { ("add", "") } else { ("remove", " --if-exists") };
    format!(
        "{}{} {} address_set {} addresses {}",
        config.prefix(),
        if_exists,
        verb,
        shellquote(hashed_name),
        quoted_ips(ips)
    )
}

/// Build address set removal.
pub fn build_destroy_address_set_cmd(config: &NbctlConfig, hashed_name: &str) -> String {
    format!(
        "{} --if-exists destroy address_set {}",
        config.prefix(),
        shellquote(hashed_name)
    )
}

/// Build listing of the `external_ids` of every address set.
pub fn build_list_address_sets_cmd(config: &NbctlConfig) -> String {
    format!(
        "{} --data=bare --no-heading --columns=external_ids find address_set",
        config.prefix()
    )
}

/// Build port group creation.
pub fn build_create_port_group_cmd(config: &NbctlConfig, pg_name: &str, logical_name: &str) -> String {
    format!(
        "{} create port_group name={} external-ids:name={}",
        config.prefix(),
        shellquote(pg_name),
        shellquote(logical_name)
    )
}

/// Build port group removal.
pub fn build_delete_port_group_cmd(config: &NbctlConfig, pg_name: &str) -> String {
    format!(
        "{} --if-exists destroy port_group {}",
        config.prefix(),
        shellquote(pg_name)
    )
}

/// Build port membership change of a port group.
pub fn build_port_group_ports_cmd(
    config: &NbctlConfig,
    pg_name: &str,
    port_uuids: &[String],
    add: bool,
) -> String {
    let (verb, if_exists) = if add { ("add", "") } else { ("remove", " --if-exists") };
    format!(
        "{}{} {} port_group {} ports {}",
        config.prefix(),
        if_exists,
        verb,
        shellquote(pg_name),
        quoted_list(port_uuids)
    )
}

/// Build creation of an ACL attached to a port group in one transaction.
#[allow(clippy::too_many_arguments)]
pub fn build_add_acl_cmd(
    config: &NbctlConfig,
    pg_name: &str,
    direction: AclDirection,
    priority: u16,
    matcher: &str,
    action: &str,
    acl_type: &str,
    owner: &str,
) -> String {
    format!(
        "{} --id=@acl create acl priority={} direction={} match={} action={} \
         external-ids:type={} external-ids:namespace={} -- add port_group {} acls @acl",
        config.prefix(),
        priority,
        direction.as_str(),
        shellquote(matcher),
        action,
        acl_type,
        shellquote(owner),
        shellquote(pg_name)
    )
}

/// Build detachment of ACLs from a port group.
pub fn build_remove_acls_cmd(config: &NbctlConfig, pg_name: &str, acl_uuids: &[String]) -> String {
    format!(
        "{} --if-exists remove port_group {} acls {}",
        config.prefix(),
        shellquote(pg_name),
        quoted_list(acl_uuids)
    )
}

/// Extracts the logical name from one line of `external_ids` output.
fn parse_external_ids_name(line: &str) -> Option<&str> {
    line.split_whitespace()
        .find_map(|field| field.strip_prefix("name="))
}

fn parse_uuids(output: &str) -> Vec<String> {
    output
        .split_whitespace()
        .map(|uuid| uuid.to_string())
        .collect()
}

/// Address set handle backed by `ovn-nbctl`.
#[derive(Debug)]
pub struct NbctlAddressSet {
    config: Arc<NbctlConfig>,
    name: AddressSetName,
    hashed_name: String,
}

#[async_trait]
impl AddressSet for NbctlAddressSet {
    fn name(&self) -> &AddressSetName {
        &self.name
    }

    fn hashed_name(&self) -> String {
        self.hashed_name.clone()
    }

    async fn add_ips(&self, ips: &[IpAddr]) -> NbResult<()> {
        if ips.is_empty() {
            return Ok(());
        }
        let cmd = build_address_set_members_cmd(&self.config, &self.hashed_name, ips, true);
        shell::run_checked(&cmd).await?;
        debug!(address_set = %self.name, count = ips.len(), "Added addresses");
        Ok(())
    }

    async fn delete_ips(&self, ips: &[IpAddr]) -> NbResult<()> {
        if ips.is_empty() {
            return Ok(());
        }
        let cmd = build_address_set_members_cmd(&self.config, &self.hashed_name, ips, false);
        shell::run_checked(&cmd).await?;
        debug!(address_set = %self.name, count = ips.len(), "Removed addresses");
        Ok(())
    }

    async fn destroy(&self) -> NbResult<()> {
        let cmd = build_destroy_address_set_cmd(&self.config, &self.hashed_name);
        shell::run_checked(&cmd).await?;
        info!(address_set = %self.name, "Destroyed address set");
        Ok(())
    }
}

/// Northbound backend executing `ovn-nbctl` commands.
#[derive(Debug, Clone, Default)]
pub struct NbctlBackend {
    config: Arc<NbctlConfig>,
}

impl NbctlBackend {
    /// Creates a backend with the given connection settings.
    pub fn new(config: NbctlConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    async fn find_uuids(&self, table: &str, conditions: &[String]) -> NbResult<Vec<String>> {
        let cmd = build_find_uuid_cmd(&self.config, table, conditions);
        let output = shell::run_checked(&cmd).await?;
        Ok(parse_uuids(&output))
    }

    async fn ensure_port_group(&self, pg_name: &str, logical_name: &str) -> NbResult<PortGroupId> {
        if let Some(uuid) = self
            .find_uuids("port_group", &[format!("name={}", pg_name)])
            .await?
            .into_iter()
            .next()
        {
            return Ok(PortGroupId::new(uuid));
        }

        let cmd = build_create_port_group_cmd(&self.config, pg_name, logical_name);
        let uuid = shell::run_checked(&cmd).await?;
        if uuid.is_empty() {
            return Err(NbError::parse("create port_group", uuid));
        }
        Ok(PortGroupId::new(uuid))
    }

    async fn add_acl_pair(
        &self,
        pg_name: &str,
        priority: u16,
        action: &str,
        acl_type: &str,
        owner: &str,
    ) -> NbResult<()> {
        for direction in [AclDirection::Egress, AclDirection::Ingress] {
            let matcher = direction.port_group_match(pg_name, MCAST_MATCH);
            let existing = self
                .find_uuids("acl", &[format!("match=\"{}\"", matcher)])
                .await?;
            if !existing.is_empty() {
                debug!(port_group = %pg_name, direction = direction.as_str(), "ACL already present");
                continue;
            }
            let cmd = build_add_acl_cmd(
                &self.config,
                pg_name,
                direction,
                priority,
                &matcher,
                action,
                acl_type,
                owner,
            );
            shell::run_checked(&cmd).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AddressSetFactory for NbctlBackend {
    async fn new_address_set(
        &self,
        name: &AddressSetName,
        ips: &[IpAddr],
    ) -> NbResult<Box<dyn AddressSet>> {
        let hashed_name = name.hashed();
        let existing = self
            .find_uuids("address_set", &[format!("name={}", hashed_name)])
            .await?;

        let cmd = match existing.first() {
            // Take over a set left behind by a previous run.
            Some(uuid) => build_set_address_set_cmd(&self.config, uuid, ips),
            None => build_create_address_set_cmd(&self.config, name, ips),
        };
        shell::run_checked(&cmd).await?;
        info!(address_set = %name, members = ips.len(), "Created address set");

        Ok(Box::new(NbctlAddressSet {
            config: Arc::clone(&self.config),
            name: name.clone(),
            hashed_name,
        }))
    }

    async fn list_address_sets(&self) -> NbResult<Vec<AddressSetName>> {
        let cmd = build_list_address_sets_cmd(&self.config);
        let output = shell::run_checked(&cmd).await?;

        let mut names = Vec::new();
        for line in output.lines().filter(|l| !l.trim().is_empty()) {
            match parse_external_ids_name(line).and_then(AddressSetName::parse) {
                Some(name) => names.push(name),
                None => warn!(external_ids = %line, "Skipping address set without a usable name"),
            }
        }
        Ok(names)
    }

    async fn destroy_address_set_in_backing_store(&self, name: &AddressSetName) -> NbResult<()> {
        let cmd = build_destroy_address_set_cmd(&self.config, &name.hashed());
        shell::run_checked(&cmd).await?;
        info!(address_set = %name, "Destroyed address set in backing store");
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for NbctlBackend {
    async fn create_port_group(&self, namespace: &str) -> NbResult<PortGroupId> {
        self.ensure_port_group(&hashed_port_group(namespace), namespace)
            .await
    }

    async fn delete_port_group(&self, namespace: &str) -> NbResult<()> {
        let cmd = build_delete_port_group_cmd(&self.config, &hashed_port_group(namespace));
        shell::run_checked(&cmd).await?;
        Ok(())
    }

    async fn add_ports_to_port_group(&self, namespace: &str, port_uuids: &[String]) -> NbResult<()> {
        if port_uuids.is_empty() {
            return Ok(());
        }
        let cmd = build_port_group_ports_cmd(
            &self.config,
            &hashed_port_group(namespace),
            port_uuids,
            true,
        );
        shell::run_checked(&cmd).await?;
        Ok(())
    }

    async fn remove_ports_from_port_group(
        &self,
        namespace: &str,
        port_uuids: &[String],
    ) -> NbResult<()> {
        if port_uuids.is_empty() {
            return Ok(());
        }
        let cmd = build_port_group_ports_cmd(
            &self.config,
            &hashed_port_group(namespace),
            port_uuids,
            false,
        );
        shell::run_checked(&cmd).await?;
        Ok(())
    }

    async fn create_multicast_allow(&self, namespace: &str) -> NbResult<()> {
        self.add_acl_pair(
            &hashed_port_group(namespace),
            DEFAULT_MCAST_ALLOW_PRIORITY,
            "allow",
            ACL_TYPE_MCAST_ALLOW,
            namespace,
        )
        .await
    }

    async fn delete_multicast_allow(&self, namespace: &str) -> NbResult<()> {
        let acls = self
            .find_uuids("acl", &mcast_allow_conditions(namespace))
            .await?;
        if acls.is_empty() {
            return Ok(());
        }
        let cmd = build_remove_acls_cmd(&self.config, &hashed_port_group(namespace), &acls);
        shell::run_checked(&cmd).await?;
        Ok(())
    }

    async fn create_default_deny_multicast(&self) -> NbResult<()> {
        self.ensure_port_group(CLUSTER_PORT_GROUP, CLUSTER_PORT_GROUP)
            .await?;
        self.add_acl_pair(
            CLUSTER_PORT_GROUP,
            DEFAULT_MCAST_DENY_PRIORITY,
            "drop",
            ACL_TYPE_MCAST_DENY,
            CLUSTER_PORT_GROUP,
        )
        .await?;
        info!("Installed default multicast deny policy");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn config() -> NbctlConfig {
        NbctlConfig::default()
    }

    #[test]
    fn test_create_address_set_cmd() {
        let name = AddressSetName::namespace_set("ns1");
        let ips = vec![
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        ];
        let cmd = build_create_address_set_cmd(&config(), &name, &ips);
        assert!(cmd.starts_with("/usr/bin/ovn-nbctl --timeout=15 create address_set"));
        assert!(cmd.contains(&format!("name=\"{}\"", name.hashed())));
        assert!(cmd.contains("external-ids:name=\"ns1\""));
        assert!(cmd.contains("\"addresses=\\\"10.0.0.1\\\" \\\"10.0.0.2\\\"\""));
    }

    #[test]
    fn test_create_empty_address_set_cmd() {
        let name = AddressSetName::namespace_set("empty");
        let cmd = build_create_address_set_cmd(&config(), &name, &[]);
        assert!(!cmd.contains("addresses"));
    }

    #[test]
    fn test_members_cmd() {
        let ips = vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9))];
        let add = build_address_set_members_cmd(&config(), "a1", &ips, true);
        assert!(add.contains(" add address_set \"a1\" addresses \"\\\"10.0.0.9\\\"\""));

        let remove = build_address_set_members_cmd(&config(), "a1", &ips, false);
        assert!(remove.contains("--if-exists remove address_set \"a1\""));
    }

    #[test]
    fn test_destroy_address_set_cmd() {
        let cmd = build_destroy_address_set_cmd(&config(), "a42");
        assert_eq!(
            cmd,
            "/usr/bin/ovn-nbctl --timeout=15 --if-exists destroy address_set \"a42\""
        );
    }

    #[test]
    fn test_port_group_cmds() {
        let create = build_create_port_group_cmd(&config(), "a7", "ns1");
        assert!(create.contains("create port_group name=\"a7\" external-ids:name=\"ns1\""));

        let delete = build_delete_port_group_cmd(&config(), "a7");
        assert!(delete.ends_with("--if-exists destroy port_group \"a7\""));

        let ports = vec!["uuid-1".to_string(), "uuid-2".to_string()];
        let add = build_port_group_ports_cmd(&config(), "a7", &ports, true);
        assert!(add.ends_with("add port_group \"a7\" ports \"uuid-1\" \"uuid-2\""));
    }

    #[test]
    fn test_add_acl_cmd() {
        let matcher = AclDirection::Egress.port_group_match("a7", MCAST_MATCH);
        let cmd = build_add_acl_cmd(
            &config(),
            "a7",
            AclDirection::Egress,
            DEFAULT_MCAST_ALLOW_PRIORITY,
            &matcher,
            "allow",
            ACL_TYPE_MCAST_ALLOW,
            "ns1",
        );
        assert!(cmd.contains("priority=1012 direction=from-lport"));
        assert!(cmd.contains("match=\"inport == @a7 && ip4.mcast\""));
        assert!(cmd.contains("-- add port_group \"a7\" acls @acl"));
    }

    #[test]
    fn test_find_cmd_quotes_each_condition() {
        let cmd = build_find_uuid_cmd(&config(), "acl", &mcast_allow_conditions("ns1"));
        assert_eq!(
            cmd,
            "/usr/bin/ovn-nbctl --timeout=15 --data=bare --no-heading --columns=_uuid \
             find acl \"external_ids:type=mcast-allow\" \"external_ids:namespace=\\\"ns1\\\"\""
        );
    }

    #[test]
    fn test_find_cmd_escapes_namespace_value() {
        let cmd = build_find_uuid_cmd(&config(), "acl", &mcast_allow_conditions("ns$x"));
        assert!(cmd.ends_with("\"external_ids:namespace=\\\"ns\\$x\\\"\""));
    }

    #[test]
    fn test_parse_external_ids_name() {
        assert_eq!(parse_external_ids_name("name=ns1"), Some("ns1"));
        assert_eq!(
            parse_external_ids_name("owner=foo name=ns1.p.ingress.0"),
            Some("ns1.p.ingress.0")
        );
        assert_eq!(parse_external_ids_name("owner=foo"), None);
    }

    #[test]
    fn test_parse_uuids() {
        assert_eq!(
            parse_uuids("a-1\nb-2\n"),
            vec!["a-1".to_string(), "b-2".to_string()]
        );
        assert!(parse_uuids("").is_empty());
    }
}
