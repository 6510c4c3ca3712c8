//! Configuration file support for nsorchd
//!
//! Loads and validates nsorchd configuration from TOML files.
//! Default location: /etc/ovn/nsorchd.conf

use crate::error::ConfigError;
use crate::namespace::NamespaceOrchConfig;
use ovn_nb_common::NbctlConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ovn/nsorchd.conf";

/// Northbound database access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NorthboundConfig {
    /// Path to the ovn-nbctl binary
    #[serde(default = "default_nbctl_path")]
    pub nbctl_path: String,

    /// Per-command timeout in seconds
    #[serde(default = "default_nbctl_timeout")]
    pub timeout_secs: u64,
}

/// Namespace controller behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Controller-wide multicast support
    #[serde(default)]
    pub enable_multicast: bool,

    /// Deadline for waiting on a namespace to appear, in milliseconds
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_ms: u64,

    /// Poll interval while waiting on a namespace, in milliseconds
    #[serde(default = "default_wait_poll_interval")]
    pub wait_poll_interval_ms: u64,
}

/// Event processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Number of concurrent event workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bounded event queue depth
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Periodic address-set reconciliation interval; 0 runs it only on sync events
    #[serde(default)]
    pub resync_interval_secs: u64,
}

/// Complete nsorchd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsorchConfig {
    #[serde(default)]
    pub northbound: NorthboundConfig,

    #[serde(default)]
    pub namespace: NamespaceConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

// Default functions
fn default_nbctl_path() -> String {
    ovn_nb_common::shell::OVN_NBCTL_CMD.to_string()
}

fn default_nbctl_timeout() -> u64 {
    15
}

fn default_wait_timeout() -> u64 {
    10_000
}

fn default_wait_poll_interval() -> u64 {
    100
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    1024
}

impl Default for NorthboundConfig {
    fn default() -> Self {
        Self {
            nbctl_path: default_nbctl_path(),
            timeout_secs: default_nbctl_timeout(),
        }
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            enable_multicast: false,
            wait_timeout_ms: default_wait_timeout(),
            wait_poll_interval_ms: default_wait_poll_interval(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            resync_interval_secs: 0,
        }
    }
}

impl NsorchConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Wait-and-lock deadline as Duration
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.namespace.wait_timeout_ms)
    }

    /// Wait-and-lock poll interval as Duration
    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.namespace.wait_poll_interval_ms)
    }

    /// Periodic reconciliation interval, if enabled
    pub fn resync_interval(&self) -> Option<Duration> {
        match self.daemon.resync_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Settings for the ovn-nbctl backend
    pub fn nbctl_config(&self) -> NbctlConfig {
        NbctlConfig {
            nbctl_path: self.northbound.nbctl_path.clone(),
            timeout_secs: self.northbound.timeout_secs,
        }
    }

    /// Settings for the namespace controller
    pub fn orch_config(&self) -> NamespaceOrchConfig {
        NamespaceOrchConfig {
            enable_multicast: self.namespace.enable_multicast,
            wait_timeout: self.wait_timeout(),
            wait_poll_interval: self.wait_poll_interval(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.workers == 0 {
            return Err(ConfigError::Invalid("workers must be > 0".to_string()));
        }

        if self.daemon.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth must be > 0".to_string()));
        }

        if self.namespace.wait_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "wait_poll_interval_ms must be > 0".to_string(),
            ));
        }

        if self.namespace.wait_poll_interval_ms > self.namespace.wait_timeout_ms {
            return Err(ConfigError::Invalid(
                "wait_poll_interval_ms must not exceed wait_timeout_ms".to_string(),
            ));
        }

        Ok(())
    }
}
