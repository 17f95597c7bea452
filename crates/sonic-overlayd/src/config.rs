//! Configuration file support for overlayd
//!
//! Loads and validates overlayd configuration from TOML files.
//! Default location: /etc/sonic/overlayd.toml
//!
//! ```toml
//! [switch]
//! vxlan_udp_port = 4789
//!
//! [switch.capacities]
//! tunnel_ports = 512
//!
//! [daemon]
//! provision_timeout_secs = 10
//! domain_teardown = "when-empty"
//!
//! [[segment]]
//! name = "lab"
//! domain = 100
//! encap_key = { vni = 5000 }
//! flood_mac = "01:00:5e:00:00:fb"
//! ```

use crate::segment::{DomainTeardown, SegmentDescriptor, SegmentOrchConfig};
use crate::{info_log, warn_log};
use serde::{Deserialize, Serialize};
use sonic_sai::api::DEFAULT_VXLAN_UDP_PORT;
use sonic_sai::TableCapacities;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/overlayd.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Table sizes of the virtual switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacitiesConfig {
    pub bridges: u32,
    pub bridge_ports: u32,
    pub router_interfaces: u32,
    pub next_hops: u32,
    pub tunnels: u32,
    pub tunnel_terms: u32,
    pub tunnel_ports: u32,
    pub l2mc_groups: u32,
    pub flood_encaps: u32,
    pub fdb_entries: u32,
    pub label_entries: u32,
}

impl Default for CapacitiesConfig {
    fn default() -> Self {
        TableCapacities::default().into()
    }
}

impl From<TableCapacities> for CapacitiesConfig {
    fn from(caps: TableCapacities) -> Self {
        Self {
            bridges: caps.bridges,
            bridge_ports: caps.bridge_ports,
            router_interfaces: caps.router_interfaces,
            next_hops: caps.next_hops,
            tunnels: caps.tunnels,
            tunnel_terms: caps.tunnel_terms,
            tunnel_ports: caps.tunnel_ports,
            l2mc_groups: caps.l2mc_groups,
            flood_encaps: caps.flood_encaps,
            fdb_entries: caps.fdb_entries,
            label_entries: caps.label_entries,
        }
    }
}

impl CapacitiesConfig {
    pub fn to_capacities(&self) -> TableCapacities {
        TableCapacities {
            bridges: self.bridges,
            bridge_ports: self.bridge_ports,
            router_interfaces: self.router_interfaces,
            next_hops: self.next_hops,
            tunnels: self.tunnels,
            tunnel_terms: self.tunnel_terms,
            tunnel_ports: self.tunnel_ports,
            l2mc_groups: self.l2mc_groups,
            flood_encaps: self.flood_encaps,
            fdb_entries: self.fdb_entries,
            label_entries: self.label_entries,
        }
    }

    fn zero_tables(&self) -> Vec<&'static str> {
        [
            ("bridges", self.bridges),
            ("bridge_ports", self.bridge_ports),
            ("router_interfaces", self.router_interfaces),
            ("next_hops", self.next_hops),
            ("tunnels", self.tunnels),
            ("tunnel_terms", self.tunnel_terms),
            ("tunnel_ports", self.tunnel_ports),
            ("l2mc_groups", self.l2mc_groups),
            ("flood_encaps", self.flood_encaps),
            ("fdb_entries", self.fdb_entries),
            ("label_entries", self.label_entries),
        ]
        .into_iter()
        .filter(|(_, size)| *size == 0)
        .map(|(name, _)| name)
        .collect()
    }
}

/// Switch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// UDP destination port programmed for VXLAN
    #[serde(default = "default_vxlan_udp_port")]
    pub vxlan_udp_port: u16,

    #[serde(default)]
    pub capacities: CapacitiesConfig,
}

/// Daemon behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Upper bound on one provisioning attempt; the attempt is cancelled
    /// and unwound once it elapses
    #[serde(default = "default_provision_timeout")]
    pub provision_timeout_secs: u64,

    /// Create the VLANs and port memberships segments rely on
    #[serde(default = "default_bring_up")]
    pub bring_up: bool,

    /// Tear all segments down on shutdown
    #[serde(default = "default_deprovision_on_exit")]
    pub deprovision_on_exit: bool,

    #[serde(default)]
    pub domain_teardown: DomainTeardown,

    /// Let segments towards the same peer share one terminator
    #[serde(default = "default_share_terminators")]
    pub share_terminators: bool,

    /// Let an FDB install rebind a MAC that points elsewhere
    #[serde(default = "default_replace_fdb_entries")]
    pub replace_fdb_entries: bool,

    /// Per-group flood member limit; unbounded when unset
    #[serde(default)]
    pub max_flood_members: Option<usize>,
}

/// Complete overlayd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverlaydConfig {
    #[serde(default)]
    pub switch: SwitchConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Segments provisioned at startup, in order
    #[serde(default, rename = "segment")]
    pub segments: Vec<SegmentDescriptor>,
}

// Default functions
fn default_vxlan_udp_port() -> u16 {
    DEFAULT_VXLAN_UDP_PORT
}

fn default_provision_timeout() -> u64 {
    30
}

fn default_bring_up() -> bool {
    true
}

fn default_deprovision_on_exit() -> bool {
    true
}

fn default_share_terminators() -> bool {
    true
}

fn default_replace_fdb_entries() -> bool {
    true
}

// Default implementations
impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            vxlan_udp_port: default_vxlan_udp_port(),
            capacities: CapacitiesConfig::default(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            provision_timeout_secs: default_provision_timeout(),
            bring_up: default_bring_up(),
            deprovision_on_exit: default_deprovision_on_exit(),
            domain_teardown: DomainTeardown::default(),
            share_terminators: default_share_terminators(),
            replace_fdb_entries: default_replace_fdb_entries(),
            max_flood_members: None,
        }
    }
}

impl OverlaydConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = Self::parse(&content, path)?;
                info_log!(
                    "Config",
                    path = %path.display(),
                    segments = config.segments.len(),
                    "configuration loaded"
                );
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn_log!(
                    "Config",
                    path = %path.display(),
                    "config file not found, using defaults"
                );
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse TOML content; `path` only labels errors.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.provision_timeout_secs)
    }

    pub fn capacities(&self) -> TableCapacities {
        self.switch.capacities.to_capacities()
    }

    /// Manager settings derived from the `[daemon]` section.
    pub fn orch_config(&self) -> SegmentOrchConfig {
        let mut config = SegmentOrchConfig {
            domain_teardown: self.daemon.domain_teardown,
            ..SegmentOrchConfig::default()
        };
        config.tunnel.share_terminators = self.daemon.share_terminators;
        config.fdb.allow_replace = self.daemon.replace_fdb_entries;
        config.flood_group.max_members = self.daemon.max_flood_members;
        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.switch.vxlan_udp_port == 0 {
            return Err(ConfigError::Invalid(
                "vxlan_udp_port must be > 0".to_string(),
            ));
        }

        let zero = self.switch.capacities.zero_tables();
        if !zero.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "table capacities must be > 0: {}",
                zero.join(", ")
            )));
        }

        if self.daemon.provision_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "provision_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.daemon.max_flood_members == Some(0) {
            return Err(ConfigError::Invalid(
                "max_flood_members must be > 0 when set".to_string(),
            ));
        }

        let mut seen = HashMap::new();
        for (index, segment) in self.segments.iter().enumerate() {
            segment.validate().map_err(|reason| {
                ConfigError::Invalid(format!(
                    "segment {} ({}): {}",
                    index,
                    segment.label(),
                    reason
                ))
            })?;
            if let Some(first) = seen.insert(segment.key(), index) {
                return Err(ConfigError::Invalid(format!(
                    "segments {} and {} describe the same segment {}",
                    first,
                    index,
                    segment.key()
                )));
            }
        }

        Ok(())
    }
}
