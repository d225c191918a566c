//! Configuration file support for armada

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub network: Network,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub behavior: Behavior,
}

/// Default values for fleet operations
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Defaults {
    /// Cluster names are `<cluster_name_base><index>`
    #[serde(default = "default_cluster_name_base")]
    pub cluster_name_base: String,

    #[serde(default = "default_num_clusters")]
    pub num_clusters: u32,

    #[serde(default = "default_num_workers")]
    pub num_workers: u32,

    /// Directory (relative to the working directory) for generated artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Docker network the kind nodes are attached to
    #[serde(default = "default_docker_network")]
    pub docker_network: String,
}

/// Base subnets the per-cluster CIDRs are carved from
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Network {
    #[serde(default = "default_pod_cidr_base")]
    pub pod_cidr_base: Ipv4Addr,

    #[serde(default = "default_pod_cidr_mask")]
    pub pod_cidr_mask: u8,

    #[serde(default = "default_service_cidr_base")]
    pub service_cidr_base: Ipv4Addr,

    #[serde(default = "default_service_cidr_mask")]
    pub service_cidr_mask: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Timeouts {
    /// Deadline for workload readiness waits
    #[serde(default = "default_resources_secs")]
    pub resources_secs: u64,

    #[serde(default = "default_workload_poll_secs")]
    pub workload_poll_secs: u64,

    #[serde(default = "default_pod_poll_secs")]
    pub pod_poll_secs: u64,

    /// Default for `create clusters --wait`
    #[serde(default = "default_control_plane_wait_secs")]
    pub control_plane_wait_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Behavior {
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

fn default_cluster_name_base() -> String {
    "cl".to_string()
}

fn default_num_clusters() -> u32 {
    2
}

fn default_num_workers() -> u32 {
    2
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_docker_network() -> String {
    "bridge".to_string()
}

fn default_pod_cidr_base() -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, 0)
}

fn default_pod_cidr_mask() -> u8 {
    14
}

fn default_service_cidr_base() -> Ipv4Addr {
    Ipv4Addr::new(100, 0, 0, 0)
}

fn default_service_cidr_mask() -> u8 {
    16
}

fn default_resources_secs() -> u64 {
    300
}

fn default_workload_poll_secs() -> u64 {
    10
}

fn default_pod_poll_secs() -> u64 {
    30
}

fn default_control_plane_wait_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            cluster_name_base: default_cluster_name_base(),
            num_clusters: default_num_clusters(),
            num_workers: default_num_workers(),
            output_dir: default_output_dir(),
            docker_network: default_docker_network(),
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Self {
            pod_cidr_base: default_pod_cidr_base(),
            pod_cidr_mask: default_pod_cidr_mask(),
            service_cidr_base: default_service_cidr_base(),
            service_cidr_mask: default_service_cidr_mask(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            resources_secs: default_resources_secs(),
            workload_poll_secs: default_workload_poll_secs(),
            pod_poll_secs: default_pod_poll_secs(),
            control_plane_wait_secs: default_control_plane_wait_secs(),
        }
    }
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            show_progress: default_true(),
        }
    }
}

impl Timeouts {
    pub fn resources(&self) -> Duration {
        Duration::from_secs(self.resources_secs)
    }

    pub fn workload_poll(&self) -> Duration {
        Duration::from_secs(self.workload_poll_secs)
    }

    pub fn pod_poll(&self) -> Duration {
        Duration::from_secs(self.pod_poll_secs)
    }

    pub fn control_plane_wait(&self) -> Duration {
        Duration::from_secs(self.control_plane_wait_secs)
    }
}

impl Settings {
    /// Load settings from file or return defaults
    pub fn load() -> Self {
        match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path).unwrap_or_else(|e| {
                crate::log_warn!("{:#}, using defaults", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Find config file in standard locations
    /// Priority:
    /// 1. .armada.toml in current directory
    /// 2. ~/.config/armada/config.toml (XDG config directory)
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(".armada.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("armada").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }

    /// Generate example config file content
    pub fn example_config() -> Result<String> {
        let header = "# armada configuration file\n\
                      # Place this file at ~/.config/armada/config.toml or .armada.toml in your project\n\n";
        let body = toml::to_string_pretty(&Settings::default())
            .context("Failed to serialize default settings")?;
        Ok(format!("{}{}", header, body))
    }
}
