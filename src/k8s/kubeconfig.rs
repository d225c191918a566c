//! Per-cluster kubeconfig variants
//!
//! kind mints kubeconfigs with generic entry names. Every entry is renamed to
//! the cluster's name so several kubeconfigs can be merged, then two variants
//! are written: one addressing the API server from the host and one
//! addressing it from containers on the docker bridge.

use crate::utils::container::ContainerInspector;
use crate::utils::errors::{ArmadaError, ArmadaResult};
use crate::utils::paths::OutputLayout;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};

/// API server port inside the control-plane container
pub const API_SERVER_PORT: u16 = 6443;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct KubeconfigDoc {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_context: Option<String>,
    #[serde(flatten)]
    rest: Mapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClusterEntry {
    server: String,
    #[serde(flatten)]
    rest: Mapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContextEntry {
    cluster: String,
    user: String,
    #[serde(flatten)]
    rest: Mapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: serde_yaml::Value,
}

impl KubeconfigDoc {
    fn rename_entries(&mut self, name: &str) {
        for cluster in &mut self.clusters {
            cluster.name = name.to_string();
        }
        for context in &mut self.contexts {
            context.name = name.to_string();
            context.context.cluster = name.to_string();
            context.context.user = name.to_string();
        }
        for user in &mut self.users {
            user.name = name.to_string();
        }
        self.current_context = Some(name.to_string());
    }

    fn set_server(&mut self, server: &str) {
        for cluster in &mut self.clusters {
            cluster.cluster.server = server.to_string();
        }
    }
}

/// Both variants rendered as YAML text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeconfigVariants {
    pub host: String,
    pub container: String,
}

/// Rename entries and build both variants from the raw kubeconfig text
pub fn derive_variants(
    cluster_name: &str,
    source: &str,
    internal_address: &str,
) -> Result<KubeconfigVariants, String> {
    let mut doc: KubeconfigDoc = serde_yaml::from_str(source).map_err(|e| e.to_string())?;
    if doc.clusters.is_empty() {
        return Err("kubeconfig has no clusters".to_string());
    }
    doc.rename_entries(cluster_name);

    let host = serde_yaml::to_string(&doc).map_err(|e| e.to_string())?;
    doc.set_server(&format!("https://{}:{}", internal_address, API_SERVER_PORT));
    let container = serde_yaml::to_string(&doc).map_err(|e| e.to_string())?;

    Ok(KubeconfigVariants { host, container })
}

/// Paths of the written variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeconfigPaths {
    pub host: PathBuf,
    pub container: PathBuf,
}

/// Writes and locates kubeconfig variants under the output layout
#[derive(Debug, Clone)]
pub struct KubeconfigAdapter {
    layout: OutputLayout,
}

impl KubeconfigAdapter {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    pub fn paths(&self, cluster_name: &str) -> KubeconfigPaths {
        KubeconfigPaths {
            host: self.layout.local_kubeconfig(cluster_name),
            container: self.layout.container_kubeconfig(cluster_name),
        }
    }

    /// Derive both variants of `source` and persist them
    pub fn derive(
        &self,
        cluster_name: &str,
        source: &Path,
        internal_address: &str,
    ) -> ArmadaResult<KubeconfigPaths> {
        let kubeconfig_error = |path: &Path, reason: String| ArmadaError::Kubeconfig {
            cluster: cluster_name.to_string(),
            path: path.to_path_buf(),
            reason,
        };

        let text = fs::read_to_string(source).map_err(|e| kubeconfig_error(source, e.to_string()))?;
        let variants = derive_variants(cluster_name, &text, internal_address)
            .map_err(|reason| kubeconfig_error(source, reason))?;

        let paths = self.paths(cluster_name);
        for (path, contents) in [(&paths.host, &variants.host), (&paths.container, &variants.container)] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| ArmadaError::io(parent, e))?;
            }
            fs::write(path, contents).map_err(|e| ArmadaError::io(path, e))?;
        }

        crate::log_debug!(
            "Kubeconfigs for {} written to {} and {}",
            cluster_name,
            paths.host.display(),
            paths.container.display()
        );
        Ok(paths)
    }

    /// Both variants exist on disk
    pub fn is_complete(&self, cluster_name: &str) -> bool {
        let paths = self.paths(cluster_name);
        paths.host.exists() && paths.container.exists()
    }

    /// Variant usable from wherever this process runs
    pub async fn resolve_active_path(
        &self,
        cluster_name: &str,
        inspector: &dyn ContainerInspector,
    ) -> ArmadaResult<PathBuf> {
        let paths = self.paths(cluster_name);
        let Some(local) = outbound_address() else {
            return Ok(paths.host);
        };

        let subnets = inspector.bridge_subnets().await?;
        if address_in_subnets(local, &subnets) {
            crate::log_debug!(
                "{} is on a bridge network, using {}",
                local,
                paths.container.display()
            );
            Ok(paths.container)
        } else {
            Ok(paths.host)
        }
    }
}

/// Local address the kernel would route external traffic from
fn outbound_address() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("1.1.1.1:80").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(addr) => Some(addr),
        IpAddr::V6(_) => None,
    }
}

/// Parse `a.b.c.d/len` into network address and prefix length
fn parse_cidr(cidr: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, len) = cidr.trim().split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let len: u8 = len.parse().ok()?;
    (len <= 32).then_some((addr, len))
}

pub fn cidr_contains(cidr: &str, addr: Ipv4Addr) -> bool {
    let Some((network, len)) = parse_cidr(cidr) else {
        return false;
    };
    let mask = if len == 0 { 0 } else { u32::MAX << (32 - len) };
    u32::from(network) & mask == u32::from(addr) & mask
}

pub fn address_in_subnets(addr: Ipv4Addr, subnets: &[String]) -> bool {
    subnets.iter().any(|cidr| cidr_contains(cidr, addr))
}
