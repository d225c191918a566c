//! Container runtime inspection (Docker)

use crate::utils::errors::{ArmadaError, ArmadaResult};
use async_trait::async_trait;
use tokio::process::Command;

/// What the fleet needs to know from the container runtime
#[async_trait]
pub trait ContainerInspector: Send + Sync {
    /// Address of the cluster's control-plane container on the cluster network
    async fn control_plane_address(&self, cluster_name: &str) -> ArmadaResult<String>;

    /// CIDRs of every bridge-driver network on the host
    async fn bridge_subnets(&self) -> ArmadaResult<Vec<String>>;

    /// Check if an image exists locally
    async fn image_exists(&self, image: &str) -> ArmadaResult<bool>;
}

/// Docker CLI backed inspector
#[derive(Debug, Clone)]
pub struct DockerCli {
    network: String,
}

impl DockerCli {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
        }
    }

    pub fn command(&self) -> &str {
        "docker"
    }

    async fn output(&self, args: &[&str]) -> ArmadaResult<String> {
        let output = Command::new(self.command())
            .args(args)
            .output()
            .await
            .map_err(|e| ArmadaError::runtime(self.command(), e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ArmadaError::runtime(
                self.command(),
                format!("{} failed: {}", args.join(" "), stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("bridge")
    }
}

pub fn control_plane_container(cluster_name: &str) -> String {
    format!("{}-control-plane", cluster_name)
}

#[async_trait]
impl ContainerInspector for DockerCli {
    async fn control_plane_address(&self, cluster_name: &str) -> ArmadaResult<String> {
        let container = control_plane_container(cluster_name);
        let format = format!(
            "{{{{with index .NetworkSettings.Networks \"{}\"}}}}{{{{.IPAddress}}}}{{{{end}}}}",
            self.network
        );
        let address = self
            .output(&["inspect", "--type", "container", "--format", &format, &container])
            .await?;

        let address = address.trim();
        if address.is_empty() {
            return Err(ArmadaError::runtime(
                self.command(),
                format!(
                    "container {} has no address on network {}",
                    container, self.network
                ),
            ));
        }

        Ok(address.to_string())
    }

    async fn bridge_subnets(&self) -> ArmadaResult<Vec<String>> {
        let ids = self
            .output(&["network", "ls", "--filter", "driver=bridge", "--format", "{{.ID}}"])
            .await?;
        let ids: Vec<&str> = ids.lines().map(str::trim).filter(|s| !s.is_empty()).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec![
            "network",
            "inspect",
            "--format",
            "{{range .IPAM.Config}}{{.Subnet}} {{end}}",
        ];
        args.extend(ids);

        let subnets = self.output(&args).await?;
        Ok(parse_subnet_listing(&subnets))
    }

    async fn image_exists(&self, image: &str) -> ArmadaResult<bool> {
        let status = Command::new(self.command())
            .args(["image", "inspect", image])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map_err(|e| ArmadaError::runtime(self.command(), e.to_string()))?;

        Ok(status.success())
    }
}

/// IPv4 subnets from `docker network inspect` output, one network per line
fn parse_subnet_listing(listing: &str) -> Vec<String> {
    listing
        .split_whitespace()
        .filter(|s| s.contains('/') && !s.contains(':'))
        .map(str::to_string)
        .collect()
}
