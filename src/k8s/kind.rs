//! Kind cluster management operations

use crate::utils::errors::{ArmadaError, ArmadaResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Arguments for bringing up one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub config_path: PathBuf,
    pub node_image: Option<String>,
    pub retain: bool,
    /// Control-plane readiness wait, zero to skip
    pub wait: Duration,
    pub kubeconfig_path: PathBuf,
}

impl CreateRequest {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--config".to_string(),
            self.config_path.display().to_string(),
            "--kubeconfig".to_string(),
            self.kubeconfig_path.display().to_string(),
        ];
        if let Some(image) = &self.node_image {
            args.push("--image".to_string());
            args.push(image.clone());
        }
        if self.retain {
            args.push("--retain".to_string());
        }
        if !self.wait.is_zero() {
            args.push("--wait".to_string());
            args.push(format!("{}s", self.wait.as_secs()));
        }
        args
    }
}

/// The external engine that turns a config into running node containers
#[async_trait]
pub trait ClusterEngine: Send + Sync {
    async fn list_clusters(&self) -> ArmadaResult<Vec<String>>;

    async fn create(&self, request: &CreateRequest) -> ArmadaResult<()>;

    async fn delete(&self, name: &str, kubeconfig_path: &Path) -> ArmadaResult<()>;

    async fn export_logs(&self, name: &str, dir: &Path) -> ArmadaResult<()>;

    async fn load_image(&self, name: &str, image: &str) -> ArmadaResult<()>;
}

/// `kind` CLI backed engine
#[derive(Debug, Clone, Default)]
pub struct KindCli;

impl KindCli {
    pub fn new() -> Self {
        Self
    }

    pub fn command(&self) -> &str {
        "kind"
    }

    /// Run kind, returning stdout or a one-line failure description
    async fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<String, String> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        crate::log_debug!("Running: {} {}", self.command(), args.join(" "));

        let output = Command::new(self.command())
            .args(&args)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.command(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} {} exited with {}: {}",
                self.command(),
                args.join(" "),
                output.status,
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ClusterEngine for KindCli {
    async fn list_clusters(&self) -> ArmadaResult<Vec<String>> {
        let stdout = self
            .run(&["get", "clusters"])
            .await
            .map_err(|reason| ArmadaError::runtime(self.command(), reason))?;
        Ok(parse_cluster_list(&stdout))
    }

    async fn create(&self, request: &CreateRequest) -> ArmadaResult<()> {
        crate::log_info!("Creating cluster {}...", request.name);
        self.run(&request.args())
            .await
            .map_err(|reason| ArmadaError::Provisioning {
                cluster: request.name.clone(),
                reason,
            })?;
        crate::log_info!("✔ Cluster {} created", request.name);
        Ok(())
    }

    async fn delete(&self, name: &str, kubeconfig_path: &Path) -> ArmadaResult<()> {
        crate::log_info!("Deleting cluster {}...", name);
        let kubeconfig = kubeconfig_path.display().to_string();
        self.run(&["delete", "cluster", "--name", name, "--kubeconfig", &kubeconfig])
            .await
            .map_err(|reason| ArmadaError::Cleanup {
                cluster: name.to_string(),
                reason,
            })?;
        crate::log_info!("✔ Cluster {} deleted", name);
        Ok(())
    }

    async fn export_logs(&self, name: &str, dir: &Path) -> ArmadaResult<()> {
        let dir = dir.display().to_string();
        self.run(&["export", "logs", &dir, "--name", name])
            .await
            .map_err(|reason| ArmadaError::runtime(self.command(), reason))?;
        crate::log_info!("✔ Logs for {} exported to {}", name, dir);
        Ok(())
    }

    async fn load_image(&self, name: &str, image: &str) -> ArmadaResult<()> {
        self.run(&["load", "docker-image", image, "--name", name])
            .await
            .map_err(|reason| ArmadaError::runtime(self.command(), reason))?;
        crate::log_info!("✔ Image {} loaded into {}", image, name);
        Ok(())
    }
}

fn parse_cluster_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        // kind prints this instead of an empty list
        .filter(|s| !s.is_empty() && !s.starts_with("No kind clusters found"))
        .map(str::to_string)
        .collect()
}
