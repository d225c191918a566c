//! Kubernetes client construction from kubeconfig files

use crate::utils::errors::{ArmadaError, ArmadaResult};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;

/// Build a client for `cluster_name` from the kubeconfig at `path`
pub async fn create_client(cluster_name: &str, path: &Path) -> ArmadaResult<Client> {
    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| ArmadaError::Kubeconfig {
        cluster: cluster_name.to_string(),
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| ArmadaError::Client {
            cluster: cluster_name.to_string(),
            reason: e.to_string(),
        })?;

    Client::try_from(config).map_err(|e| ArmadaError::Client {
        cluster: cluster_name.to_string(),
        reason: e.to_string(),
    })
}
