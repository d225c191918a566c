//! On-disk record of the clusters this tool created

use crate::config::{ClusterSpec, CniKind, KubeVersionProfile};
use crate::utils::errors::{ArmadaError, ArmadaResult};
use crate::utils::paths::{OutputLayout, cluster_name_from_config_file};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sidecar stored next to a cluster's bring-up config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub name: String,
    pub cni: CniKind,
    pub pod_subnet: String,
    pub service_subnet: String,
    pub kube_version_profile: KubeVersionProfile,
    pub workers: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_image: Option<String>,
}

impl From<&ClusterSpec> for ClusterRecord {
    fn from(spec: &ClusterSpec) -> Self {
        Self {
            name: spec.name.clone(),
            cni: spec.cni,
            pod_subnet: spec.pod_subnet.clone(),
            service_subnet: spec.service_subnet.clone(),
            kube_version_profile: spec.kube_version_profile,
            workers: spec.worker_count,
            node_image: spec.node_image.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterStore {
    layout: OutputLayout,
}

impl ClusterStore {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Persist the rendered bring-up config and the cluster's record
    pub fn save(&self, spec: &ClusterSpec, cluster_config: &str) -> ArmadaResult<PathBuf> {
        let dir = self.layout.kind_clusters_dir();
        fs::create_dir_all(&dir).map_err(|e| ArmadaError::io(&dir, e))?;

        let config_path = self.layout.cluster_config_file(&spec.name);
        fs::write(&config_path, cluster_config).map_err(|e| ArmadaError::io(&config_path, e))?;

        let record_path = self.layout.record_file(&spec.name);
        let record = serde_json::to_string_pretty(&ClusterRecord::from(spec)).map_err(|e| {
            ArmadaError::io(&record_path, io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        fs::write(&record_path, record).map_err(|e| ArmadaError::io(&record_path, e))?;

        crate::log_debug!("Cluster config for {} written to {}", spec.name, config_path.display());
        Ok(config_path)
    }

    /// Names of every cluster with a config or record on disk, sorted
    pub fn known_clusters(&self) -> ArmadaResult<Vec<String>> {
        let dir = self.layout.kind_clusters_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArmadaError::io(&dir, e)),
        };

        let mut names = BTreeSet::new();
        let mut config_only = Vec::new();

        for entry in entries {
            let path = entry.map_err(|e| ArmadaError::io(&dir, e))?.path();
            let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };

            if path.extension().is_some_and(|ext| ext == "json") {
                match read_record(&path) {
                    Some(record) => {
                        names.insert(record.name);
                    }
                    None => crate::log_warn!("Ignoring unreadable cluster record {}", path.display()),
                }
            } else if let Some(name) = cluster_name_from_config_file(file_name) {
                config_only.push(name.to_string());
            }
        }

        // configs written before records existed
        for name in config_only {
            if !self.layout.record_file(&name).exists() {
                names.insert(name);
            }
        }

        Ok(names.into_iter().collect())
    }

    /// Remove every generated file of the cluster; missing files are fine
    pub fn remove(&self, name: &str) -> ArmadaResult<()> {
        let files = [
            self.layout.cluster_config_file(name),
            self.layout.record_file(name),
            self.layout.local_kubeconfig(name),
            self.layout.container_kubeconfig(name),
            self.layout.raw_kubeconfig(name),
        ];

        let mut failures = Vec::new();
        for file in &files {
            match fs::remove_file(file) {
                Ok(()) => crate::log_debug!("Removed {}", file.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => failures.push(format!("{}: {}", file.display(), e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ArmadaError::Cleanup {
                cluster: name.to_string(),
                reason: failures.join("; "),
            })
        }
    }
}

fn read_record(path: &Path) -> Option<ClusterRecord> {
    let text = fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}
