//! Path layout for generated artifacts

use std::path::{Path, PathBuf};

pub const KIND_CLUSTERS_DIR: &str = "kind-clusters";
pub const LOCAL_KUBECONFIG_DIR: &str = "kind-config/local-dev";
pub const CONTAINER_KUBECONFIG_DIR: &str = "kind-config/container";
pub const LOGS_DIR: &str = "logs";

const KIND_CONFIG_SUFFIX: &str = "-kind-config.yaml";

/// Where everything armada writes lives, rooted at `<workdir>/<output_dir>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
    raw_kubeconfig_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, raw_kubeconfig_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            raw_kubeconfig_dir: raw_kubeconfig_dir.into(),
        }
    }

    /// Layout under the current directory, with raw kubeconfigs in ~/.kube
    pub fn from_workdir(output_dir: &str) -> std::io::Result<Self> {
        let root = std::env::current_dir()?.join(output_dir);
        let home = dirs::home_dir().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            )
        })?;
        Ok(Self::new(root, home.join(".kube")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_clusters_dir(&self) -> PathBuf {
        self.root.join(KIND_CLUSTERS_DIR)
    }

    pub fn local_kubeconfig_dir(&self) -> PathBuf {
        self.root.join(LOCAL_KUBECONFIG_DIR)
    }

    pub fn container_kubeconfig_dir(&self) -> PathBuf {
        self.root.join(CONTAINER_KUBECONFIG_DIR)
    }

    pub fn logs_root(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// Rendered bring-up configuration
    pub fn cluster_config_file(&self, name: &str) -> PathBuf {
        self.kind_clusters_dir()
            .join(format!("{}{}", name, KIND_CONFIG_SUFFIX))
    }

    /// Sidecar record holding the cluster's metadata
    pub fn record_file(&self, name: &str) -> PathBuf {
        self.kind_clusters_dir().join(format!("{}.json", name))
    }

    pub fn local_kubeconfig(&self, name: &str) -> PathBuf {
        self.local_kubeconfig_dir().join(kubeconfig_file_name(name))
    }

    pub fn container_kubeconfig(&self, name: &str) -> PathBuf {
        self.container_kubeconfig_dir().join(kubeconfig_file_name(name))
    }

    /// Unmodified kubeconfig written by the bring-up engine
    pub fn raw_kubeconfig(&self, name: &str) -> PathBuf {
        self.raw_kubeconfig_dir.join(kubeconfig_file_name(name))
    }

    pub fn logs_dir(&self, name: &str) -> PathBuf {
        self.logs_root().join(name)
    }
}

pub fn kubeconfig_file_name(name: &str) -> String {
    format!("kind-config-{}", name)
}

/// Cluster name encoded in a bring-up config file name, if it follows the layout
pub fn cluster_name_from_config_file(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(KIND_CONFIG_SUFFIX)
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = OutputLayout::new("/work/output", "/home/me/.kube");
        assert_eq!(
            layout.cluster_config_file("cl1"),
            PathBuf::from("/work/output/kind-clusters/cl1-kind-config.yaml")
        );
        assert_eq!(
            layout.local_kubeconfig("cl1"),
            PathBuf::from("/work/output/kind-config/local-dev/kind-config-cl1")
        );
        assert_eq!(
            layout.container_kubeconfig("cl1"),
            PathBuf::from("/work/output/kind-config/container/kind-config-cl1")
        );
        assert_eq!(
            layout.raw_kubeconfig("cl1"),
            PathBuf::from("/home/me/.kube/kind-config-cl1")
        );
        assert_eq!(layout.logs_dir("cl1"), PathBuf::from("/work/output/logs/cl1"));
    }

    #[test]
    fn test_cluster_name_from_config_file() {
        assert_eq!(cluster_name_from_config_file("cl1-kind-config.yaml"), Some("cl1"));
        assert_eq!(
            cluster_name_from_config_file("east-west-kind-config.yaml"),
            Some("east-west")
        );
        assert_eq!(cluster_name_from_config_file("cl1.json"), None);
        assert_eq!(cluster_name_from_config_file("-kind-config.yaml"), None);
    }
}
