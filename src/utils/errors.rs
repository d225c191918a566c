//! Error taxonomy with actionable suggestions

use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type ArmadaResult<T> = Result<T, ArmadaError>;

/// Errors raised while planning, provisioning, finalizing or destroying clusters
#[derive(Error, Debug)]
pub enum ArmadaError {
    /// Malformed node image tag
    #[error(
        "{cluster:?}: could not extract version from {image}, split is by ':v', example of correct image name: kindest/node:v1.15.3"
    )]
    Config { cluster: String, image: String },

    /// Bring-up engine failure
    #[error("failed to create cluster {cluster:?}: {reason}")]
    Provisioning { cluster: String, reason: String },

    /// API rejection other than "already exists"
    #[error("{cluster}: failed to create {kind} {name:?}: {reason}")]
    Apply {
        cluster: String,
        kind: String,
        name: String,
        reason: String,
    },

    /// Manifest text that cannot be decoded into an object
    #[error("{cluster}: failed to decode {label} manifest document: {reason}")]
    Decode {
        cluster: String,
        label: String,
        reason: String,
    },

    /// Workload still not ready after the deadline
    #[error("{cluster}: {target} still not ready after {waited:?}")]
    ReadinessTimeout {
        cluster: String,
        target: String,
        waited: Duration,
    },

    /// Destroy or file removal failure
    #[error("{cluster}: cleanup failed: {reason}")]
    Cleanup { cluster: String, reason: String },

    /// Template parse or render failure
    #[error("{cluster}: failed to render {template}: {reason}")]
    Template {
        cluster: String,
        template: String,
        reason: String,
    },

    /// Kubeconfig read, parse or write failure
    #[error("{cluster}: kubeconfig {path}: {reason}")]
    Kubeconfig {
        cluster: String,
        path: PathBuf,
        reason: String,
    },

    /// Kubernetes client construction failure
    #[error("{cluster}: failed to build kubernetes client: {reason}")]
    Client { cluster: String, reason: String },

    /// Container runtime or bring-up engine CLI failure outside of creation
    #[error("{tool}: {reason}")]
    Runtime { tool: String, reason: String },

    /// A cluster task panicked or was cancelled before reporting
    #[error("{cluster}: task aborted: {reason}")]
    Task { cluster: String, reason: String },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArmadaError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn runtime(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Runtime {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Cluster the error belongs to, if any
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Self::Config { cluster, .. }
            | Self::Provisioning { cluster, .. }
            | Self::Apply { cluster, .. }
            | Self::Decode { cluster, .. }
            | Self::ReadinessTimeout { cluster, .. }
            | Self::Cleanup { cluster, .. }
            | Self::Template { cluster, .. }
            | Self::Kubeconfig { cluster, .. }
            | Self::Client { cluster, .. }
            | Self::Task { cluster, .. } => Some(cluster),
            Self::Runtime { .. } | Self::Io { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReadinessTimeout { .. })
    }

    /// Actionable hints for the operator
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config { .. } => vec![
                "Pass a node image tagged with its version, e.g. --image kindest/node:v1.16.3"
                    .to_string(),
            ],
            Self::Provisioning { cluster, .. } => vec![
                format!("Inspect the nodes: docker ps --filter name={}", cluster),
                "Re-run with --retain to keep failed nodes for debugging".to_string(),
                format!("Clean up with: armada destroy clusters --cluster {}", cluster),
            ],
            Self::Apply { cluster, .. } | Self::Decode { cluster, .. } => vec![
                format!(
                    "Check the API server: kubectl --kubeconfig output/kind-config/local-dev/kind-config-{} get nodes",
                    cluster
                ),
            ],
            Self::ReadinessTimeout { cluster, .. } => vec![
                format!(
                    "Check pending pods: kubectl --kubeconfig output/kind-config/local-dev/kind-config-{} get pods -A",
                    cluster
                ),
                "Increase [timeouts] resources_secs in .armada.toml".to_string(),
            ],
            Self::Cleanup { .. } => {
                vec!["Remove leftovers manually: kind get clusters; docker ps -a".to_string()]
            }
            Self::Runtime { tool, .. } => {
                vec![format!("Ensure '{}' is installed and in your PATH", tool)]
            }
            Self::Template { .. }
            | Self::Kubeconfig { .. }
            | Self::Client { .. }
            | Self::Task { .. }
            | Self::Io { .. } => Vec::new(),
        }
    }

    /// Display the error with suggestions
    pub fn display(&self) {
        crate::log_error!("{}", self);

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            eprintln!();
            eprintln!("{}", "Suggestions:".yellow().bold());
            for suggestion in &suggestions {
                eprintln!("  {} {}", "→".blue(), suggestion);
            }
        }
    }
}

/// Display an error chain, with suggestions when it carries an [`ArmadaError`]
pub fn display_error(err: &anyhow::Error) {
    match err.downcast_ref::<ArmadaError>() {
        Some(armada) => armada.display(),
        None => crate::log_error!("{:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_names_cluster_and_image() {
        let err = ArmadaError::Config {
            cluster: "cl1".to_string(),
            image: "kindest/node:1.16.3".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"cl1\""));
        assert!(msg.contains("kindest/node:1.16.3"));
        assert_eq!(err.cluster(), Some("cl1"));
    }

    #[test]
    fn test_timeout_is_distinguishable() {
        let timeout = ArmadaError::ReadinessTimeout {
            cluster: "cl2".to_string(),
            target: "daemonset kube-system/weave-net".to_string(),
            waited: Duration::from_secs(300),
        };
        let apply = ArmadaError::Apply {
            cluster: "cl2".to_string(),
            kind: "DaemonSet".to_string(),
            name: "weave-net".to_string(),
            reason: "forbidden".to_string(),
        };
        assert!(timeout.is_timeout());
        assert!(!apply.is_timeout());
        assert!(timeout.to_string().contains("still not ready"));
    }

    #[test]
    fn test_error_suggestions() {
        let err = ArmadaError::Provisioning {
            cluster: "cl1".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(err.suggestions().len(), 3);
        assert!(ArmadaError::runtime("docker", "x").cluster().is_none());
    }
}
