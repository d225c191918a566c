//! Command implementations for armada CLI

pub mod check;
pub mod create;
pub mod deploy;
pub mod destroy;
pub mod export;
pub mod load;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{Planner, Settings};
use crate::fleet::{ClusterStore, FleetContext, FleetOrchestrator};
use crate::install::ManifestRenderer;
use crate::k8s::kubeconfig::KubeconfigAdapter;
use crate::k8s::wait::PollSettings;
use crate::k8s::{KindCli, KubeConnector, ReadinessWaiter, TokioClock};
use crate::utils::{DockerCli, LoggingConfig, OutputLayout};

/// Settings, logging choice and on-disk layout shared by every fleet command
pub struct Workspace {
    pub settings: Settings,
    pub logging: LoggingConfig,
    pub layout: OutputLayout,
}

impl Workspace {
    pub fn new(settings: Settings, logging: LoggingConfig) -> Result<Self> {
        let layout = OutputLayout::from_workdir(&settings.defaults.output_dir)
            .context("Failed to resolve the output directory")?;
        Ok(Self {
            settings,
            logging,
            layout,
        })
    }

    pub fn poll_settings(&self) -> PollSettings {
        let timeouts = &self.settings.timeouts;
        PollSettings {
            timeout: timeouts.resources(),
            workload_interval: timeouts.workload_poll(),
            pod_interval: timeouts.pod_poll(),
        }
    }

    /// Orchestrator wired to kind, docker and the Kubernetes API
    pub fn orchestrator(&self) -> FleetOrchestrator {
        let waiter = ReadinessWaiter::new(Arc::new(TokioClock), self.poll_settings());
        let ctx = FleetContext {
            engine: Arc::new(KindCli::new()),
            inspector: Arc::new(DockerCli::new(self.settings.defaults.docker_network.clone())),
            connector: Arc::new(KubeConnector::new(waiter)),
            renderer: ManifestRenderer::new(),
            store: ClusterStore::new(self.layout.clone()),
            kubeconfigs: KubeconfigAdapter::new(self.layout.clone()),
        };

        FleetOrchestrator::new(
            Arc::new(ctx),
            Planner::new(&self.settings, self.layout.clone()),
            self.logging,
            self.settings.behavior.show_progress,
        )
    }
}

/// Explicit cluster list, or every cluster armada knows about
pub(crate) fn targets(orchestrator: &FleetOrchestrator, requested: &[String]) -> Result<Vec<String>> {
    let names = orchestrator.resolve_targets(requested)?;
    if names.is_empty() {
        crate::log_warn!("No clusters found, create some with: armada create clusters");
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_settings_follow_timeouts() {
        let mut settings = Settings::default();
        settings.timeouts.resources_secs = 600;
        settings.timeouts.pod_poll_secs = 5;
        let workspace = Workspace {
            settings,
            logging: LoggingConfig::default(),
            layout: OutputLayout::new("/work/output", "/home/me/.kube"),
        };

        let poll = workspace.poll_settings();
        assert_eq!(poll.timeout.as_secs(), 600);
        assert_eq!(poll.workload_interval.as_secs(), 10);
        assert_eq!(poll.pod_interval.as_secs(), 5);
    }
}
