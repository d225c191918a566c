//! `deploy netshoot` and `deploy nginx-demo` implementations

use anyhow::Result;

use super::{Workspace, targets};
use crate::install::DebugWorkload;

/// Handle deploy netshoot command
pub async fn deploy_netshoot(workspace: &Workspace, clusters: &[String], host_network: bool) -> Result<()> {
    let workload = if host_network {
        DebugWorkload::NetshootHostNetwork
    } else {
        DebugWorkload::Netshoot
    };
    deploy(workspace, clusters, workload).await
}

/// Handle deploy nginx-demo command
pub async fn deploy_nginx_demo(workspace: &Workspace, clusters: &[String]) -> Result<()> {
    deploy(workspace, clusters, DebugWorkload::NginxDemo).await
}

async fn deploy(workspace: &Workspace, clusters: &[String], workload: DebugWorkload) -> Result<()> {
    let orchestrator = workspace.orchestrator();
    let names = targets(&orchestrator, clusters)?;
    if names.is_empty() {
        return Ok(());
    }

    orchestrator.deploy_workload(&names, workload).await?;
    crate::log_info!(
        "✔ {} is running on: {}",
        workload.daemonset_name(),
        names.join(", ")
    );
    Ok(())
}
