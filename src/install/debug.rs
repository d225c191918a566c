//! Debug workloads for exercising cluster networking

use crate::install::templates::{DebugWorkload, ManifestRenderer};
use crate::k8s::apply::DEBUG_KINDS;
use crate::k8s::session::ClusterSession;
use crate::utils::errors::ArmadaResult;

/// Apply the workload and wait until it runs on every node
pub async fn deploy(
    session: &ClusterSession,
    renderer: &ManifestRenderer<'_>,
    workload: DebugWorkload,
) -> ArmadaResult<()> {
    crate::log_info!(
        "Deploying {} to {}...",
        workload.daemonset_name(),
        session.cluster()
    );
    session
        .apply(renderer.debug_manifest(workload), workload.label(), DEBUG_KINDS)
        .await?;
    session
        .wait_for_daemonset(workload.namespace(), workload.daemonset_name())
        .await
}
