//! Tiller (Helm v2 server) installation

use crate::install::templates::ManifestRenderer;
use crate::k8s::apply::WORKLOAD_KINDS;
use crate::k8s::session::ClusterSession;
use crate::utils::errors::ArmadaResult;

pub const TILLER_NAMESPACE: &str = "kube-system";
pub const TILLER_DEPLOYMENT: &str = "tiller-deploy";

pub async fn install(session: &ClusterSession, renderer: &ManifestRenderer<'_>) -> ArmadaResult<()> {
    crate::log_info!("Deploying tiller to {}...", session.cluster());
    session
        .apply(renderer.tiller_manifest(), "Tiller", WORKLOAD_KINDS)
        .await?;
    session
        .wait_for_deployment(TILLER_NAMESPACE, TILLER_DEPLOYMENT)
        .await
}
