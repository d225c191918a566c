//! Pluggable CNI installation

use crate::config::{ClusterSpec, CniKind};
use crate::install::templates::ManifestRenderer;
use crate::k8s::apply::{CRD_KINDS, WORKLOAD_KINDS};
use crate::k8s::session::ClusterSession;
use crate::utils::errors::ArmadaResult;

pub const CNI_NAMESPACE: &str = "kube-system";
pub const DNS_DEPLOYMENT: &str = "coredns";

/// DaemonSet whose rollout marks the CNI as ready
pub fn cni_daemonset(cni: CniKind) -> Option<&'static str> {
    match cni {
        CniKind::Default => None,
        CniKind::Weave => Some("weave-net"),
        CniKind::Flannel => Some("kube-flannel-ds-amd64"),
        CniKind::Calico => Some("calico-node"),
    }
}

fn label(cni: CniKind) -> &'static str {
    match cni {
        CniKind::Default => "kindnet",
        CniKind::Weave => "Weave",
        CniKind::Flannel => "Flannel",
        CniKind::Calico => "Calico",
    }
}

/// Install the cluster's CNI and wait for it and cluster DNS to roll out
pub async fn install(
    session: &ClusterSession,
    renderer: &ManifestRenderer<'_>,
    spec: &ClusterSpec,
) -> ArmadaResult<()> {
    let Some(manifest) = renderer.render_cni_manifest(spec.cni, spec)? else {
        return Ok(());
    };
    let Some(daemonset) = cni_daemonset(spec.cni) else {
        return Ok(());
    };

    crate::log_info!("Installing {} CNI on {}...", label(spec.cni), spec.name);

    if spec.cni == CniKind::Calico {
        session
            .apply(renderer.calico_crds(), "Calico CRD", CRD_KINDS)
            .await?;
    }

    session.apply(&manifest, label(spec.cni), WORKLOAD_KINDS).await?;
    session.wait_for_daemonset(CNI_NAMESPACE, daemonset).await?;
    session
        .wait_for_deployment(CNI_NAMESPACE, DNS_DEPLOYMENT)
        .await?;

    crate::log_info!("✔ {} CNI is ready on {}", label(spec.cni), spec.name);
    Ok(())
}
