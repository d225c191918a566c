//! Single-cluster provisioning steps

use crate::config::ClusterSpec;
use crate::fleet::store::ClusterStore;
use crate::install::{ManifestRenderer, cni, tiller};
use crate::k8s::kind::{ClusterEngine, CreateRequest};
use crate::k8s::kubeconfig::{KubeconfigAdapter, KubeconfigPaths};
use crate::k8s::session::{ClusterConnector, ClusterSession};
use crate::utils::container::ContainerInspector;
use crate::utils::errors::ArmadaResult;
use crate::utils::progress::ClusterProgress;
use std::path::Path;
use std::sync::Arc;

/// External collaborators shared by every cluster task of a fleet call
pub struct FleetContext {
    pub engine: Arc<dyn ClusterEngine>,
    pub inspector: Arc<dyn ContainerInspector>,
    pub connector: Arc<dyn ClusterConnector>,
    pub renderer: ManifestRenderer<'static>,
    pub store: ClusterStore,
    pub kubeconfigs: KubeconfigAdapter,
}

/// Steps run for one cluster; each cluster has exactly one owner task
#[derive(Clone)]
pub struct ClusterLifecycle {
    ctx: Arc<FleetContext>,
}

impl ClusterLifecycle {
    pub fn new(ctx: Arc<FleetContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &FleetContext {
        &self.ctx
    }

    /// Render and persist the bring-up config, then create the nodes
    pub async fn bring_up(&self, spec: &ClusterSpec, progress: &ClusterProgress) -> ArmadaResult<()> {
        progress.set_step(&format!("{}: rendering config", spec.name));
        let config = self.ctx.renderer.render_cluster_config(spec)?;
        let config_path = self.ctx.store.save(spec, &config)?;

        crate::log_debug!(
            "{}: cni={} pod={} service={} kubeadm={}",
            spec.name,
            spec.cni,
            spec.pod_subnet,
            spec.service_subnet,
            spec.kube_version_profile.kubeadm_api_version()
        );

        progress.set_step(&format!("{}: creating nodes", spec.name));
        self.ctx
            .engine
            .create(&CreateRequest {
                name: spec.name.clone(),
                config_path,
                node_image: spec.node_image.clone(),
                retain: spec.retain_on_failure,
                wait: spec.wait_for_ready,
                kubeconfig_path: spec.kubeconfig_path.clone(),
            })
            .await
    }

    /// Derive kubeconfigs, install the CNI and the optional component
    pub async fn finalize(&self, spec: &ClusterSpec, progress: &ClusterProgress) -> ArmadaResult<KubeconfigPaths> {
        progress.set_step(&format!("{}: writing kubeconfigs", spec.name));
        let paths = self.derive_kubeconfigs(&spec.name, &spec.kubeconfig_path).await?;

        if spec.cni.is_default() && !spec.deploy_optional_component {
            return Ok(paths);
        }

        let session = self.connect(&spec.name).await?;

        if !spec.cni.is_default() {
            progress.set_step(&format!("{}: installing {}", spec.name, spec.cni));
            cni::install(&session, &self.ctx.renderer, spec).await?;
        }

        if spec.deploy_optional_component {
            progress.set_step(&format!("{}: deploying tiller", spec.name));
            tiller::install(&session, &self.ctx.renderer).await?;
        }

        Ok(paths)
    }

    pub async fn derive_kubeconfigs(&self, name: &str, raw_kubeconfig: &Path) -> ArmadaResult<KubeconfigPaths> {
        let address = self.ctx.inspector.control_plane_address(name).await?;
        self.ctx.kubeconfigs.derive(name, raw_kubeconfig, &address)
    }

    /// Session over whichever kubeconfig variant is reachable from here
    pub async fn connect(&self, name: &str) -> ArmadaResult<ClusterSession> {
        let path = self
            .ctx
            .kubeconfigs
            .resolve_active_path(name, self.ctx.inspector.as_ref())
            .await?;
        self.ctx.connector.connect(name, &path).await
    }
}
