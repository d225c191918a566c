//! Manifest and bring-up config rendering using Handlebars.
//!
//! Templates are compiled into the binary. Each render parses its template
//! afresh so a broken template only fails the cluster being rendered.

use crate::config::{ClusterSpec, CniKind};
use crate::utils::errors::{ArmadaError, ArmadaResult};
use handlebars::{Handlebars, handlebars_helper};
use serde::Serialize;

const CLUSTER_CONFIG: &str = include_str!("../../templates/cluster-config.yaml");
const CALICO_CRD: &str = include_str!("../../templates/calico-crd.yaml");
const CALICO_DAEMONSET: &str = include_str!("../../templates/calico-daemonset.yaml");
const FLANNEL_DAEMONSET: &str = include_str!("../../templates/flannel-daemonset.yaml");
const WEAVE_DAEMONSET: &str = include_str!("../../templates/weave-daemonset.yaml");
const TILLER: &str = include_str!("../../templates/tiller.yaml");
const NETSHOOT: &str = include_str!("../../templates/debug/netshoot-daemonset.yaml");
const NETSHOOT_HOST: &str = include_str!("../../templates/debug/netshoot-daemonset-host.yaml");
const NGINX_DEMO: &str = include_str!("../../templates/debug/nginx-demo-daemonset.yaml");

// Inclusive numeric sequence, used for the worker node stanzas.
// Usage: `{{#each (iterate 1 worker_count)}}`
handlebars_helper!(iterate: |start: u64, end: u64| (start..=end).collect::<Vec<u64>>());

/// Debug workloads deployable to running clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugWorkload {
    Netshoot,
    NetshootHostNetwork,
    NginxDemo,
}

impl DebugWorkload {
    /// DaemonSet created by the workload's manifest
    pub fn daemonset_name(&self) -> &'static str {
        match self {
            DebugWorkload::Netshoot => "netshoot",
            DebugWorkload::NetshootHostNetwork => "netshoot-host-net",
            DebugWorkload::NginxDemo => "nginx-demo",
        }
    }

    pub fn namespace(&self) -> &'static str {
        "default"
    }

    pub fn label(&self) -> &'static str {
        match self {
            DebugWorkload::Netshoot | DebugWorkload::NetshootHostNetwork => "netshoot",
            DebugWorkload::NginxDemo => "nginx-demo",
        }
    }
}

/// Values visible to templates
#[derive(Debug, Serialize)]
struct RenderContext<'a> {
    name: &'a str,
    pod_subnet: &'a str,
    service_subnet: &'a str,
    dns_domain: &'a str,
    kubeadm_api_version: &'a str,
    worker_count: u32,
    disable_default_cni: bool,
}

impl<'a> From<&'a ClusterSpec> for RenderContext<'a> {
    fn from(spec: &'a ClusterSpec) -> Self {
        Self {
            name: &spec.name,
            pod_subnet: &spec.pod_subnet,
            service_subnet: &spec.service_subnet,
            dns_domain: &spec.dns_domain,
            kubeadm_api_version: spec.kube_version_profile.kubeadm_api_version(),
            worker_count: spec.worker_count,
            disable_default_cni: !spec.cni.is_default(),
        }
    }
}

pub struct ManifestRenderer<'a> {
    handlebars: Handlebars<'a>,
}

impl Default for ManifestRenderer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestRenderer<'_> {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        // YAML output, never HTML
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("iterate", Box::new(iterate));
        Self { handlebars }
    }

    fn render(&self, template_name: &str, template: &str, spec: &ClusterSpec) -> ArmadaResult<String> {
        self.handlebars
            .render_template(template, &RenderContext::from(spec))
            .map_err(|e| ArmadaError::Template {
                cluster: spec.name.clone(),
                template: template_name.to_string(),
                reason: e.to_string(),
            })
    }

    /// Bring-up engine configuration for the cluster
    pub fn render_cluster_config(&self, spec: &ClusterSpec) -> ArmadaResult<String> {
        self.render("cluster-config.yaml", CLUSTER_CONFIG, spec)
    }

    /// Manifest for a pluggable CNI; the default CNI ships with the node image
    pub fn render_cni_manifest(&self, cni: CniKind, spec: &ClusterSpec) -> ArmadaResult<Option<String>> {
        let (name, template) = match cni {
            CniKind::Default => return Ok(None),
            CniKind::Weave => ("weave-daemonset.yaml", WEAVE_DAEMONSET),
            CniKind::Flannel => ("flannel-daemonset.yaml", FLANNEL_DAEMONSET),
            CniKind::Calico => ("calico-daemonset.yaml", CALICO_DAEMONSET),
        };
        self.render(name, template, spec).map(Some)
    }

    pub fn calico_crds(&self) -> &'static str {
        CALICO_CRD
    }

    pub fn tiller_manifest(&self) -> &'static str {
        TILLER
    }

    pub fn debug_manifest(&self, workload: DebugWorkload) -> &'static str {
        match workload {
            DebugWorkload::Netshoot => NETSHOOT,
            DebugWorkload::NetshootHostNetwork => NETSHOOT_HOST,
            DebugWorkload::NginxDemo => NGINX_DEMO,
        }
    }
}
