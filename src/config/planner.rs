//! Per-cluster parameter planning
//!
//! Turns a cluster index plus the fleet-wide create flags into a fully
//! resolved [`ClusterSpec`]. Planning is pure: no files are touched and no
//! external process is consulted.

use crate::config::settings::Settings;
use crate::utils::errors::{ArmadaError, ArmadaResult};
use crate::utils::paths::OutputLayout;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?(?:[-+][0-9A-Za-z.-]+)?$").expect("valid version regex")
});

/// Oldest Kubernetes minor release served by the current kubeadm schema
const CURRENT_SCHEMA_SINCE: (u64, u64) = (1, 15);

/// Pluggable pod network choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CniKind {
    /// kind's built-in kindnet
    #[default]
    #[serde(rename = "kindnet")]
    Default,
    Weave,
    Flannel,
    Calico,
}

impl CniKind {
    pub fn is_default(&self) -> bool {
        matches!(self, CniKind::Default)
    }
}

impl FromStr for CniKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" | "kindnet" => Ok(CniKind::Default),
            "weave" => Ok(CniKind::Weave),
            "flannel" => Ok(CniKind::Flannel),
            "calico" => Ok(CniKind::Calico),
            _ => Err(format!(
                "Invalid CNI: {}. Must be one of kindnet, weave, flannel, calico",
                s
            )),
        }
    }
}

impl std::fmt::Display for CniKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CniKind::Default => write!(f, "kindnet"),
            CniKind::Weave => write!(f, "weave"),
            CniKind::Flannel => write!(f, "flannel"),
            CniKind::Calico => write!(f, "calico"),
        }
    }
}

/// kubeadm configuration schema used in the bring-up config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KubeVersionProfile {
    /// Kubernetes older than 1.15
    Legacy,
    #[default]
    Current,
}

impl KubeVersionProfile {
    pub fn kubeadm_api_version(&self) -> &'static str {
        match self {
            KubeVersionProfile::Legacy => "kubeadm.k8s.io/v1beta1",
            KubeVersionProfile::Current => "kubeadm.k8s.io/v1beta2",
        }
    }
}

/// Fleet-wide flags of a `create clusters` call
#[derive(Debug, Clone, PartialEq)]
pub struct CreateFlags {
    /// Node image, e.g. `kindest/node:v1.16.3`; empty means the engine default
    pub image: String,
    pub cni: CniKind,
    pub retain: bool,
    /// Deploy the optional extra component (tiller)
    pub tiller: bool,
    pub overlap: bool,
    /// Control-plane readiness wait handed to the bring-up engine
    pub wait: Duration,
    pub num_clusters: u32,
}

impl Default for CreateFlags {
    fn default() -> Self {
        Self {
            image: String::new(),
            cni: CniKind::Default,
            retain: true,
            tiller: false,
            overlap: false,
            wait: Duration::from_secs(300),
            num_clusters: 2,
        }
    }
}

/// Everything needed to bring up and finalize one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSpec {
    pub index: u32,
    pub name: String,
    pub cni: CniKind,
    pub pod_subnet: String,
    pub service_subnet: String,
    pub dns_domain: String,
    pub kube_version_profile: KubeVersionProfile,
    pub worker_count: u32,
    /// Zero unless the default CNI is selected
    pub wait_for_ready: Duration,
    pub node_image: Option<String>,
    pub retain_on_failure: bool,
    pub deploy_optional_component: bool,
    /// Where the bring-up engine writes the unmodified kubeconfig
    pub kubeconfig_path: PathBuf,
}

/// Holds the fleet-invariant parameters and plans clusters by index
#[derive(Debug, Clone)]
pub struct Planner {
    name_base: String,
    pod_base: Ipv4Addr,
    pod_mask: u8,
    service_base: Ipv4Addr,
    service_mask: u8,
    workers: u32,
    layout: OutputLayout,
}

impl Planner {
    pub fn new(settings: &Settings, layout: OutputLayout) -> Self {
        Self {
            name_base: settings.defaults.cluster_name_base.clone(),
            pod_base: settings.network.pod_cidr_base,
            pod_mask: settings.network.pod_cidr_mask,
            service_base: settings.network.service_cidr_base,
            service_mask: settings.network.service_cidr_mask,
            workers: settings.defaults.num_workers,
            layout,
        }
    }

    pub fn cluster_name(&self, index: u32) -> String {
        format!("{}{}", self.name_base, index)
    }

    /// Resolve the spec for the cluster at `index` (1-based)
    pub fn plan(&self, index: u32, flags: &CreateFlags) -> ArmadaResult<ClusterSpec> {
        let name = self.cluster_name(index);

        let (pod_subnet, service_subnet) = if flags.overlap {
            (
                cidr(self.pod_base, self.pod_mask),
                cidr(self.service_base, self.service_mask),
            )
        } else {
            (
                cidr(advance_second_octet(self.pod_base, index.wrapping_mul(4)), self.pod_mask),
                cidr(advance_second_octet(self.service_base, index), self.service_mask),
            )
        };

        let node_image = Some(flags.image.trim())
            .filter(|image| !image.is_empty())
            .map(str::to_string);

        let kube_version_profile = match &node_image {
            Some(image) => version_profile(&name, image)?,
            None => KubeVersionProfile::Current,
        };

        let wait_for_ready = if flags.cni.is_default() {
            flags.wait
        } else {
            Duration::ZERO
        };

        Ok(ClusterSpec {
            index,
            dns_domain: format!("{}.local", name),
            kubeconfig_path: self.layout.raw_kubeconfig(&name),
            name,
            cni: flags.cni,
            pod_subnet,
            service_subnet,
            kube_version_profile,
            worker_count: self.workers,
            wait_for_ready,
            node_image,
            retain_on_failure: flags.retain,
            deploy_optional_component: flags.tiller,
        })
    }
}

fn cidr(base: Ipv4Addr, mask: u8) -> String {
    format!("{}/{}", base, mask)
}

/// Second octet advanced by `offset`, wrapping at the octet boundary
fn advance_second_octet(base: Ipv4Addr, offset: u32) -> Ipv4Addr {
    let [a, b, c, d] = base.octets();
    Ipv4Addr::new(a, b.wrapping_add((offset % 256) as u8), c, d)
}

/// Pick the kubeadm schema from an image tag of the form `<repo>:v<version>`
pub fn version_profile(cluster: &str, image: &str) -> ArmadaResult<KubeVersionProfile> {
    let config_error = || ArmadaError::Config {
        cluster: cluster.to_string(),
        image: image.to_string(),
    };

    let parts: Vec<&str> = image.split(":v").collect();
    let [_, version] = parts.as_slice() else {
        return Err(config_error());
    };

    let captures = VERSION_RE.captures(version).ok_or_else(config_error)?;
    let major: u64 = captures[1].parse().map_err(|_| config_error())?;
    let minor: u64 = captures[2].parse().map_err(|_| config_error())?;

    if (major, minor) < CURRENT_SCHEMA_SINCE {
        Ok(KubeVersionProfile::Legacy)
    } else {
        Ok(KubeVersionProfile::Current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> Planner {
        Planner::new(
            &Settings::default(),
            OutputLayout::new("/work/output", "/home/me/.kube"),
        )
    }

    #[test]
    fn test_default_flags() {
        let flags = CreateFlags {
            wait: Duration::ZERO,
            ..CreateFlags::default()
        };
        let spec = planner().plan(1, &flags).unwrap();
        assert_eq!(spec.name, "cl1");
        assert_eq!(spec.cni, CniKind::Default);
        assert_eq!(spec.pod_subnet, "10.4.0.0/14");
        assert_eq!(spec.service_subnet, "100.1.0.0/16");
        assert_eq!(spec.dns_domain, "cl1.local");
        assert_eq!(spec.kube_version_profile, KubeVersionProfile::Current);
        assert_eq!(spec.worker_count, 2);
        assert_eq!(spec.node_image, None);
        assert_eq!(spec.kubeconfig_path, PathBuf::from("/home/me/.kube/kind-config-cl1"));
    }

    #[test]
    fn test_subnets_without_overlap() {
        let planner = planner();
        let flags = CreateFlags::default();
        for i in 1..=70u32 {
            let spec = planner.plan(i, &flags).unwrap();
            assert_eq!(spec.pod_subnet, format!("10.{}.0.0/14", (4 * i) % 256));
            assert_eq!(spec.service_subnet, format!("100.{}.0.0/16", i % 256));
        }
    }

    #[test]
    fn test_subnets_with_overlap() {
        let planner = planner();
        let flags = CreateFlags {
            overlap: true,
            ..CreateFlags::default()
        };
        for i in [1, 2, 7, 200] {
            let spec = planner.plan(i, &flags).unwrap();
            assert_eq!(spec.pod_subnet, "10.0.0.0/14");
            assert_eq!(spec.service_subnet, "100.0.0.0/16");
        }
    }

    #[test]
    fn test_version_profile_selection() {
        assert_eq!(
            version_profile("cl1", "x/y:v1.11.1").unwrap(),
            KubeVersionProfile::Legacy
        );
        assert_eq!(
            version_profile("cl1", "x/y:v1.14.10").unwrap(),
            KubeVersionProfile::Legacy
        );
        assert_eq!(
            version_profile("cl1", "x/y:v1.15.0").unwrap(),
            KubeVersionProfile::Current
        );
        assert_eq!(
            version_profile("cl1", "x/y:v1.16.3").unwrap(),
            KubeVersionProfile::Current
        );
        assert_eq!(
            version_profile("cl1", "kindest/node:v1.17.0-rc.1").unwrap(),
            KubeVersionProfile::Current
        );
    }

    #[test]
    fn test_malformed_image_is_an_error() {
        for image in ["kindest/node:1.16.3", "kindest/node", "a:v1.1:v2.2", "x/y:vlatest"] {
            let err = version_profile("cl3", image).unwrap_err();
            assert!(matches!(err, ArmadaError::Config { .. }), "{}", image);
            assert!(err.to_string().contains("cl3"));
            assert!(err.to_string().contains(image));
        }
    }

    #[test]
    fn test_plan_with_image() {
        let planner = planner();
        let legacy = CreateFlags {
            image: "kindest/node:v1.11.1".to_string(),
            ..CreateFlags::default()
        };
        let spec = planner.plan(1, &legacy).unwrap();
        assert_eq!(spec.kube_version_profile, KubeVersionProfile::Legacy);
        assert_eq!(spec.node_image.as_deref(), Some("kindest/node:v1.11.1"));

        let broken = CreateFlags {
            image: "kindest/node:1.16.3".to_string(),
            ..CreateFlags::default()
        };
        assert!(planner.plan(1, &broken).is_err());
    }

    #[test]
    fn test_wait_only_for_default_cni() {
        let planner = planner();
        let wait = Duration::from_secs(120);
        let default = planner
            .plan(1, &CreateFlags { wait, ..CreateFlags::default() })
            .unwrap();
        assert_eq!(default.wait_for_ready, wait);

        for cni in [CniKind::Weave, CniKind::Flannel, CniKind::Calico] {
            let spec = planner
                .plan(1, &CreateFlags { wait, cni, ..CreateFlags::default() })
                .unwrap();
            assert_eq!(spec.wait_for_ready, Duration::ZERO);
            assert_eq!(spec.cni, cni);
        }
    }

    #[test]
    fn test_two_overlapping_flannel_clusters() {
        let planner = planner();
        let flags = CreateFlags {
            cni: CniKind::Flannel,
            overlap: true,
            num_clusters: 2,
            ..CreateFlags::default()
        };
        let specs: Vec<ClusterSpec> = (1..=flags.num_clusters)
            .map(|i| planner.plan(i, &flags).unwrap())
            .collect();

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "cl1");
        assert_eq!(specs[1].name, "cl2");
        assert_eq!(specs[0].pod_subnet, specs[1].pod_subnet);
        assert_eq!(specs[0].service_subnet, specs[1].service_subnet);
        assert!(specs.iter().all(|s| s.wait_for_ready == Duration::ZERO));
    }

    #[test]
    fn test_cni_kind_from_str_and_display() {
        assert_eq!(CniKind::from_str("calico").unwrap(), CniKind::Calico);
        assert_eq!(CniKind::from_str("Weave").unwrap(), CniKind::Weave);
        assert_eq!(CniKind::from_str("default").unwrap(), CniKind::Default);
        assert!(CniKind::from_str("cilium").is_err());
        assert_eq!(CniKind::Default.to_string(), "kindnet");
        assert_eq!(CniKind::Flannel.to_string(), "flannel");
    }
}
