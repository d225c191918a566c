//! Idempotent creation of multi-document manifests

use crate::utils::errors::{ArmadaError, ArmadaResult};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DynamicObject, PostParams};
use kube::core::{ApiResource, GroupVersionKind};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

/// Object kinds the applier knows how to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    ServiceAccount,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
    ConfigMap,
    DaemonSet,
    Deployment,
    Service,
    Pod,
    PodSecurityPolicy,
    CustomResourceDefinition,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::ServiceAccount => "ServiceAccount",
            ObjectKind::Role => "Role",
            ObjectKind::RoleBinding => "RoleBinding",
            ObjectKind::ClusterRole => "ClusterRole",
            ObjectKind::ClusterRoleBinding => "ClusterRoleBinding",
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::DaemonSet => "DaemonSet",
            ObjectKind::Deployment => "Deployment",
            ObjectKind::Service => "Service",
            ObjectKind::Pod => "Pod",
            ObjectKind::PodSecurityPolicy => "PodSecurityPolicy",
            ObjectKind::CustomResourceDefinition => "CustomResourceDefinition",
        }
    }
}

impl FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "ServiceAccount" => ObjectKind::ServiceAccount,
            "Role" => ObjectKind::Role,
            "RoleBinding" => ObjectKind::RoleBinding,
            "ClusterRole" => ObjectKind::ClusterRole,
            "ClusterRoleBinding" => ObjectKind::ClusterRoleBinding,
            "ConfigMap" => ObjectKind::ConfigMap,
            "DaemonSet" => ObjectKind::DaemonSet,
            "Deployment" => ObjectKind::Deployment,
            "Service" => ObjectKind::Service,
            "Pod" => ObjectKind::Pod,
            "PodSecurityPolicy" => ObjectKind::PodSecurityPolicy,
            "CustomResourceDefinition" => ObjectKind::CustomResourceDefinition,
            other => return Err(format!("unsupported kind {}", other)),
        })
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds found in CNI and optional component manifests
pub const WORKLOAD_KINDS: &[ObjectKind] = &[
    ObjectKind::ServiceAccount,
    ObjectKind::Role,
    ObjectKind::RoleBinding,
    ObjectKind::ClusterRole,
    ObjectKind::ClusterRoleBinding,
    ObjectKind::ConfigMap,
    ObjectKind::DaemonSet,
    ObjectKind::Deployment,
    ObjectKind::Service,
    ObjectKind::Pod,
    ObjectKind::PodSecurityPolicy,
];

pub const CRD_KINDS: &[ObjectKind] = &[ObjectKind::CustomResourceDefinition];

pub const DEBUG_KINDS: &[ObjectKind] = &[
    ObjectKind::DaemonSet,
    ObjectKind::Deployment,
    ObjectKind::Service,
    ObjectKind::Pod,
];

/// A decoded manifest document
#[derive(Debug, Clone)]
pub enum ManifestObject {
    ServiceAccount(ServiceAccount),
    Role(Role),
    RoleBinding(RoleBinding),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    ConfigMap(ConfigMap),
    DaemonSet(DaemonSet),
    Deployment(Deployment),
    Service(Service),
    Pod(Pod),
    /// policy/v1beta1 has no typed binding, so it travels untyped
    PodSecurityPolicy(DynamicObject),
    CustomResourceDefinition(CustomResourceDefinition),
}

impl ManifestObject {
    /// Decode one document into the variant named by its `kind`
    pub fn decode(kind: ObjectKind, value: serde_yaml::Value) -> Result<Self, serde_yaml::Error> {
        Ok(match kind {
            ObjectKind::ServiceAccount => Self::ServiceAccount(serde_yaml::from_value(value)?),
            ObjectKind::Role => Self::Role(serde_yaml::from_value(value)?),
            ObjectKind::RoleBinding => Self::RoleBinding(serde_yaml::from_value(value)?),
            ObjectKind::ClusterRole => Self::ClusterRole(serde_yaml::from_value(value)?),
            ObjectKind::ClusterRoleBinding => {
                Self::ClusterRoleBinding(serde_yaml::from_value(value)?)
            }
            ObjectKind::ConfigMap => Self::ConfigMap(serde_yaml::from_value(value)?),
            ObjectKind::DaemonSet => Self::DaemonSet(serde_yaml::from_value(value)?),
            ObjectKind::Deployment => Self::Deployment(serde_yaml::from_value(value)?),
            ObjectKind::Service => Self::Service(serde_yaml::from_value(value)?),
            ObjectKind::Pod => Self::Pod(serde_yaml::from_value(value)?),
            ObjectKind::PodSecurityPolicy => {
                Self::PodSecurityPolicy(serde_yaml::from_value(value)?)
            }
            ObjectKind::CustomResourceDefinition => {
                Self::CustomResourceDefinition(serde_yaml::from_value(value)?)
            }
        })
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::ServiceAccount(_) => ObjectKind::ServiceAccount,
            Self::Role(_) => ObjectKind::Role,
            Self::RoleBinding(_) => ObjectKind::RoleBinding,
            Self::ClusterRole(_) => ObjectKind::ClusterRole,
            Self::ClusterRoleBinding(_) => ObjectKind::ClusterRoleBinding,
            Self::ConfigMap(_) => ObjectKind::ConfigMap,
            Self::DaemonSet(_) => ObjectKind::DaemonSet,
            Self::Deployment(_) => ObjectKind::Deployment,
            Self::Service(_) => ObjectKind::Service,
            Self::Pod(_) => ObjectKind::Pod,
            Self::PodSecurityPolicy(_) => ObjectKind::PodSecurityPolicy,
            Self::CustomResourceDefinition(_) => ObjectKind::CustomResourceDefinition,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::ServiceAccount(o) => o.name_any(),
            Self::Role(o) => o.name_any(),
            Self::RoleBinding(o) => o.name_any(),
            Self::ClusterRole(o) => o.name_any(),
            Self::ClusterRoleBinding(o) => o.name_any(),
            Self::ConfigMap(o) => o.name_any(),
            Self::DaemonSet(o) => o.name_any(),
            Self::Deployment(o) => o.name_any(),
            Self::Service(o) => o.name_any(),
            Self::Pod(o) => o.name_any(),
            Self::PodSecurityPolicy(o) => o.name_any(),
            Self::CustomResourceDefinition(o) => o.name_any(),
        }
    }

    /// Namespace for namespaced kinds, `default` when the manifest leaves it out
    pub fn namespace(&self) -> Option<String> {
        let ns = match self {
            Self::ServiceAccount(o) => o.namespace(),
            Self::Role(o) => o.namespace(),
            Self::RoleBinding(o) => o.namespace(),
            Self::ConfigMap(o) => o.namespace(),
            Self::DaemonSet(o) => o.namespace(),
            Self::Deployment(o) => o.namespace(),
            Self::Service(o) => o.namespace(),
            Self::Pod(o) => o.namespace(),
            Self::ClusterRole(_)
            | Self::ClusterRoleBinding(_)
            | Self::PodSecurityPolicy(_)
            | Self::CustomResourceDefinition(_) => return None,
        };
        Some(ns.unwrap_or_else(|| "default".to_string()))
    }
}

/// Result of one create call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
    /// The cluster does not serve the object's API group
    NotServed,
}

/// Where decoded objects are created
#[async_trait]
pub trait ResourceSink: Send + Sync {
    async fn create(&self, cluster: &str, object: &ManifestObject) -> ArmadaResult<CreateOutcome>;
}

/// Creates objects through the cluster's API server
#[derive(Clone)]
pub struct KubeSink {
    client: Client,
}

impl KubeSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn psp_resource() -> ApiResource {
        ApiResource::from_gvk(&GroupVersionKind::gvk("policy", "v1beta1", "PodSecurityPolicy"))
    }
}

async fn submit<K>(api: Api<K>, object: &K) -> Result<CreateOutcome, kube::Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    match api.create(&PostParams::default(), object).await {
        Ok(_) => Ok(CreateOutcome::Created),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(CreateOutcome::AlreadyExists),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ResourceSink for KubeSink {
    async fn create(&self, cluster: &str, object: &ManifestObject) -> ArmadaResult<CreateOutcome> {
        let client = self.client.clone();
        let ns = object.namespace().unwrap_or_default();
        let result = match object {
            ManifestObject::ServiceAccount(o) => submit(Api::namespaced(client, &ns), o).await,
            ManifestObject::Role(o) => submit(Api::namespaced(client, &ns), o).await,
            ManifestObject::RoleBinding(o) => submit(Api::namespaced(client, &ns), o).await,
            ManifestObject::ClusterRole(o) => submit(Api::all(client), o).await,
            ManifestObject::ClusterRoleBinding(o) => submit(Api::all(client), o).await,
            ManifestObject::ConfigMap(o) => submit(Api::namespaced(client, &ns), o).await,
            ManifestObject::DaemonSet(o) => submit(Api::namespaced(client, &ns), o).await,
            ManifestObject::Deployment(o) => submit(Api::namespaced(client, &ns), o).await,
            ManifestObject::Service(o) => submit(Api::namespaced(client, &ns), o).await,
            ManifestObject::Pod(o) => submit(Api::namespaced(client, &ns), o).await,
            ManifestObject::CustomResourceDefinition(o) => submit(Api::all(client), o).await,
            ManifestObject::PodSecurityPolicy(o) => {
                submit(Api::all_with(client, &Self::psp_resource()), o).await
            }
        };

        match result {
            Ok(outcome) => Ok(outcome),
            // policy/v1beta1 is not served from Kubernetes 1.25 onwards
            Err(kube::Error::Api(ae))
                if ae.code == 404 && object.kind() == ObjectKind::PodSecurityPolicy =>
            {
                Ok(CreateOutcome::NotServed)
            }
            Err(e) => Err(ArmadaError::Apply {
                cluster: cluster.to_string(),
                kind: object.kind().to_string(),
                name: object.name(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Counts of what one apply call did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplySummary {
    pub created: usize,
    pub existing: usize,
    pub skipped: usize,
}

/// Split a YAML stream on `---` separator lines, dropping blank documents
pub fn split_documents(manifest: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current = String::new();

    for line in manifest.lines() {
        if line.trim_end() == "---" || line.starts_with("--- ") {
            docs.push(std::mem::take(&mut current));
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    docs.push(current);

    docs.into_iter()
        .filter(|doc| {
            doc.lines()
                .map(str::trim)
                .any(|l| !l.is_empty() && !l.starts_with('#'))
        })
        .collect()
}

/// Submits manifest streams to one cluster
#[derive(Clone)]
pub struct ResourceApplier {
    cluster: String,
    sink: Arc<dyn ResourceSink>,
}

impl ResourceApplier {
    pub fn new(cluster: impl Into<String>, sink: Arc<dyn ResourceSink>) -> Self {
        Self {
            cluster: cluster.into(),
            sink,
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Create every allowed object of `manifest`; existing objects count as success
    pub async fn apply(
        &self,
        manifest: &str,
        label: &str,
        allowed: &[ObjectKind],
    ) -> ArmadaResult<ApplySummary> {
        let mut summary = ApplySummary::default();

        for doc in split_documents(manifest) {
            let decode_error = |reason: String| ArmadaError::Decode {
                cluster: self.cluster.clone(),
                label: label.to_string(),
                reason,
            };

            let value: serde_yaml::Value =
                serde_yaml::from_str(&doc).map_err(|e| decode_error(e.to_string()))?;
            if value.is_null() {
                continue;
            }

            let kind_name = value
                .get("kind")
                .and_then(serde_yaml::Value::as_str)
                .ok_or_else(|| decode_error("document has no kind".to_string()))?
                .to_string();

            let kind = match ObjectKind::from_str(&kind_name) {
                Ok(kind) if allowed.contains(&kind) => kind,
                _ => {
                    crate::log_warn!(
                        "{}: skipping unsupported {} object of kind {}",
                        self.cluster,
                        label,
                        kind_name
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            let object = ManifestObject::decode(kind, value)
                .map_err(|e| decode_error(format!("{}: {}", kind_name, e)))?;

            match self.sink.create(&self.cluster, &object).await? {
                CreateOutcome::Created => {
                    crate::log_debug!(
                        "{}: created {} {} {}",
                        self.cluster,
                        label,
                        object.kind(),
                        object.name()
                    );
                    summary.created += 1;
                }
                CreateOutcome::AlreadyExists => {
                    crate::log_info!(
                        "{}: {} {} {} already exists",
                        self.cluster,
                        label,
                        object.kind(),
                        object.name()
                    );
                    summary.existing += 1;
                }
                CreateOutcome::NotServed => {
                    crate::log_warn!(
                        "{}: {} {} {} is not served by this cluster, skipped",
                        self.cluster,
                        label,
                        object.kind(),
                        object.name()
                    );
                    summary.skipped += 1;
                }
            }
        }

        crate::log_info!(
            "✔ {} resources applied to {} ({} created, {} existing)",
            label,
            self.cluster,
            summary.created,
            summary.existing
        );
        Ok(summary)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Object store keyed by (kind, namespace, name)
    #[derive(Default)]
    pub(crate) struct MemorySink {
        pub objects: Mutex<HashSet<(String, Option<String>, String)>>,
        /// (kind, name) of every submission, in order
        pub submitted: Mutex<Vec<(String, String)>>,
        pub reject: Option<ObjectKind>,
    }

    #[async_trait]
    impl ResourceSink for MemorySink {
        async fn create(
            &self,
            cluster: &str,
            object: &ManifestObject,
        ) -> ArmadaResult<CreateOutcome> {
            if self.reject == Some(object.kind()) {
                return Err(ArmadaError::Apply {
                    cluster: cluster.to_string(),
                    kind: object.kind().to_string(),
                    name: object.name(),
                    reason: "forbidden".to_string(),
                });
            }
            self.submitted
                .lock()
                .unwrap()
                .push((object.kind().to_string(), object.name()));
            let key = (object.kind().to_string(), object.namespace(), object.name());
            let mut objects = self.objects.lock().unwrap();
            if objects.insert(key) {
                Ok(CreateOutcome::Created)
            } else {
                Ok(CreateOutcome::AlreadyExists)
            }
        }
    }

    const MANIFEST: &str = r#"
# leading comment
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: weave-net
  namespace: kube-system
---

---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: weave-net
rules: []
---
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: weave-net
  namespace: kube-system
spec:
  selector:
    matchLabels:
      name: weave-net
  template:
    metadata:
      labels:
        name: weave-net
    spec:
      containers:
        - name: weave
          image: weaveworks/weave-kube:2.6.0
---
apiVersion: batch/v1
kind: Job
metadata:
  name: not-here
"#;

    #[test]
    fn test_split_documents_drops_blank_and_comment_docs() {
        let docs = split_documents(MANIFEST);
        assert_eq!(docs.len(), 4);
        assert!(docs[0].contains("kind: ServiceAccount"));
        assert!(docs[3].contains("kind: Job"));
    }

    #[test]
    fn test_decode_namespace_defaults() {
        let value: serde_yaml::Value = serde_yaml::from_str(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\ndata:\n  a: b\n",
        )
        .unwrap();
        let object = ManifestObject::decode(ObjectKind::ConfigMap, value).unwrap();
        assert_eq!(object.kind(), ObjectKind::ConfigMap);
        assert_eq!(object.name(), "cfg");
        assert_eq!(object.namespace().as_deref(), Some("default"));
    }

    #[test]
    fn test_decode_pod_security_policy() {
        let value: serde_yaml::Value = serde_yaml::from_str(
            "apiVersion: policy/v1beta1\nkind: PodSecurityPolicy\nmetadata:\n  name: psp\nspec:\n  privileged: false\n",
        )
        .unwrap();
        let object = ManifestObject::decode(ObjectKind::PodSecurityPolicy, value).unwrap();
        assert_eq!(object.name(), "psp");
        assert_eq!(object.namespace(), None);
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let sink = Arc::new(MemorySink::default());
        let applier = ResourceApplier::new("cl1", sink.clone());

        let first = applier.apply(MANIFEST, "Weave", WORKLOAD_KINDS).await.unwrap();
        assert_eq!(
            first,
            ApplySummary {
                created: 3,
                existing: 0,
                skipped: 1
            }
        );

        let second = applier.apply(MANIFEST, "Weave", WORKLOAD_KINDS).await.unwrap();
        assert_eq!(
            second,
            ApplySummary {
                created: 0,
                existing: 3,
                skipped: 1
            }
        );
        assert_eq!(sink.objects.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_apply_honours_allow_list() {
        let sink = Arc::new(MemorySink::default());
        let applier = ResourceApplier::new("cl1", sink.clone());
        let summary = applier.apply(MANIFEST, "debug", DEBUG_KINDS).await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 3);
    }

    #[tokio::test]
    async fn test_apply_rejection_is_fatal() {
        let sink = Arc::new(MemorySink {
            reject: Some(ObjectKind::DaemonSet),
            ..MemorySink::default()
        });
        let applier = ResourceApplier::new("cl2", sink);
        let err = applier
            .apply(MANIFEST, "Weave", WORKLOAD_KINDS)
            .await
            .unwrap_err();
        assert!(matches!(err, ArmadaError::Apply { ref kind, .. } if kind == "DaemonSet"));
        assert_eq!(err.cluster(), Some("cl2"));
    }

    #[tokio::test]
    async fn test_apply_rejects_document_without_kind() {
        let applier = ResourceApplier::new("cl1", Arc::new(MemorySink::default()));
        let err = applier
            .apply("apiVersion: v1\nmetadata:\n  name: x\n", "broken", WORKLOAD_KINDS)
            .await
            .unwrap_err();
        assert!(matches!(err, ArmadaError::Decode { .. }));
    }
}
