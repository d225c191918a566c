//! Per-cluster API handles

use crate::k8s::apply::{KubeSink, ObjectKind, ResourceApplier};
use crate::k8s::client::create_client;
use crate::k8s::wait::{KubeStatusSource, ReadinessTarget, ReadinessWaiter, StatusSource};
use crate::utils::errors::ArmadaResult;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Everything needed to apply manifests to one cluster and wait on them
#[derive(Clone)]
pub struct ClusterSession {
    applier: ResourceApplier,
    status: Arc<dyn StatusSource>,
    waiter: ReadinessWaiter,
}

impl ClusterSession {
    pub fn new(applier: ResourceApplier, status: Arc<dyn StatusSource>, waiter: ReadinessWaiter) -> Self {
        Self {
            applier,
            status,
            waiter,
        }
    }

    pub fn cluster(&self) -> &str {
        self.applier.cluster()
    }

    pub async fn apply(&self, manifest: &str, label: &str, allowed: &[ObjectKind]) -> ArmadaResult<()> {
        self.applier.apply(manifest, label, allowed).await.map(|_| ())
    }

    pub async fn wait_for(&self, target: &ReadinessTarget) -> ArmadaResult<()> {
        self.waiter.wait(self.status.as_ref(), target).await
    }

    pub async fn wait_for_daemonset(&self, namespace: &str, name: &str) -> ArmadaResult<()> {
        self.wait_for(&ReadinessTarget::daemonset(self.cluster(), namespace, name))
            .await
    }

    pub async fn wait_for_deployment(&self, namespace: &str, name: &str) -> ArmadaResult<()> {
        self.wait_for(&ReadinessTarget::deployment(self.cluster(), namespace, name))
            .await
    }
}

/// Opens sessions against clusters
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, cluster_name: &str, kubeconfig: &Path) -> ArmadaResult<ClusterSession>;
}

/// Connects through the Kubernetes API using a kubeconfig file
#[derive(Clone)]
pub struct KubeConnector {
    waiter: ReadinessWaiter,
}

impl KubeConnector {
    pub fn new(waiter: ReadinessWaiter) -> Self {
        Self { waiter }
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, cluster_name: &str, kubeconfig: &Path) -> ArmadaResult<ClusterSession> {
        let client = create_client(cluster_name, kubeconfig).await?;
        let applier = ResourceApplier::new(cluster_name, Arc::new(KubeSink::new(client.clone())));
        Ok(ClusterSession::new(
            applier,
            Arc::new(KubeStatusSource::new(client)),
            self.waiter.clone(),
        ))
    }
}
