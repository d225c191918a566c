//! Readiness polling for workloads on a cluster
//!
//! A wait polls immediately, then once per interval until the workload is
//! ready or the deadline passes. Time is injected through [`Clock`], so the
//! ready and timeout paths are testable without real sleeps.

use crate::utils::errors::{ArmadaError, ArmadaResult};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of time for poll loops
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
    /// Running pods matching a label selector
    Pods,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredReplicas {
    Exact(usize),
    /// One per node in the cluster
    NodeCount,
}

/// What to wait for, and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessTarget {
    pub cluster: String,
    pub namespace: String,
    pub kind: WorkloadKind,
    pub name: String,
    pub selector: Option<String>,
    pub desired: Option<DesiredReplicas>,
}

impl ReadinessTarget {
    pub fn deployment(cluster: &str, namespace: &str, name: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            namespace: namespace.to_string(),
            kind: WorkloadKind::Deployment,
            name: name.to_string(),
            selector: None,
            desired: None,
        }
    }

    pub fn daemonset(cluster: &str, namespace: &str, name: &str) -> Self {
        Self {
            kind: WorkloadKind::DaemonSet,
            ..Self::deployment(cluster, namespace, name)
        }
    }

    pub fn pods(cluster: &str, namespace: &str, selector: &str, desired: DesiredReplicas) -> Self {
        Self {
            cluster: cluster.to_string(),
            namespace: namespace.to_string(),
            kind: WorkloadKind::Pods,
            name: selector.to_string(),
            selector: Some(selector.to_string()),
            desired: Some(desired),
        }
    }
}

impl fmt::Display for ReadinessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WorkloadKind::Deployment => write!(f, "deployment {}/{}", self.namespace, self.name),
            WorkloadKind::DaemonSet => write!(f, "daemonset {}/{}", self.namespace, self.name),
            WorkloadKind::Pods => write!(f, "pods {}/{{{}}}", self.namespace, self.name),
        }
    }
}

/// One observation of a workload's rollout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadStatus {
    Deployment {
        desired: i32,
        ready: i32,
    },
    DaemonSet {
        desired: i32,
        current_scheduled: i32,
        ready: i32,
    },
    Pods {
        desired: usize,
        running: usize,
    },
}

impl WorkloadStatus {
    pub fn is_ready(&self) -> bool {
        match *self {
            WorkloadStatus::Deployment { desired, ready } => ready == desired,
            // numberReady == desired is trivially true before any pod is scheduled
            WorkloadStatus::DaemonSet {
                desired,
                current_scheduled,
                ready,
            } => current_scheduled > 0 && ready == desired,
            WorkloadStatus::Pods { desired, running } => running == desired,
        }
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadStatus::Deployment { desired, ready } => {
                write!(f, "ready replicas: {}/{}", ready, desired)
            }
            WorkloadStatus::DaemonSet {
                desired,
                current_scheduled,
                ready,
            } => write!(
                f,
                "ready: {}/{}, scheduled: {}",
                ready, desired, current_scheduled
            ),
            WorkloadStatus::Pods { desired, running } => {
                write!(f, "running pods: {}/{}", running, desired)
            }
        }
    }
}

/// Where workload observations come from
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn observe(&self, target: &ReadinessTarget) -> ArmadaResult<WorkloadStatus>;
}

/// Reads workload status from the cluster's API server
#[derive(Clone)]
pub struct KubeStatusSource {
    client: Client,
}

impl KubeStatusSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn client_error(target: &ReadinessTarget, e: kube::Error) -> ArmadaError {
        ArmadaError::Client {
            cluster: target.cluster.clone(),
            reason: format!("{}: {}", target, e),
        }
    }
}

#[async_trait]
impl StatusSource for KubeStatusSource {
    async fn observe(&self, target: &ReadinessTarget) -> ArmadaResult<WorkloadStatus> {
        let client = self.client.clone();
        match target.kind {
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(client, &target.namespace);
                let deployment = api
                    .get(&target.name)
                    .await
                    .map_err(|e| Self::client_error(target, e))?;
                let desired = deployment
                    .spec
                    .as_ref()
                    .and_then(|s| s.replicas)
                    .unwrap_or(1);
                let ready = deployment
                    .status
                    .as_ref()
                    .and_then(|s| s.ready_replicas)
                    .unwrap_or(0);
                Ok(WorkloadStatus::Deployment { desired, ready })
            }
            WorkloadKind::DaemonSet => {
                let api: Api<DaemonSet> = Api::namespaced(client, &target.namespace);
                let daemonset = api
                    .get(&target.name)
                    .await
                    .map_err(|e| Self::client_error(target, e))?;
                let status = daemonset.status.unwrap_or_default();
                Ok(WorkloadStatus::DaemonSet {
                    desired: status.desired_number_scheduled,
                    current_scheduled: status.current_number_scheduled,
                    ready: status.number_ready,
                })
            }
            WorkloadKind::Pods => {
                let desired = match target.desired.unwrap_or(DesiredReplicas::NodeCount) {
                    DesiredReplicas::Exact(n) => n,
                    DesiredReplicas::NodeCount => {
                        let nodes: Api<Node> = Api::all(client.clone());
                        nodes
                            .list(&ListParams::default())
                            .await
                            .map_err(|e| Self::client_error(target, e))?
                            .items
                            .len()
                    }
                };

                let mut params = ListParams::default().fields("status.phase=Running");
                if let Some(selector) = &target.selector {
                    params = params.labels(selector);
                }
                let pods: Api<Pod> = Api::namespaced(client, &target.namespace);
                let running = pods
                    .list(&params)
                    .await
                    .map_err(|e| Self::client_error(target, e))?
                    .items
                    .len();
                Ok(WorkloadStatus::Pods { desired, running })
            }
        }
    }
}

/// Deadline and poll cadence for readiness waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub workload_interval: Duration,
    pub pod_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            workload_interval: Duration::from_secs(10),
            pod_interval: Duration::from_secs(30),
        }
    }
}

impl PollSettings {
    pub fn interval_for(&self, kind: WorkloadKind) -> Duration {
        match kind {
            WorkloadKind::Deployment | WorkloadKind::DaemonSet => self.workload_interval,
            WorkloadKind::Pods => self.pod_interval,
        }
    }
}

#[derive(Clone)]
pub struct ReadinessWaiter {
    clock: Arc<dyn Clock>,
    settings: PollSettings,
}

impl ReadinessWaiter {
    pub fn new(clock: Arc<dyn Clock>, settings: PollSettings) -> Self {
        Self { clock, settings }
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Poll `source` until `target` is ready or the deadline passes
    pub async fn wait(&self, source: &dyn StatusSource, target: &ReadinessTarget) -> ArmadaResult<()> {
        let timeout = self.settings.timeout;
        let interval = self.settings.interval_for(target.kind);
        let started = self.clock.now();
        let deadline = started + timeout;

        crate::log_info!(
            "Waiting up to {:?} for {} on {}...",
            timeout,
            target,
            target.cluster
        );

        loop {
            match source.observe(target).await {
                Ok(status) if status.is_ready() => {
                    crate::log_info!("✔ {} is ready on {}, {}", target, target.cluster, status);
                    return Ok(());
                }
                Ok(status) => {
                    crate::log_debug!("Still waiting for {} on {}, {}", target, target.cluster, status);
                }
                Err(e) => {
                    crate::log_debug!("Still waiting for {} on {}: {}", target, target.cluster, e);
                }
            }

            let now = self.clock.now();
            if now >= deadline {
                break;
            }
            self.clock.sleep(interval.min(deadline - now)).await;
            if self.clock.now() >= deadline {
                break;
            }
        }

        Err(ArmadaError::ReadinessTimeout {
            cluster: target.cluster.clone(),
            target: target.to_string(),
            waited: self.clock.now().saturating_duration_since(started),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Clock whose sleeps advance time instantly
    pub(crate) struct ManualClock {
        start: Instant,
        elapsed: Mutex<Duration>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self {
                start: Instant::now(),
                elapsed: Mutex::new(Duration::ZERO),
            }
        }

        pub(crate) fn elapsed(&self) -> Duration {
            *self.elapsed.lock().unwrap()
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + self.elapsed()
        }

        async fn sleep(&self, duration: Duration) {
            *self.elapsed.lock().unwrap() += duration;
        }
    }

    /// DaemonSet that becomes ready on the given poll
    struct ScriptedSource {
        ready_on: Option<usize>,
        polls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(ready_on: Option<usize>) -> Self {
            Self {
                ready_on,
                polls: AtomicUsize::new(0),
            }
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn observe(&self, target: &ReadinessTarget) -> ArmadaResult<WorkloadStatus> {
            let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if poll == 1 {
                return Err(ArmadaError::Client {
                    cluster: target.cluster.clone(),
                    reason: "daemonsets.apps \"weave-net\" not found".to_string(),
                });
            }
            let ready = match self.ready_on {
                Some(n) if poll >= n => 3,
                _ => 1,
            };
            Ok(WorkloadStatus::DaemonSet {
                desired: 3,
                current_scheduled: 3,
                ready,
            })
        }
    }

    fn settings(timeout_secs: u64) -> PollSettings {
        PollSettings {
            timeout: Duration::from_secs(timeout_secs),
            ..PollSettings::default()
        }
    }

    fn target() -> ReadinessTarget {
        ReadinessTarget::daemonset("cl1", "kube-system", "weave-net")
    }

    #[tokio::test]
    async fn test_ready_before_deadline() {
        let clock = Arc::new(ManualClock::new());
        let waiter = ReadinessWaiter::new(clock.clone(), settings(300));
        let source = ScriptedSource::new(Some(4));

        waiter.wait(&source, &target()).await.unwrap();

        assert_eq!(source.polls(), 4);
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_ready_on_first_successful_poll_does_not_sleep() {
        let clock = Arc::new(ManualClock::new());
        let waiter = ReadinessWaiter::new(clock.clone(), settings(300));
        let source = ScriptedSource::new(Some(2));

        waiter.wait(&source, &target()).await.unwrap();
        assert_eq!(source.polls(), 2);
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_timeout_stops_polling() {
        let clock = Arc::new(ManualClock::new());
        let waiter = ReadinessWaiter::new(clock.clone(), settings(300));
        let source = ScriptedSource::new(None);

        let err = waiter.wait(&source, &target()).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("daemonset kube-system/weave-net"));
        // polls at t = 0, 10, ..., 290
        assert_eq!(source.polls(), 30);
        assert_eq!(clock.elapsed(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_last_sleep_is_truncated_to_deadline() {
        let clock = Arc::new(ManualClock::new());
        let waiter = ReadinessWaiter::new(clock.clone(), settings(25));
        let source = ScriptedSource::new(None);

        let err = waiter.wait(&source, &target()).await.unwrap_err();
        assert!(matches!(err, ArmadaError::ReadinessTimeout { waited, .. } if waited == Duration::from_secs(25)));
        assert_eq!(source.polls(), 3);
    }

    #[tokio::test]
    async fn test_zero_timeout_polls_once() {
        let clock = Arc::new(ManualClock::new());
        let waiter = ReadinessWaiter::new(clock.clone(), settings(0));
        let source = ScriptedSource::new(None);

        assert!(waiter.wait(&source, &target()).await.is_err());
        assert_eq!(source.polls(), 1);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_daemonset_not_ready_before_scheduling() {
        let unscheduled = WorkloadStatus::DaemonSet {
            desired: 0,
            current_scheduled: 0,
            ready: 0,
        };
        assert!(!unscheduled.is_ready());

        let partial = WorkloadStatus::DaemonSet {
            desired: 3,
            current_scheduled: 3,
            ready: 2,
        };
        assert!(!partial.is_ready());

        let rolled_out = WorkloadStatus::DaemonSet {
            desired: 3,
            current_scheduled: 3,
            ready: 3,
        };
        assert!(rolled_out.is_ready());
    }

    #[test]
    fn test_deployment_and_pod_predicates() {
        assert!(WorkloadStatus::Deployment { desired: 2, ready: 2 }.is_ready());
        assert!(!WorkloadStatus::Deployment { desired: 2, ready: 1 }.is_ready());
        assert!(WorkloadStatus::Pods { desired: 3, running: 3 }.is_ready());
        assert!(!WorkloadStatus::Pods { desired: 3, running: 4 }.is_ready());
    }

    #[test]
    fn test_pod_targets_use_pod_interval() {
        let settings = PollSettings::default();
        let pods = ReadinessTarget::pods("cl1", "default", "app=netshoot", DesiredReplicas::NodeCount);
        assert_eq!(settings.interval_for(pods.kind), Duration::from_secs(30));
        assert_eq!(
            settings.interval_for(WorkloadKind::Deployment),
            Duration::from_secs(10)
        );
        assert_eq!(pods.to_string(), "pods default/{app=netshoot}");
    }
}
