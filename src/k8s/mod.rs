//! Kubernetes operations

pub mod apply;
pub mod client;
pub mod kind;
pub mod kubeconfig;
pub mod session;
pub mod wait;

pub use apply::{ManifestObject, ObjectKind, ResourceApplier, ResourceSink};
pub use kind::{ClusterEngine, CreateRequest, KindCli};
pub use kubeconfig::KubeconfigAdapter;
pub use session::{ClusterConnector, ClusterSession, KubeConnector};
pub use wait::{Clock, ReadinessTarget, ReadinessWaiter, StatusSource, TokioClock};
