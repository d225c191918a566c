//! Fleet provisioning: per-cluster lifecycle and fleet-wide fan-out

pub mod lifecycle;
pub mod orchestrator;
pub mod store;

pub use lifecycle::{ClusterLifecycle, FleetContext};
pub use orchestrator::{BatchReport, CreateReport, FleetOrchestrator};
pub use store::{ClusterRecord, ClusterStore};
