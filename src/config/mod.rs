//! Configuration: user settings and per-cluster planning

pub mod planner;
pub mod settings;

pub use planner::{ClusterSpec, CniKind, CreateFlags, KubeVersionProfile, Planner};
pub use settings::Settings;
