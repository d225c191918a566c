//! Utility modules for armada

pub mod container;
pub mod duration;
pub mod errors;
pub mod logger;
pub mod paths;
pub mod prereqs;
pub mod progress;

// Re-export commonly used items
pub use container::{ContainerInspector, DockerCli};
pub use errors::{ArmadaError, ArmadaResult};
pub use logger::{LoggingConfig, log_debug, log_error, log_info, log_warn};
pub use paths::OutputLayout;
pub use prereqs::{CommonPrereqs, Prerequisite};
