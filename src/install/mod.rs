//! Installation of manifests onto provisioned clusters

pub mod cni;
pub mod debug;
pub mod templates;
pub mod tiller;

pub use templates::{DebugWorkload, ManifestRenderer};
