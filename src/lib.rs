//! armada: disposable multi-cluster kind environments for cross-cluster
//! networking tests

pub mod commands;
pub mod config;
pub mod fleet;
pub mod install;
pub mod k8s;
pub mod utils;
