//! `destroy clusters` implementation

use anyhow::Result;

use super::{Workspace, targets};

/// Handle destroy clusters command
///
/// Destroy is best-effort: per-cluster failures are logged and do not change
/// the exit status.
pub async fn destroy_clusters(workspace: &Workspace, clusters: &[String]) -> Result<()> {
    let orchestrator = workspace.orchestrator();
    let names = targets(&orchestrator, clusters)?;
    if names.is_empty() {
        return Ok(());
    }

    let report = orchestrator.destroy_fleet(&names).await;

    for name in &report.succeeded {
        crate::log_info!("✔ Cluster {} destroyed", name);
    }
    if !report.is_success() {
        let failed: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
        crate::log_warn!(
            "Could not destroy: {}. Check leftovers with: kind get clusters",
            failed.join(", ")
        );
    }

    Ok(())
}
