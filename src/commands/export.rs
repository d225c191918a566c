//! `export logs` implementation

use anyhow::Result;

use super::{Workspace, targets};

/// Handle export logs command
pub async fn export_logs(workspace: &Workspace, clusters: &[String]) -> Result<()> {
    let orchestrator = workspace.orchestrator();
    let names = targets(&orchestrator, clusters)?;
    if names.is_empty() {
        return Ok(());
    }

    orchestrator.export_logs(&names).await?;
    crate::log_info!("Logs exported to {}", workspace.layout.logs_root().display());
    Ok(())
}
