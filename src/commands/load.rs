//! `load docker-images` implementation

use anyhow::{Result, bail};

use super::{Workspace, targets};

/// Handle load docker-images command
pub async fn load_images(workspace: &Workspace, clusters: &[String], images: &[String]) -> Result<()> {
    if images.is_empty() {
        bail!("No images given, pass them with --image name[,name...]");
    }

    let orchestrator = workspace.orchestrator();
    let names = targets(&orchestrator, clusters)?;
    if names.is_empty() {
        return Ok(());
    }

    crate::log_info!(
        "Loading {} into {}...",
        images.join(", "),
        names.join(", ")
    );
    orchestrator.load_images(&names, images).await?;
    Ok(())
}
