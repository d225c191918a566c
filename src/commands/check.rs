//! `check` implementation

use anyhow::{Result, bail};
use colored::Colorize;

use crate::utils::{CommonPrereqs, Prerequisite};

/// Report the external tools armada needs
pub fn check_prerequisites() -> Result<()> {
    crate::log_info!("Checking prerequisites...");

    let kind = CommonPrereqs::kind();
    let docker = CommonPrereqs::docker();
    let kubectl = CommonPrereqs::kubectl();
    let prereqs: Vec<&dyn Prerequisite> = vec![&kind, &docker, &kubectl];

    let (found, missing) = CommonPrereqs::check_all(&prereqs);

    for name in &found {
        println!("  {} {}", "✓".green(), name);
    }
    for (name, hint) in &missing {
        println!("  {} {} ({})", "✗".red(), name, hint);
    }

    if !missing.is_empty() {
        bail!("{} required tool(s) missing", missing.len());
    }

    crate::log_info!("✓ All prerequisites satisfied!");
    Ok(())
}
