//! `create clusters` implementation

use anyhow::Result;
use std::time::Duration;

use super::Workspace;
use crate::config::{CniKind, CreateFlags};
use crate::fleet::CreateReport;

/// Options for creating a fleet
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub num_clusters: Option<u32>,
    pub image: Option<String>,
    pub cni: CniKind,
    pub tiller: bool,
    pub overlap: bool,
    pub retain: bool,
    pub wait: Option<Duration>,
}

impl CreateOptions {
    /// Fill unset options from the settings file
    pub fn into_flags(self, workspace: &Workspace) -> CreateFlags {
        let defaults = &workspace.settings;
        CreateFlags {
            image: self.image.unwrap_or_default(),
            cni: self.cni,
            retain: self.retain,
            tiller: self.tiller,
            overlap: self.overlap,
            wait: self
                .wait
                .unwrap_or_else(|| defaults.timeouts.control_plane_wait()),
            num_clusters: self.num_clusters.unwrap_or(defaults.defaults.num_clusters),
        }
    }
}

/// Handle create clusters command
pub async fn create_clusters(workspace: &Workspace, options: CreateOptions) -> Result<()> {
    let flags = options.into_flags(workspace);
    let orchestrator = workspace.orchestrator();

    let report = orchestrator.create_fleet(&flags).await?;
    for line in summary_lines(&report) {
        crate::log_info!("{}", line);
    }

    Ok(())
}

/// Closing banner, including the only `export KUBECONFIG=` hint of the run
fn summary_lines(report: &CreateReport) -> Vec<String> {
    let rule = "=".repeat(42);
    let headline = if report.created.is_empty() {
        "All requested clusters already exist".to_string()
    } else {
        format!("Created {} cluster(s) successfully!", report.created.len())
    };

    let mut lines = vec![String::new(), rule.clone(), headline, rule, String::new()];
    if let Some(hint) = report.export_hint() {
        lines.push("To use the clusters, run:".to_string());
        lines.push(format!("  {}", hint));
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::utils::{LoggingConfig, OutputLayout};

    fn workspace() -> Workspace {
        let mut settings = Settings::default();
        settings.defaults.num_clusters = 3;
        settings.timeouts.control_plane_wait_secs = 120;
        Workspace {
            settings,
            logging: LoggingConfig::default(),
            layout: OutputLayout::new("/work/output", "/home/me/.kube"),
        }
    }

    #[test]
    fn test_unset_options_come_from_settings() {
        let options = CreateOptions {
            num_clusters: None,
            image: None,
            cni: CniKind::Calico,
            tiller: false,
            overlap: true,
            retain: true,
            wait: None,
        };
        let flags = options.into_flags(&workspace());
        assert_eq!(flags.num_clusters, 3);
        assert_eq!(flags.wait, Duration::from_secs(120));
        assert_eq!(flags.image, "");
        assert_eq!(flags.cni, CniKind::Calico);
        assert!(flags.overlap);
    }

    #[test]
    fn test_explicit_options_win() {
        let options = CreateOptions {
            num_clusters: Some(1),
            image: Some("kindest/node:v1.16.3".to_string()),
            cni: CniKind::Default,
            tiller: true,
            overlap: false,
            retain: false,
            wait: Some(Duration::from_secs(30)),
        };
        let flags = options.into_flags(&workspace());
        assert_eq!(flags.num_clusters, 1);
        assert_eq!(flags.wait, Duration::from_secs(30));
        assert_eq!(flags.image, "kindest/node:v1.16.3");
        assert!(flags.tiller);
        assert!(!flags.retain);
    }

    #[test]
    fn test_summary_carries_the_export_hint_once() {
        let report = CreateReport {
            created: vec!["cl1".to_string(), "cl2".to_string()],
            skipped: Vec::new(),
            kubeconfigs: vec!["/k/cl1".into(), "/k/cl2".into()],
        };
        let lines = summary_lines(&report);
        assert!(lines.contains(&"Created 2 cluster(s) successfully!".to_string()));
        let hints: Vec<&String> = lines.iter().filter(|l| l.contains("export KUBECONFIG=")).collect();
        assert_eq!(hints, vec!["  export KUBECONFIG=/k/cl1:/k/cl2"]);
    }

    #[test]
    fn test_summary_without_clusters_has_no_hint() {
        let lines = summary_lines(&CreateReport::default());
        assert!(lines.contains(&"All requested clusters already exist".to_string()));
        assert!(!lines.iter().any(|l| l.contains("KUBECONFIG")));
    }
}
