//! Progress indicators for long-running fleet operations

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// One spinner line per cluster, stacked in a shared container
pub struct FleetProgress {
    multi: Option<MultiProgress>,
}

impl FleetProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi: enabled.then(MultiProgress::new),
        }
    }

    /// Progress line for a cluster; hidden when progress output is disabled
    pub fn cluster(&self, operation: &str, cluster_name: &str) -> ClusterProgress {
        let message = format!("{} cluster '{}'", operation, cluster_name);
        let pb = match &self.multi {
            Some(multi) => multi.add(create_spinner(&message)),
            None => ProgressBar::hidden(),
        };
        ClusterProgress { pb }
    }
}

/// Progress wrapper for cluster operations
#[derive(Clone)]
pub struct ClusterProgress {
    pb: ProgressBar,
}

impl ClusterProgress {
    pub fn set_step(&self, step: &str) {
        self.pb.set_message(step.to_string());
    }

    pub fn finish_success(&self, message: &str) {
        self.pb.finish_with_message(format!("✓ {}", message));
    }

    pub fn finish_error(&self, message: &str) {
        self.pb.finish_with_message(format!("✗ {}", message));
    }
}
