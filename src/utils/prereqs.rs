//! Prerequisite checking system for required tools

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrereqError {
    #[error("Tool '{name}' not found")]
    NotFound { name: String, hint: String },
}

/// Trait for checking prerequisites
pub trait Prerequisite {
    /// Name of the prerequisite tool
    fn name(&self) -> &str;

    /// Check if the tool is available
    fn check(&self) -> Result<(), PrereqError>;
}

/// Basic prerequisite that checks if a command exists
pub struct CommandPrereq {
    pub name: String,
    pub hint: String,
}

impl CommandPrereq {
    pub fn new(name: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hint: hint.into(),
        }
    }
}

impl Prerequisite for CommandPrereq {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<(), PrereqError> {
        which::which(&self.name).map_err(|_| PrereqError::NotFound {
            name: self.name.clone(),
            hint: self.hint.clone(),
        })?;
        Ok(())
    }
}

/// Tools armada shells out to
pub struct CommonPrereqs;

impl CommonPrereqs {
    pub fn kind() -> CommandPrereq {
        CommandPrereq::new(
            "kind",
            "Install from: https://kind.sigs.k8s.io/docs/user/quick-start/#installation",
        )
    }

    pub fn docker() -> CommandPrereq {
        CommandPrereq::new("docker", "Install from: https://docs.docker.com/get-docker/")
    }

    pub fn kubectl() -> CommandPrereq {
        CommandPrereq::new(
            "kubectl",
            "Install from: https://kubernetes.io/docs/tasks/tools/",
        )
    }

    /// Returns (found_tools, missing_tools)
    pub fn check_all(prereqs: &[&dyn Prerequisite]) -> (Vec<String>, Vec<(String, String)>) {
        let mut found = Vec::new();
        let mut missing = Vec::new();

        for prereq in prereqs {
            match prereq.check() {
                Ok(()) => found.push(prereq.name().to_string()),
                Err(PrereqError::NotFound { name, hint }) => missing.push((name, hint)),
            }
        }

        (found, missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prereq_trait() {
        let prereq = CommandPrereq::new("sh", "Should always exist");
        assert_eq!(prereq.name(), "sh");
        assert!(prereq.check().is_ok());
    }

    #[test]
    fn test_check_all_splits_found_and_missing() {
        let present = CommandPrereq::new("sh", "n/a");
        let absent = CommandPrereq::new("nonexistent-tool-xyz", "Test hint");
        let (found, missing) = CommonPrereqs::check_all(&[&present, &absent]);
        assert_eq!(found, vec!["sh".to_string()]);
        assert_eq!(
            missing,
            vec![("nonexistent-tool-xyz".to_string(), "Test hint".to_string())]
        );
    }
}
