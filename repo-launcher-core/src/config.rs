use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Everything the launch pipeline needs to know about the managed repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    pub repo_url: String,
    pub repo_dir: PathBuf,
    pub startup_script: String,
    /// Interpreter used to drive `python -m pip`.
    pub python: PathBuf,
    /// Holds the `installing` marker and intercepted downloads.
    pub work_dir: PathBuf,
    pub requirements_file: String,
    pub artifact: ArtifactConfig,
    /// Packages the environment must have before anything else runs.
    pub prerequisites: Vec<String>,
}

/// The distinguished large artifact whose download gets intercepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Package name as pip prints it after "Collecting".
    pub name: String,
    /// Requirements file, relative to the repo, that pulls in the artifact.
    pub requirements_file: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            name: "torch".to_string(),
            requirements_file: "requirements-torch.txt".to_string(),
        }
    }
}

impl LauncherConfig {
    pub fn new(repo_url: impl Into<String>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_url: repo_url.into(),
            repo_dir: repo_dir.into(),
            startup_script: "main.py".to_string(),
            python: PathBuf::from("python"),
            work_dir: PathBuf::from("."),
            requirements_file: "requirements.txt".to_string(),
            artifact: ArtifactConfig::default(),
            prerequisites: Vec::new(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            repo_url = %self.repo_url,
            repo_dir = %self.repo_dir.display(),
            python = %self.python.display(),
            artifact = %self.artifact.name,
            "Loaded LauncherConfig"
        );
        debug!(?self, "LauncherConfig loaded (full debug)");
    }
}
