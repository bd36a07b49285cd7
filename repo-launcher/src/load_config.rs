/// `load_config` module: Loads a static YAML config and adapts it into the core [`LauncherConfig`].
///
/// This module is the only place where user-supplied YAML is parsed.
///
/// # Responsibilities
/// - Parse the YAML file into [`CliConfig`], filling defaults for optional keys
/// - Resolve relative paths against the directory that holds the config file
/// - Map the result onto [`LauncherConfig`], applying a `--python` override
///
/// # Errors
/// All errors use `anyhow::Error` with the config path in context and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use repo_launcher_core::config::{ArtifactConfig, LauncherConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    pub repo_url: String,
    pub repo_dir: PathBuf,
    #[serde(default = "default_startup_script")]
    pub startup_script: String,
    #[serde(default = "default_python")]
    pub python: PathBuf,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default)]
    pub artifact: ArtifactSection,
    #[serde(default = "default_requirements_file")]
    pub requirements_file: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Virtual environment created by `supervise`.
    #[serde(default = "default_venv_folder")]
    pub venv_folder: PathBuf,
    #[serde(default)]
    pub use_pythonw: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactSection {
    pub name: Option<String>,
    pub requirements_file: Option<String>,
}

fn default_startup_script() -> String {
    "main.py".to_string()
}

fn default_python() -> PathBuf {
    PathBuf::from("python")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_requirements_file() -> String {
    "requirements.txt".to_string()
}

fn default_venv_folder() -> PathBuf {
    PathBuf::from("venv")
}

impl CliConfig {
    /// Core configuration; `python` replaces the configured interpreter when given.
    pub fn launcher_config(&self, python: Option<&Path>) -> LauncherConfig {
        let defaults = ArtifactConfig::default();
        let mut config = LauncherConfig::new(self.repo_url.clone(), self.repo_dir.clone());
        config.startup_script = self.startup_script.clone();
        config.python = python.map(Path::to_path_buf).unwrap_or_else(|| self.python.clone());
        config.work_dir = self.work_dir.clone();
        config.requirements_file = self.requirements_file.clone();
        config.artifact = ArtifactConfig {
            name: self.artifact.name.clone().unwrap_or(defaults.name),
            requirements_file: self
                .artifact
                .requirements_file
                .clone()
                .unwrap_or(defaults.requirements_file),
        };
        config.prerequisites = self.prerequisites.clone();
        config
    }

    fn resolve_paths(&mut self, base: &Path) {
        self.repo_dir = resolve(base, &self.repo_dir);
        self.work_dir = resolve(base, &self.work_dir);
        self.venv_folder = resolve(base, &self.venv_folder);
        // A bare interpreter name is looked up on PATH.
        if self.python.components().count() > 1 {
            self.python = resolve(base, &self.python);
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Loads a static YAML config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref)
        .inspect_err(|e| error!(error = ?e, config_path = ?path_ref, "Failed to read config file"))
        .with_context(|| format!("Failed to read config file {}", path_ref.display()))?;

    let mut config: CliConfig = serde_yaml::from_str(&config_content)
        .inspect_err(|e| error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML"))
        .with_context(|| format!("Failed to parse config YAML {}", path_ref.display()))?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");

    let base = path_ref
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base);
    Ok(config)
}
