//! Deploy configuration
//!
//! One JSON file per deploy target, by default at
//! `config/deploy/<target>.json`. A missing file means every setting takes
//! its default; a partial file only overrides the fields it names.

use anyhow::{Context, Result};
use revdeploy_core::{BackendConfig, StoreConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_project_name() -> String {
    std::env::current_dir()
        .ok()
        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "app".to_string())
}

/// Settings for publishing one deploy target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Used to derive the default key prefix
    pub project_name: String,
    /// Overrides `<project_name>:index`
    pub key_prefix: Option<String>,
    /// Build output directory
    pub dist_dir: PathBuf,
    /// File inside `dist_dir` that gets published
    pub file_pattern: String,
    /// Revision tag used when none is given on the command line
    pub revision_key: Option<String>,
    #[serde(flatten)]
    pub store: StoreConfig,
    pub backend: BackendConfig,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            key_prefix: None,
            dist_dir: PathBuf::from("dist"),
            file_pattern: "index.html".to_string(),
            revision_key: None,
            store: StoreConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl DeployConfig {
    /// Conventional config location for `target`
    pub fn path_for_target(target: &str) -> PathBuf {
        Path::new("config").join("deploy").join(format!("{}.json", target))
    }

    /// Load config from `path`, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No deploy config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read deploy config from {:?}", path))?;
        let config: DeployConfig = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse deploy config {:?}", path))?;
        config.store.validate()?;
        Ok(config)
    }

    /// Key prefix all revisions of this target live under
    pub fn key_prefix(&self) -> String {
        self.key_prefix
            .clone()
            .unwrap_or_else(|| format!("{}:index", self.project_name))
    }

    /// Path of the artifact to publish
    pub fn file_path(&self) -> PathBuf {
        self.dist_dir.join(&self.file_pattern)
    }
}
