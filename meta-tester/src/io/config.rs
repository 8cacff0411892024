//! Tester configuration: tool locations, working directories and limits.
//!
//! Every field has a default matching the CI container layout, so the TOML
//! file is optional and may override any subset of fields.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::errors::ConfigurationError;

/// File name of the local repository bundle inside `repo_dir`.
pub const BUNDLE_FILE_NAME: &str = "metadata.tar.gz";

/// Tester configuration (TOML).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TesterConfig {
    /// Program (plus leading args) used to launch the .NET tools; empty runs them directly.
    pub launcher: Vec<String>,
    pub netkan_exe: PathBuf,
    pub ckan_exe: PathBuf,

    /// Linter for JSON files, the file path is appended.
    pub json_lint: Vec<String>,
    /// Linter for YAML files, the file path is appended.
    pub yaml_lint: Vec<String>,

    /// Where compiled outputs are collected before bundling.
    pub inflated_dir: PathBuf,
    /// Persistent download cache shared by the expander and every sandbox.
    pub cache_dir: PathBuf,
    /// Directory holding the local repository bundle.
    pub repo_dir: PathBuf,
    /// Root of the throwaway game instance.
    pub instance_dir: PathBuf,
    /// Host-wide registry snapshot reused across sandboxes and runs.
    pub saved_registry: PathBuf,

    /// Smallest cache limit handed to the package manager.
    pub cache_floor_mb: u64,
    /// Space kept free on the cache volume when computing the limit.
    pub cache_margin_mb: u64,

    /// Actors whose compiled files are trusted without a warning.
    pub bot_actors: Vec<String>,
    /// Environment variables naming the base commit, in priority order.
    pub base_ref_vars: Vec<String>,
    /// Base ref used when none of `base_ref_vars` is set.
    pub default_base_ref: String,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            launcher: vec!["mono".to_string()],
            netkan_exe: PathBuf::from("/usr/local/bin/netkan.exe"),
            ckan_exe: PathBuf::from("/usr/local/bin/ckan.exe"),
            json_lint: vec!["jsonlint".to_string(), "-s".to_string(), "-v".to_string()],
            yaml_lint: vec![
                "yamllint".to_string(),
                "-f".to_string(),
                "parsable".to_string(),
                "-d".to_string(),
                "relaxed".to_string(),
            ],
            inflated_dir: PathBuf::from("/ckans"),
            cache_dir: PathBuf::from(".cache"),
            repo_dir: PathBuf::from("/repo"),
            instance_dir: PathBuf::from("/game-instance"),
            saved_registry: PathBuf::from("/tmp/registry.json"),
            cache_floor_mb: 5000,
            cache_margin_mb: 1000,
            bot_actors: vec!["netkan-bot".to_string(), "github-actions[bot]".to_string()],
            base_ref_vars: vec![
                "GITHUB_PR_BASE_SHA".to_string(),
                "GITHUB_EVENT_BEFORE".to_string(),
            ],
            default_base_ref: "origin/master".to_string(),
        }
    }
}

impl TesterConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.json_lint.first().is_none_or(|p| p.trim().is_empty()) {
            return Err(ConfigurationError::Invalid(
                "json_lint must be a non-empty array".to_string(),
            ));
        }
        if self.yaml_lint.first().is_none_or(|p| p.trim().is_empty()) {
            return Err(ConfigurationError::Invalid(
                "yaml_lint must be a non-empty array".to_string(),
            ));
        }
        if self.default_base_ref.trim().is_empty() {
            return Err(ConfigurationError::Invalid(
                "default_base_ref must not be empty".to_string(),
            ));
        }
        if self.cache_floor_mb == 0 {
            return Err(ConfigurationError::Invalid(
                "cache_floor_mb must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the local repository bundle.
    pub fn bundle_path(&self) -> PathBuf {
        self.repo_dir.join(BUNDLE_FILE_NAME)
    }

    pub fn is_bot(&self, actor: Option<&str>) -> bool {
        actor.is_some_and(|actor| self.bot_actors.iter().any(|bot| bot == actor))
    }
}

/// Load config from a TOML file, or defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<TesterConfig> {
    let Some(path) = path else {
        let cfg = TesterConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    };
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TesterConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
