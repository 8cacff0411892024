//! Throwaway package-manager instances for install checks.
//!
//! [`DummyInstance::create`] creates the instance directory and provisions it;
//! dropping the guard forgets the instance and deletes the directory, on every
//! exit path. Provisioning steps are independent best-effort calls: a failing
//! step is logged and the remaining steps still run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::core::errors::InstanceRootExists;
use crate::core::game::Game;
use crate::core::version::GameVersion;
use crate::io::config::TesterConfig;
use crate::io::tools::{ToolCommand, ToolRunner, Toolchain};

/// Name the instance is registered under in the package manager.
pub const INSTANCE_NAME: &str = "dummy";

const MB: u64 = 1024 * 1024;

/// Everything about a sandbox that does not change between install checks.
#[derive(Debug, Clone)]
pub struct SandboxSettings {
    pub root: PathBuf,
    pub game: Game,
    pub cache_dir: PathBuf,
    pub bundle: PathBuf,
    pub saved_registry: PathBuf,
    pub stability: Option<String>,
    pub cache_floor_mb: u64,
    pub cache_margin_mb: u64,
}

impl SandboxSettings {
    pub fn from_config(config: &TesterConfig, game: Game, stability: Option<&str>) -> Self {
        Self {
            root: config.instance_dir.clone(),
            game,
            cache_dir: config.cache_dir.clone(),
            bundle: config.bundle_path(),
            saved_registry: config.saved_registry.clone(),
            // "stable" is the package manager's own default
            stability: stability
                .map(str::trim)
                .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("stable"))
                .map(str::to_string),
            cache_floor_mb: config.cache_floor_mb,
            cache_margin_mb: config.cache_margin_mb,
        }
    }

    fn registry_path(&self) -> PathBuf {
        self.root.join("CKAN").join("registry.json")
    }
}

/// A provisioned fake game instance, torn down on drop.
pub struct DummyInstance<'a, R: ToolRunner> {
    runner: &'a R,
    tools: &'a Toolchain,
    root: PathBuf,
}

impl<'a, R: ToolRunner> DummyInstance<'a, R> {
    /// Create and provision an instance pinned to `primary`, with
    /// `additional` versions marked compatible.
    ///
    /// Fails only if the root directory cannot be created (it must not exist).
    #[instrument(skip_all, fields(root = %settings.root.display(), primary = %primary))]
    pub fn create(
        runner: &'a R,
        tools: &'a Toolchain,
        settings: &SandboxSettings,
        primary: &GameVersion,
        additional: &[GameVersion],
    ) -> Result<Self> {
        info!("creating dummy game instance");
        if let Err(err) = fs::create_dir(&settings.root) {
            if err.kind() == std::io::ErrorKind::AlreadyExists {
                return Err(InstanceRootExists {
                    root: settings.root.clone(),
                }
                .into());
            }
            return Err(err).with_context(|| format!("create instance dir {}", settings.root.display()));
        }
        let instance = Self {
            runner,
            tools,
            root: settings.root.clone(),
        };
        instance.provision(settings, primary, additional);
        debug!("dummy instance is ready");
        Ok(instance)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn provision(&self, settings: &SandboxSettings, primary: &GameVersion, additional: &[GameVersion]) {
        let mut fake = vec![
            "instance".to_string(),
            "fake".to_string(),
            "--game".to_string(),
            settings.game.short_name().to_string(),
            "--set-default".to_string(),
            "--headless".to_string(),
            INSTANCE_NAME.to_string(),
            self.root.to_string_lossy().into_owned(),
            primary.to_string(),
        ];
        for (flag, value) in settings.game.dlc_flags(primary) {
            fake.push(flag);
            fake.push(value);
        }
        self.ckan("populate fake instance", fake);

        for version in additional {
            debug!(version = %version, "setting version compatible");
            self.ckan(
                "mark version compatible",
                ["compat".to_string(), "add".to_string(), version.to_string()],
            );
        }

        let cache = absolute(&settings.cache_dir);
        if let Err(err) = link_cache(&self.root, &cache) {
            warn!(err = %format!("{err:#}"), "failed to link download cache");
        }
        debug!(cache = %cache.display(), "setting cache location");
        self.ckan(
            "set cache location",
            [
                "cache".to_string(),
                "set".to_string(),
                cache.to_string_lossy().into_owned(),
                "--headless".to_string(),
            ],
        );

        let limit = match cache_limit_for(&cache, settings.cache_floor_mb, settings.cache_margin_mb) {
            Ok(limit) => limit,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed to measure cache volume, using floor");
                settings.cache_floor_mb
            }
        };
        debug!(limit_mb = limit, "setting cache limit");
        self.ckan(
            "set cache limit",
            ["cache".to_string(), "setlimit".to_string(), limit.to_string()],
        );

        let repo_uri = file_uri(&settings.bundle);
        debug!(uri = %repo_uri, "adding local repo");
        self.ckan(
            "add local repo",
            ["repo".to_string(), "add".to_string(), "local".to_string(), repo_uri],
        );
        self.ckan(
            "set local repo priority",
            ["repo".to_string(), "priority".to_string(), "local".to_string(), "0".to_string()],
        );

        if let Some(stability) = &settings.stability {
            debug!(stability = %stability, "setting stability tolerance");
            self.ckan(
                "set stability tolerance",
                ["stability".to_string(), "set".to_string(), stability.clone()],
            );
        }

        self.populate_registry(settings);
    }

    fn populate_registry(&self, settings: &SandboxSettings) {
        let registry = settings.registry_path();
        if settings.saved_registry.exists() {
            debug!(saved = %settings.saved_registry.display(), "restoring saved registry");
            if let Err(err) = fs::copy(&settings.saved_registry, &registry) {
                warn!(err = %err, "failed to restore saved registry");
            }
            return;
        }
        debug!("updating registry");
        if self.ckan("update registry", ["update".to_string()]) {
            match fs::copy(&registry, &settings.saved_registry) {
                Ok(_) => debug!(saved = %settings.saved_registry.display(), "saved registry"),
                Err(err) => warn!(err = %err, "failed to save registry"),
            }
        }
    }

    /// Run one package-manager call; output only shows up at debug level.
    fn ckan<I>(&self, step: &str, args: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        run_quiet(self.runner, step, &self.tools.ckan(args))
    }
}

impl<R: ToolRunner> Drop for DummyInstance<'_, R> {
    fn drop(&mut self) {
        debug!("removing instance from instance list");
        run_quiet(
            self.runner,
            "forget instance",
            &self.tools.ckan(["instance", "forget", INSTANCE_NAME]),
        );
        debug!("deleting instance contents");
        match fs::remove_dir_all(&self.root) {
            Ok(()) => info!(root = %self.root.display(), "dummy game instance deleted"),
            Err(err) => warn!(root = %self.root.display(), err = %err, "failed to delete instance"),
        }
    }
}

fn run_quiet<R: ToolRunner>(runner: &R, step: &str, command: &ToolCommand) -> bool {
    let mut output = Vec::new();
    let result = runner.run(command, &mut |line| {
        debug!(target: "ckan", "{line}");
        output.push(line.to_string());
    });
    match result {
        Ok(true) => true,
        Ok(false) => {
            warn!(step, output = %output.join("\n"), "package manager step failed");
            false
        }
        Err(err) => {
            warn!(step, err = %format!("{err:#}"), "package manager step could not run");
            false
        }
    }
}

#[cfg(unix)]
fn link_cache(root: &Path, cache: &Path) -> Result<()> {
    let link = root.join("CKAN").join("downloads");
    std::os::unix::fs::symlink(cache, &link)
        .with_context(|| format!("symlink {} -> {}", link.display(), cache.display()))
}

#[cfg(not(unix))]
fn link_cache(_root: &Path, _cache: &Path) -> Result<()> {
    debug!("cache symlink not supported on this platform");
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn file_uri(path: &Path) -> String {
    let path = absolute(path);
    reqwest::Url::from_file_path(&path)
        .map(|url| url.to_string())
        .unwrap_or_else(|()| format!("file://{}", path.display()))
}

/// Cache limit in whole megabytes: everything the cache could grow into
/// minus a safety margin, but never below the floor.
pub fn cache_limit_mb(free_bytes: u64, cache_bytes: u64, floor_mb: u64, margin_mb: u64) -> u64 {
    (free_bytes.saturating_add(cache_bytes) / MB)
        .saturating_sub(margin_mb)
        .max(floor_mb)
}

fn cache_limit_for(cache: &Path, floor_mb: u64, margin_mb: u64) -> Result<u64> {
    let free = fs4::available_space(cache)
        .with_context(|| format!("free space on {}", cache.display()))?;
    Ok(cache_limit_mb(free, dir_size(cache), floor_mb, margin_mb))
}

/// Total size of regular files below `dir`.
pub fn dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}
