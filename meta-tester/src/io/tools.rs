//! External tool invocations.
//!
//! The [`ToolRunner`] trait decouples the pipeline from real subprocesses.
//! [`SystemRunner`] spawns them; tests use a scripted runner that records
//! every invocation. [`Toolchain`] knows how to spell each command.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::game::Game;
use crate::io::config::TesterConfig;
use crate::io::process::run_streaming;

/// A fully spelled-out command line plus optional stdin text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Whether the arguments contain `needle` as a contiguous run.
    pub fn has_args(&self, needle: &[&str]) -> bool {
        !needle.is_empty()
            && self
                .args
                .windows(needle.len())
                .any(|window| window.iter().zip(needle).all(|(a, b)| a == b))
    }

    /// Value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Abstraction over running external tools.
pub trait ToolRunner {
    /// Run `command` to completion, streaming each output line to `on_line`.
    /// Returns whether the tool exited successfully; `Err` only when it could
    /// not be run at all.
    fn run(&self, command: &ToolCommand, on_line: &mut dyn FnMut(&str)) -> Result<bool>;
}

/// Runs tools as real child processes.
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    #[instrument(skip_all, fields(command = %command))]
    fn run(&self, command: &ToolCommand, on_line: &mut dyn FnMut(&str)) -> Result<bool> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        let status = run_streaming(cmd, command.stdin.as_deref().map(str::as_bytes), on_line)?;
        debug!(exit_code = ?status.code(), "tool finished");
        Ok(status.success())
    }
}

/// Builds command lines for the expander, package manager and linters.
#[derive(Debug, Clone)]
pub struct Toolchain {
    launcher: Vec<String>,
    netkan_exe: PathBuf,
    ckan_exe: PathBuf,
    json_lint: Vec<String>,
    yaml_lint: Vec<String>,
}

/// Options shared by every expander invocation.
#[derive(Debug, Clone, Default)]
pub struct NetkanOptions<'a> {
    pub game: Option<Game>,
    pub github_token: Option<&'a str>,
    pub cache_dir: Option<&'a Path>,
    pub overwrite_cache: bool,
}

impl Toolchain {
    pub fn from_config(config: &TesterConfig) -> Self {
        Self {
            launcher: config.launcher.clone(),
            netkan_exe: config.netkan_exe.clone(),
            ckan_exe: config.ckan_exe.clone(),
            json_lint: config.json_lint.clone(),
            yaml_lint: config.yaml_lint.clone(),
        }
    }

    fn launch(&self, exe: &Path) -> ToolCommand {
        match self.launcher.split_first() {
            Some((program, rest)) => ToolCommand::new(program.clone())
                .args(rest.iter().cloned())
                .path_arg(exe),
            None => ToolCommand::new(exe.to_string_lossy()),
        }
    }

    /// `ckan <args...>`
    pub fn ckan<I, S>(&self, args: I) -> ToolCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launch(&self.ckan_exe).args(args)
    }

    fn netkan(&self, options: &NetkanOptions<'_>) -> ToolCommand {
        let mut cmd = self.launch(&self.netkan_exe);
        if let Some(game) = options.game {
            cmd = cmd.arg("--game").arg(game.short_name());
        }
        if let Some(token) = options.github_token {
            cmd = cmd.arg("--github-token").arg(token);
        }
        if let Some(cache) = options.cache_dir {
            cmd = cmd.arg("--cachedir").path_arg(cache);
        }
        if options.overwrite_cache {
            cmd = cmd.arg("--overwrite-cache");
        }
        cmd
    }

    /// Expand a source into compiled files under `output_dir`.
    pub fn inflate(
        &self,
        options: &NetkanOptions<'_>,
        output_dir: &Path,
        highest_version: Option<&str>,
        file: &Path,
    ) -> ToolCommand {
        let mut cmd = self.netkan(options).arg("--outputdir").path_arg(output_dir);
        if let Some(version) = highest_version {
            cmd = cmd.arg("--highest-version").arg(version);
        }
        cmd.path_arg(file)
    }

    /// Validate an existing compiled file.
    pub fn validate(&self, options: &NetkanOptions<'_>, file: &Path) -> ToolCommand {
        self.netkan(options).arg("--validate-ckan").path_arg(file)
    }

    pub fn json_lint(&self, file: &Path) -> ToolCommand {
        lint_command(&self.json_lint, file)
    }

    pub fn yaml_lint(&self, file: &Path) -> ToolCommand {
        lint_command(&self.yaml_lint, file)
    }
}

fn lint_command(base: &[String], file: &Path) -> ToolCommand {
    let (program, rest) = base
        .split_first()
        .map(|(p, r)| (p.clone(), r.to_vec()))
        .unwrap_or_default();
    ToolCommand::new(program).args(rest).path_arg(file)
}
