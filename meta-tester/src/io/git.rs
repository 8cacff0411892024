//! Git adapter used to enumerate changed files.
//!
//! Only a handful of read-only plumbing commands are needed, so we keep a
//! small, explicit wrapper around `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Kind of change reported by `git diff --name-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Renamed,
    Copied,
    Deleted,
    Other,
}

/// Parsed `git diff --name-status` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub kind: ChangeKind,
    /// Path after the change (the new path for renames).
    pub path: PathBuf,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Best common ancestor of `base` and `head`, or `None` if they share no history.
    #[instrument(skip_all, fields(base, head))]
    pub fn merge_base(&self, base: &str, head: &str) -> Result<Option<String>> {
        let output = self.run(&["merge-base", base, head])?;
        match output.status.code() {
            Some(0) => {
                let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
                debug!(sha = %sha, "merge base");
                Ok(Some(sha))
            }
            // merge-base exits 1 with no output when there is no common ancestor
            Some(1) if output.stdout.is_empty() && output.stderr.is_empty() => Ok(None),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(anyhow!("git merge-base {base} {head} failed: {}", stderr.trim()))
            }
        }
    }

    /// Whether `rev` names a commit in this repository.
    pub fn resolves_to_commit(&self, rev: &str) -> Result<bool> {
        let spec = format!("{rev}^{{commit}}");
        let output = self.run(&["rev-parse", "--verify", "--quiet", &spec])?;
        Ok(output.status.success())
    }

    /// Changes between two commits with rename detection.
    ///
    /// Uses `-z` so paths arrive unquoted, whatever characters they contain.
    #[instrument(skip_all, fields(from, to))]
    pub fn diff_name_status(&self, from: &str, to: &str) -> Result<Vec<DiffEntry>> {
        let out = self.run_capture(&["diff", "--name-status", "-z", "-M", from, to])?;
        let entries = parse_name_status_z(&out)?;
        debug!(count = entries.len(), "diff entries");
        Ok(entries)
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Commit staged changes with a message.
    pub fn commit(&self, message: &str) -> Result<()> {
        self.run_checked(&["commit", "-q", "-m", message])?;
        Ok(())
    }

    /// Full SHA of `rev`.
    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        Ok(self.run_capture(&["rev-parse", rev])?.trim().to_string())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// Parse `status\0path\0` records; renames and copies carry a second path.
fn parse_name_status_z(out: &str) -> Result<Vec<DiffEntry>> {
    let mut fields = out.split('\0').filter(|f| !f.is_empty());
    let mut entries = Vec::new();
    while let Some(status) = fields.next() {
        let kind = match status.as_bytes()[0] {
            b'A' => ChangeKind::Added,
            b'M' => ChangeKind::Modified,
            b'R' => ChangeKind::Renamed,
            b'C' => ChangeKind::Copied,
            b'D' => ChangeKind::Deleted,
            _ => ChangeKind::Other,
        };
        let mut path = fields
            .next()
            .ok_or_else(|| anyhow!("name-status record {status:?} has no path"))?;
        if matches!(kind, ChangeKind::Renamed | ChangeKind::Copied) {
            path = fields
                .next()
                .ok_or_else(|| anyhow!("name-status record {status:?} has no new path"))?;
        }
        entries.push(DiffEntry {
            kind,
            path: PathBuf::from(path),
        });
    }
    Ok(entries)
}
