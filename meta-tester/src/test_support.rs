//! Test-only fakes and fixtures: scripted tool runner, game catalog and
//! throwaway git repositories.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::game::{Catalog, Game};
use crate::core::version::GameVersion;
use crate::io::git::Git;
use crate::io::tools::{ToolCommand, ToolRunner};

/// What a scripted tool prints and how it exits.
#[derive(Debug, Clone, Default)]
pub struct ScriptedReply {
    pub lines: Vec<String>,
    pub success: bool,
}

impl ScriptedReply {
    pub fn ok() -> Self {
        Self {
            lines: Vec::new(),
            success: true,
        }
    }

    pub fn ok_with<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            success: true,
        }
    }

    pub fn fail<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            success: false,
        }
    }
}

type Responder = Box<dyn Fn(&ToolCommand) -> ScriptedReply>;

/// [`ToolRunner`] that records every command and answers from a closure.
pub struct ScriptedRunner {
    responder: Responder,
    calls: RefCell<Vec<ToolCommand>>,
}

impl ScriptedRunner {
    pub fn new(responder: impl Fn(&ToolCommand) -> ScriptedReply + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// A runner where every tool succeeds silently.
    pub fn succeeding() -> Self {
        Self::new(|_| ScriptedReply::ok())
    }

    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.borrow().clone()
    }

    /// Arguments of every call, without the program.
    pub fn arg_lists(&self) -> Vec<Vec<String>> {
        self.calls.borrow().iter().map(|c| c.args.clone()).collect()
    }

    /// Number of calls whose arguments contain `needle` contiguously.
    pub fn count_matching(&self, needle: &[&str]) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.has_args(needle))
            .count()
    }
}

impl ToolRunner for ScriptedRunner {
    fn run(&self, command: &ToolCommand, on_line: &mut dyn FnMut(&str)) -> Result<bool> {
        self.calls.borrow_mut().push(command.clone());
        let reply = (self.responder)(command);
        for line in &reply.lines {
            on_line(line);
        }
        Ok(reply.success)
    }
}

/// KSP catalog with the 1.8 through 1.10 releases.
pub fn fixture_catalog() -> Catalog {
    let versions = ["1.8.0", "1.8.1", "1.9.0", "1.9.1", "1.10.0", "1.10.1"]
        .into_iter()
        .map(|v| GameVersion::parse(v).expect("fixture version"))
        .collect();
    Catalog::new(Game::Ksp1, versions)
}

/// A throwaway git repository with one initial commit on `master`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo dir")?;
        let repo = Self { dir };
        repo.git_cmd(&["init", "-q", "-b", "master"])?;
        repo.git_cmd(&["config", "user.email", "tester@example.com"])?;
        repo.git_cmd(&["config", "user.name", "Tester"])?;
        repo.git_cmd(&["config", "commit.gpgsign", "false"])?;
        repo.write("README.md", "metadata\n")?;
        repo.commit("initial")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self) -> Git {
        Git::new(self.path())
    }

    /// Write `contents` to a path relative to the repository root.
    pub fn write(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn remove(&self, rel: &str) -> Result<()> {
        let path = self.path().join(rel);
        fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))
    }

    /// Stage everything and commit; returns the new HEAD sha.
    pub fn commit(&self, message: &str) -> Result<String> {
        let git = self.git();
        git.add_all()?;
        git.commit(message)?;
        git.rev_parse("HEAD")
    }

    /// Start a branch at the current HEAD.
    pub fn checkout_new(&self, branch: &str) -> Result<()> {
        self.git_cmd(&["checkout", "-q", "-b", branch])
    }

    /// An orphan branch with no shared history.
    pub fn checkout_orphan(&self, branch: &str) -> Result<()> {
        self.git_cmd(&["checkout", "-q", "--orphan", branch])
    }

    fn git_cmd(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}
