//! Selection of the metadata files a run tests.
//!
//! A full scan walks the whole working tree. An incremental run diffs the
//! merge base of the base ref and `HEAD`, and checks where newly added files
//! were put before accepting them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{Level, debug, info, instrument};
use walkdir::WalkDir;

use crate::core::errors::ConfigurationError;
use crate::core::paths::{FileKind, check_added_path, sorted_union};
use crate::core::types::RunMode;
use crate::io::git::{ChangeKind, Git};
use crate::io::reporter::Reporter;

/// Files selected for testing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Paths relative to the repository root, in test order.
    pub files: Vec<PathBuf>,
    /// An added file broke a placement rule.
    pub policy_failed: bool,
}

/// Inputs that decide how changes are found.
#[derive(Debug, Clone)]
pub struct ChangeSetOptions<'a> {
    pub base_ref: &'a str,
    pub actor_is_bot: bool,
}

#[instrument(skip_all, fields(mode = ?mode, root = %root.display()))]
pub fn resolve(
    mode: RunMode,
    root: &Path,
    options: &ChangeSetOptions<'_>,
    reporter: &Reporter,
) -> Result<ChangeSet> {
    let change_set = match mode {
        RunMode::FullScan => ChangeSet {
            files: scan_tree(root)?,
            policy_failed: false,
        },
        RunMode::Incremental => changed_since(root, options, reporter)?,
    };
    info!(count = change_set.files.len(), "files selected");
    Ok(change_set)
}

/// Every metadata file under `root`, in directory-walk order.
pub fn scan_tree(root: &Path) -> Result<Vec<PathBuf>> {
    debug!("searching repo for metadata files");
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".git");
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() || FileKind::from_path(entry.path()).is_none() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        files.push(rel.to_path_buf());
    }
    Ok(files)
}

fn changed_since(root: &Path, options: &ChangeSetOptions<'_>, reporter: &Reporter) -> Result<ChangeSet> {
    let git = Git::new(root);
    if !git.resolves_to_commit(options.base_ref)? {
        return Err(ConfigurationError::UnknownBaseRef {
            base: options.base_ref.to_string(),
        }
        .into());
    }
    let base = git
        .merge_base(options.base_ref, "HEAD")?
        .ok_or_else(|| ConfigurationError::NoMergeBase {
            base: options.base_ref.to_string(),
        })?;
    debug!(base_ref = options.base_ref, merge_base = %base, "searching commits for changed files");

    let mut added = Vec::new();
    let mut changed = Vec::new();
    for entry in git.diff_name_status(&base, "HEAD")? {
        match entry.kind {
            ChangeKind::Added | ChangeKind::Copied => added.push(entry.path),
            ChangeKind::Modified | ChangeKind::Renamed => changed.push(entry.path),
            ChangeKind::Deleted | ChangeKind::Other => {}
        }
    }
    debug!(added = added.len(), changed = changed.len(), "diff summary");

    // Existing files probably have valid names, new ones need to be checked
    let mut policy_failed = false;
    let mut accepted = Vec::new();
    for path in added {
        let check = check_added_path(&path, options.actor_is_bot, |frozen| root.join(frozen).exists());
        for annotation in &check.annotations {
            reporter.annotate(annotation);
        }
        if check.violation.is_some() {
            policy_failed = true;
        }
        if check.accepted {
            accepted.push(path);
        }
    }
    changed.retain(|path| FileKind::from_path(path).is_some());

    Ok(ChangeSet {
        files: sorted_union([accepted, changed]),
        policy_failed,
    })
}

/// First non-empty value among `vars`, else `default`.
///
/// At debug level every variable is logged, not just the one chosen.
pub fn select_base_ref(
    vars: &[String],
    lookup: impl Fn(&str) -> Option<String>,
    default: &str,
) -> String {
    let log_all = tracing::enabled!(Level::DEBUG);
    let mut chosen: Option<String> = None;
    for var in vars {
        let value = lookup(var).filter(|v| !v.trim().is_empty());
        debug!(var = %var, value = ?value, "base ref variable");
        if chosen.is_none() {
            chosen = value;
            if chosen.is_some() && !log_all {
                break;
            }
        }
    }
    chosen.unwrap_or_else(|| default.to_string())
}
