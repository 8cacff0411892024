//! Read access to the already-published metadata repository.
//!
//! The baseline follows the usual layout, one folder per identifier holding
//! one compiled file per release: `<root>/<identifier>/<identifier>-<version>.ckan`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::descriptor::Descriptor;
use crate::core::mod_version;
use crate::core::paths::FileKind;

#[derive(Debug, Clone)]
pub struct BaselineRepo {
    root: PathBuf,
}

impl BaselineRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every published release of `identifier`. Unreadable files are skipped.
    pub fn releases(&self, identifier: &str) -> Result<Vec<Descriptor>> {
        let dir = self.root.join(identifier);
        if !dir.is_dir() {
            debug!(identifier, "no baseline releases");
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
            .with_context(|| format!("read {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| FileKind::from_path(path) == Some(FileKind::Compiled))
            .collect();
        paths.sort();

        let mut releases = Vec::with_capacity(paths.len());
        for path in paths {
            match read_descriptor(&path) {
                Ok(descriptor) if descriptor.identifier == identifier => releases.push(descriptor),
                Ok(_) => {}
                Err(err) => warn!(path = %path.display(), err = %format!("{err:#}"), "skipping baseline file"),
            }
        }
        Ok(releases)
    }

    /// Highest published version of `identifier`, if it has any releases.
    pub fn highest_version(&self, identifier: &str) -> Result<Option<String>> {
        let releases = self.releases(identifier)?;
        Ok(mod_version::highest(releases.iter().map(|r| r.version.as_str())).map(str::to_string))
    }
}

/// Read and parse a compiled descriptor from disk.
pub fn read_descriptor(path: &Path) -> Result<Descriptor> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Descriptor::parse(&contents).with_context(|| format!("parse {}", path.display()))
}
