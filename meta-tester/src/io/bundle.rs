//! Local repository bundle built from freshly compiled outputs.

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, instrument};

/// Archive the whole of `source_dir` into a gzipped tarball at `bundle_path`.
///
/// Entries are stored relative to `source_dir`, which is the layout the
/// package manager expects from a repository archive.
#[instrument(skip_all, fields(source = %source_dir.display(), bundle = %bundle_path.display()))]
pub fn build_bundle(source_dir: &Path, bundle_path: &Path) -> Result<()> {
    if let Some(parent) = bundle_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let file = File::create(bundle_path)
        .with_context(|| format!("create bundle {}", bundle_path.display()))?;
    let mut archive = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    archive.follow_symlinks(false);
    archive
        .append_dir_all(".", source_dir)
        .with_context(|| format!("archive {}", source_dir.display()))?;
    archive
        .into_inner()
        .context("finish tar stream")?
        .finish()
        .context("finish gzip stream")?;
    debug!("bundle written");
    Ok(())
}
