//! Fetching the published list of released game builds.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::game::{Catalog, Game};
use crate::io::github::http_client;

/// Download and decode the build manifest for `game`.
#[instrument(skip_all, fields(game = game.short_name()))]
pub fn load_catalog(game: Game) -> Result<Catalog> {
    let url = game.builds_url();
    debug!(url, "fetching build manifest");
    let manifest: Value = http_client()?
        .get(url)
        .send()
        .with_context(|| format!("fetch {url}"))?
        .error_for_status()
        .with_context(|| format!("fetch {url}"))?
        .json()
        .with_context(|| format!("parse build manifest from {url}"))?;
    let catalog = Catalog::from_manifest(game, &manifest)
        .with_context(|| format!("decode build manifest from {url}"))?;
    info!(versions = catalog.versions.len(), "loaded game versions");
    Ok(catalog)
}
