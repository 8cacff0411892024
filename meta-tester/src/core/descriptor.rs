//! Parsed metadata files and their game compatibility.
//!
//! A compiled `.ckan` is always JSON; a `.netkan` source may be JSON or YAML
//! and is only ever read here for its identifier.

use serde::Deserialize;
use similar::TextDiff;
use tracing::debug;

use crate::core::errors::DescriptorError;
use crate::core::game::Catalog;
use crate::core::version::GameVersion;

#[derive(Debug, Deserialize)]
struct DescriptorFields {
    identifier: String,
    name: Option<String>,
    version: String,
    ksp_version: Option<String>,
    ksp_version_min: Option<String>,
    ksp_version_max: Option<String>,
}

/// A compiled metadata file with its raw text kept for diffing.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub identifier: String,
    pub name: String,
    pub version: String,
    lowest: GameVersion,
    highest: GameVersion,
    contents: String,
}

impl Descriptor {
    /// Strict JSON parse; syntax errors surface before any field checks.
    pub fn parse(contents: &str) -> Result<Self, DescriptorError> {
        let fields: DescriptorFields = serde_json::from_str(contents)?;
        let lowest = resolve_bound(
            &fields.identifier,
            "ksp_version_min",
            fields.ksp_version_min.as_deref(),
            fields.ksp_version.as_deref(),
        )?;
        let highest = resolve_bound(
            &fields.identifier,
            "ksp_version_max",
            fields.ksp_version_max.as_deref(),
            fields.ksp_version.as_deref(),
        )?;
        Ok(Self {
            name: fields.name.unwrap_or_else(|| fields.identifier.clone()),
            identifier: fields.identifier,
            version: fields.version,
            lowest,
            highest,
            contents: contents.to_string(),
        })
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn lowest_compat(&self) -> &GameVersion {
        &self.lowest
    }

    pub fn highest_compat(&self) -> &GameVersion {
        &self.highest
    }

    /// Catalog versions between the lower and upper bound, inclusive.
    pub fn compatible_versions(&self, catalog: &Catalog) -> Vec<GameVersion> {
        debug!(min = %self.lowest, max = %self.highest, "finding compatible versions");
        catalog
            .versions
            .iter()
            .filter(|v| v.compatible(&self.lowest, &self.highest))
            .cloned()
            .collect()
    }

    /// Unified diff against the single baseline release with the same
    /// identifier and version. Missing or ambiguous baselines yield `None`.
    pub fn diff_against(&self, baseline: &[Descriptor]) -> Option<String> {
        let mut matches = baseline
            .iter()
            .filter(|prev| prev.identifier == self.identifier && prev.version == self.version);
        let previous = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        let diff = TextDiff::from_lines(previous.contents(), self.contents())
            .unified_diff()
            .header(
                &format!("Previous {} {}", self.name, self.version),
                &format!("New {} {}", self.name, self.version),
            )
            .to_string();
        Some(diff)
    }
}

/// Explicit bound, else the single `ksp_version`, else `any`.
fn resolve_bound(
    identifier: &str,
    field: &'static str,
    bound: Option<&str>,
    target: Option<&str>,
) -> Result<GameVersion, DescriptorError> {
    let (field, text) = match (bound, target) {
        (Some(text), _) => (field, text),
        (None, Some(text)) => ("ksp_version", text),
        (None, None) => return Ok(GameVersion::any()),
    };
    GameVersion::parse(text).map_err(|source| DescriptorError::Version {
        identifier: identifier.to_string(),
        field,
        source,
    })
}

#[derive(Debug, Deserialize)]
struct SourceFields {
    identifier: String,
}

/// Read the identifier out of a `.netkan` source (JSON or YAML).
pub fn source_identifier(contents: &str) -> Result<String, DescriptorError> {
    let fields: SourceFields = serde_yaml_ng::from_str(contents)?;
    Ok(fields.identifier)
}
