//! Per-game knowledge: names, build manifests, and DLC gating.
//!
//! The set of supported games is closed, so each one is a variant of [`Game`]
//! and every game-specific behavior is a `match` on it.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::core::errors::{ConfigurationError, VersionFormatError};
use crate::core::version::GameVersion;

static BUILD_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[0-9]+$").expect("valid build suffix regex"));

/// A DLC pack that can be enabled on a fake instance once the game is new enough.
struct Dlc {
    flag: &'static str,
    dlc_version: &'static str,
    min_game_version: &'static str,
}

const KSP1_DLCS: &[Dlc] = &[
    Dlc {
        flag: "--MakingHistory",
        dlc_version: "1.1.0",
        min_game_version: "1.4.1",
    },
    Dlc {
        flag: "--BreakingGround",
        dlc_version: "1.0.0",
        min_game_version: "1.7.1",
    },
];

/// A game the metadata can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Game {
    Ksp1,
    Ksp2,
}

impl Game {
    pub fn from_id(game_id: &str) -> Result<Self, ConfigurationError> {
        match game_id {
            "KSP" => Ok(Self::Ksp1),
            "KSP2" => Ok(Self::Ksp2),
            other => Err(ConfigurationError::UnknownGame(other.to_string())),
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Self::Ksp1 => "KSP",
            Self::Ksp2 => "KSP2",
        }
    }

    /// Where the published list of released builds lives.
    pub fn builds_url(self) -> &'static str {
        match self {
            Self::Ksp1 => "https://raw.githubusercontent.com/KSP-CKAN/CKAN-meta/master/builds.json",
            Self::Ksp2 => {
                "https://raw.githubusercontent.com/KSP-CKAN/KSP2-CKAN-meta/master/builds.json"
            }
        }
    }

    /// Turn a raw build manifest into released versions, oldest first.
    ///
    /// KSP publishes `{"builds": {"<build id>": "1.8.0.12345", ...}}`, KSP2 a
    /// flat array of version strings. Both lose their trailing build segment
    /// and collapse duplicates in first-seen order.
    pub fn decode(self, manifest: &Value) -> Result<Vec<GameVersion>, VersionFormatError> {
        let raw: Vec<&str> = match self {
            Self::Ksp1 => manifest
                .get("builds")
                .and_then(Value::as_object)
                .map(|builds| builds.values().filter_map(Value::as_str).collect())
                .unwrap_or_default(),
            Self::Ksp2 => manifest
                .as_array()
                .map(|builds| builds.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default(),
        };
        normalize_versions(raw)
    }

    /// Extra `instance fake` arguments enabling the DLC available at `version`.
    pub fn dlc_flags(self, version: &GameVersion) -> Vec<(String, String)> {
        let dlcs: &[Dlc] = match self {
            Self::Ksp1 => KSP1_DLCS,
            Self::Ksp2 => &[],
        };
        dlcs.iter()
            .filter(|dlc| {
                GameVersion::parse(dlc.min_game_version)
                    .map(|min| version.at_least(&min))
                    .unwrap_or(false)
            })
            .map(|dlc| (dlc.flag.to_string(), dlc.dlc_version.to_string()))
            .collect()
    }
}

/// Strip build segments, drop repeats, keep first-seen order.
fn normalize_versions<'a>(
    raw: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<GameVersion>, VersionFormatError> {
    let mut seen = HashSet::new();
    let mut versions = Vec::new();
    for value in raw {
        let stripped = BUILD_SUFFIX_RE.replace(value, "").into_owned();
        if seen.insert(stripped.clone()) {
            versions.push(GameVersion::parse(&stripped)?);
        }
    }
    Ok(versions)
}

/// Released versions of one game, built once per run.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub game: Game,
    pub versions: Vec<GameVersion>,
}

impl Catalog {
    pub fn new(game: Game, versions: Vec<GameVersion>) -> Self {
        Self { game, versions }
    }

    pub fn from_manifest(game: Game, manifest: &Value) -> Result<Self, VersionFormatError> {
        Ok(Self::new(game, game.decode(manifest)?))
    }

    pub fn dlc_flags(&self, version: &GameVersion) -> Vec<(String, String)> {
        self.game.dlc_flags(version)
    }
}
