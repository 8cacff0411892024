//! Error taxonomy shared by core logic and orchestration.
//!
//! Item-level errors (format, path policy, incompatibility) fail a single
//! file or install and are recorded against the run. A [`ConfigurationError`]
//! aborts the run before any file is processed.

use std::path::PathBuf;

use thiserror::Error;

/// A game version string that is neither `any` nor `N[.N[.N[.N]]]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed game version: {value:?}")]
pub struct VersionFormatError {
    pub value: String,
}

impl VersionFormatError {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// A metadata file that could not be parsed.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("malformed metadata: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed metadata: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("invalid {field} in {identifier}: {source}")]
    Version {
        identifier: String,
        field: &'static str,
        #[source]
        source: VersionFormatError,
    },
}

/// Problems with the run's inputs or environment; fatal to the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("unknown game {0:?}, must be KSP or KSP2")]
    UnknownGame(String),
    #[error("base ref {base} does not name a commit")]
    UnknownBaseRef { base: String },
    #[error("no common ancestor between {base} and HEAD")]
    NoMergeBase { base: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A newly added file that sits somewhere it must not.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathPolicyViolation {
    #[error("{} should be in the {folder} folder", path.display())]
    WrongFolder { path: PathBuf, folder: &'static str },
    #[error("{stem} is frozen, unfreeze it by renaming or deleting {}", frozen.display())]
    Frozen { stem: String, frozen: PathBuf },
    #[error("{} should be placed in the folder named after its mod's identifier", path.display())]
    NotInIdentifierFolder { path: PathBuf },
}

/// The resolved set of game versions to install against is empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{subject} is not compatible with any game versions!")]
pub struct IncompatibleVersionError {
    pub subject: String,
}

/// The sandbox instance directory is already there; it is never reused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("instance directory {} already exists", root.display())]
pub struct InstanceRootExists {
    pub root: PathBuf,
}
