//! Classification of metadata paths and the rules for newly added files.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::core::annotation::Annotation;
use crate::core::errors::PathPolicyViolation;

/// Top-level folder every new source file must live in.
pub const SOURCE_FOLDER: &str = "NetKAN";

/// The two kinds of metadata file this tool tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `.netkan` source descriptor.
    Source,
    /// `.ckan` compiled descriptor.
    Compiled,
}

impl FileKind {
    /// Classify by extension, ignoring case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(OsStr::to_str)?.to_ascii_lowercase();
        match ext.as_str() {
            "netkan" => Some(Self::Source),
            "ckan" => Some(Self::Compiled),
            _ => None,
        }
    }
}

/// Outcome of checking one added path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedPathCheck {
    /// Whether the file should be tested.
    pub accepted: bool,
    pub violation: Option<PathPolicyViolation>,
    pub annotations: Vec<Annotation>,
}

impl AddedPathCheck {
    fn accept(annotations: Vec<Annotation>) -> Self {
        Self {
            accepted: true,
            violation: None,
            annotations,
        }
    }

    fn skip(annotation: Annotation) -> Self {
        Self {
            accepted: false,
            violation: None,
            annotations: vec![annotation],
        }
    }

    fn reject(path: &Path, violation: PathPolicyViolation, mut annotations: Vec<Annotation>) -> Self {
        annotations.push(Annotation::error(path, violation.to_string()));
        Self {
            accepted: false,
            violation: Some(violation),
            annotations,
        }
    }
}

/// Check where a newly added file sits.
///
/// - sources must be under [`SOURCE_FOLDER`] and must not have a sibling
///   `.frozen` marker (`frozen_exists` is asked about that marker);
/// - compiled files must sit exactly one folder deep, and get a warning when
///   someone other than the bot adds them;
/// - anything else is skipped with a warning.
pub fn check_added_path(
    path: &Path,
    actor_is_bot: bool,
    frozen_exists: impl Fn(&Path) -> bool,
) -> AddedPathCheck {
    match FileKind::from_path(path) {
        Some(FileKind::Source) => {
            if first_component(path) != Some(OsStr::new(SOURCE_FOLDER)) {
                return AddedPathCheck::reject(
                    path,
                    PathPolicyViolation::WrongFolder {
                        path: path.to_path_buf(),
                        folder: SOURCE_FOLDER,
                    },
                    Vec::new(),
                );
            }
            let frozen = path.with_extension("frozen");
            if frozen_exists(&frozen) {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                return AddedPathCheck::reject(
                    path,
                    PathPolicyViolation::Frozen { stem, frozen },
                    Vec::new(),
                );
            }
            AddedPathCheck::accept(Vec::new())
        }
        Some(FileKind::Compiled) => {
            let mut annotations = Vec::new();
            if !actor_is_bot {
                annotations.push(Annotation::warning(
                    path,
                    "Usually we should trust the bot to create .ckan files, are you sure you know what you're doing?",
                ));
            }
            if normal_components(path).len() != 2 {
                return AddedPathCheck::reject(
                    path,
                    PathPolicyViolation::NotInIdentifierFolder {
                        path: path.to_path_buf(),
                    },
                    annotations,
                );
            }
            AddedPathCheck::accept(annotations)
        }
        None => AddedPathCheck::skip(Annotation::warning(
            path,
            format!(
                "To validate {}, set its extension to .netkan or .ckan",
                path.display()
            ),
        )),
    }
}

fn normal_components(path: &Path) -> Vec<&OsStr> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .collect()
}

fn first_component(path: &Path) -> Option<&OsStr> {
    normal_components(path).first().copied()
}

/// Sorted, de-duplicated union of paths.
pub fn sorted_union(groups: impl IntoIterator<Item = Vec<PathBuf>>) -> Vec<PathBuf> {
    let mut all: Vec<PathBuf> = groups.into_iter().flatten().collect();
    all.sort();
    all.dedup();
    all
}
