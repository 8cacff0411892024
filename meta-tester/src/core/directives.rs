//! Directives mined from a pull request description.
//!
//! Two grammars are recognized, each on a single line:
//!
//! - `ckan compat add <v> [<v> ...]`: extra game versions (dotted numbers) to
//!   mark compatible in every sandbox. Only the first occurrence counts.
//! - `ckan install <id>[=<version>] [...]`: an extra batch install of the
//!   listed identifiers. Every occurrence is its own batch.
//!
//! A bare `#overwrite_cache` anywhere asks the expander to refresh downloads.
//! Nothing else in the description affects the run.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::errors::VersionFormatError;
use crate::core::version::GameVersion;

static COMPAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ckan compat add((?: +[0-9.]+)+)").expect("valid compat directive regex")
});

static INSTALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ckan install((?: +[^\s=]+(?:=[^\s]+)?)+)").expect("valid install directive regex")
});

const OVERWRITE_CACHE_MARKER: &str = "#overwrite_cache";

/// Typed view of the directives found in a pull request description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrDirectives {
    pub compat_versions: Vec<GameVersion>,
    pub install_batches: Vec<Vec<String>>,
    pub overwrite_cache: bool,
}

impl PrDirectives {
    pub fn parse(body: Option<&str>) -> Result<Self, VersionFormatError> {
        let Some(body) = body.filter(|b| !b.trim().is_empty()) else {
            return Ok(Self::default());
        };
        Ok(Self {
            compat_versions: compat_versions(body)?,
            install_batches: install_batches(body),
            overwrite_cache: body.contains(OVERWRITE_CACHE_MARKER),
        })
    }
}

/// Versions listed by the first `ckan compat add` line.
pub fn compat_versions(body: &str) -> Result<Vec<GameVersion>, VersionFormatError> {
    let Some(caps) = COMPAT_RE.captures(body) else {
        return Ok(Vec::new());
    };
    caps[1].split_whitespace().map(GameVersion::parse).collect()
}

/// Identifier lists from every `ckan install` line.
pub fn install_batches(body: &str) -> Vec<Vec<String>> {
    INSTALL_RE
        .captures_iter(body)
        .map(|caps| caps[1].split_whitespace().map(str::to_string).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "\n    ## Description\n    Basic test case\n\n    ckan install Astrogator ModuleManager=4.2.1\n    ckan compat add 1.12";

    #[test]
    fn extracts_install_batch_and_compat_versions() {
        let directives = PrDirectives::parse(Some(BODY)).expect("parse");
        assert_eq!(
            directives.install_batches,
            vec![vec!["Astrogator".to_string(), "ModuleManager=4.2.1".to_string()]]
        );
        assert_eq!(
            directives.compat_versions,
            vec![GameVersion::parse("1.12").expect("version")]
        );
        assert!(!directives.overwrite_cache);
    }

    #[test]
    fn compact_directive_string() {
        let body = "ckan install Astrogator ModuleManager=4.2.1\nckan compat add 1.12";
        assert_eq!(
            install_batches(body),
            vec![vec!["Astrogator".to_string(), "ModuleManager=4.2.1".to_string()]]
        );
        assert_eq!(
            compat_versions(body).expect("versions"),
            vec![GameVersion::parse("1.12").expect("version")]
        );
    }

    #[test]
    fn each_install_line_is_its_own_batch() {
        let body = "ckan install A B\nsome text\nckan install C";
        assert_eq!(
            install_batches(body),
            vec![
                vec!["A".to_string(), "B".to_string()],
                vec!["C".to_string()],
            ]
        );
    }

    #[test]
    fn compat_line_with_several_versions() {
        let versions = compat_versions("ckan compat add 1.11 1.12.3\nthanks!").expect("versions");
        let rendered: Vec<String> = versions.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["1.11", "1.12.3"]);
    }

    #[test]
    fn malformed_compat_version_is_error() {
        let err = compat_versions("ckan compat add 1..2").unwrap_err();
        assert_eq!(err.value, "1..2");
    }

    #[test]
    fn empty_or_missing_body_has_no_directives() {
        assert_eq!(PrDirectives::parse(None).expect("none"), PrDirectives::default());
        assert_eq!(
            PrDirectives::parse(Some("  \n")).expect("blank"),
            PrDirectives::default()
        );
    }

    #[test]
    fn overwrite_cache_marker() {
        let directives =
            PrDirectives::parse(Some("Download was replaced #overwrite_cache")).expect("parse");
        assert!(directives.overwrite_cache);
        assert!(directives.install_batches.is_empty());
    }
}
