//! GitHub Actions workflow commands and tool output classification.
//!
//! Annotations render as single lines:
//!
//! ```text
//! ::error file=<path>[,line=<n>,col=<n>]::<message>
//! ::warning file=<path>::<message>
//! ::error::<message>
//! ```
//!
//! `%`, `\r` and `\n` inside messages are percent-encoded so multi-line tool
//! output stays a single workflow command. Property values additionally
//! encode `:` and `,`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static POSITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<path>[^\s:]+):(?P<line>\d+)[:.](?P<col>\d+):?\s*(?P<message>.*)$")
        .expect("valid position regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn command(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// One workflow command attached to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub severity: Severity,
    /// `None` for run-level problems that belong to no file.
    pub file: Option<PathBuf>,
    pub position: Option<(u32, u32)>,
    pub message: String,
}

impl Annotation {
    pub fn error(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            file: Some(file.into()),
            position: None,
            message: message.into(),
        }
    }

    pub fn warning(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            file: Some(file.into()),
            position: None,
            message: message.into(),
        }
    }

    /// An error attached to the run rather than to a file.
    pub fn run_error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            file: None,
            position: None,
            message: message.into(),
        }
    }

    /// Same annotation, attached to `file` when one is known.
    fn for_file(severity: Severity, file: Option<&Path>, message: &str) -> Self {
        Self {
            severity,
            file: file.map(Path::to_path_buf),
            position: None,
            message: message.to_string(),
        }
    }

    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.position = Some((line, col));
        self
    }

    /// Promote `path:line:col message` (or `path:line.col`) into a positioned
    /// error; the path in the text is ignored in favor of `file`.
    pub fn positioned_error(file: &Path, text: &str) -> Option<Self> {
        let caps = POSITION_RE.captures(text.trim_end())?;
        let line = caps["line"].parse().ok()?;
        let col = caps["col"].parse().ok()?;
        Some(Self::error(file, caps["message"].to_string()).at(line, col))
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "::{}", self.severity.command())?;
        let mut params = Vec::new();
        if let Some(file) = &self.file {
            params.push(format!("file={}", encode_property(&file.display().to_string())));
        }
        if let Some((line, col)) = self.position {
            params.push(format!("line={line},col={col}"));
        }
        if !params.is_empty() {
            write!(f, " {}", params.join(","))?;
        }
        write!(f, "::{}", encode_message(&self.message))
    }
}

/// Percent-encode the characters that would break a workflow command.
pub fn encode_message(message: &str) -> String {
    let trimmed = message.strip_suffix('\n').unwrap_or(message);
    trimmed
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Percent-encode a property value such as `file=`.
pub fn encode_property(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
        .replace(':', "%3A")
        .replace(',', "%2C")
}

/// What to do with a single line of streamed tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Plain(String),
    Annotated(Annotation),
}

/// One step of the line classification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRule {
    /// `path:line:col message` becomes a positioned error.
    Position,
    /// Log lines carrying ` ERROR `/` FATAL ` or ` WARN ` levels.
    LogLevel,
}

impl LineRule {
    fn apply(self, file: Option<&Path>, line: &str) -> Option<Annotation> {
        match self {
            Self::Position => file.and_then(|file| Annotation::positioned_error(file, line)),
            Self::LogLevel => {
                if line.contains(" ERROR ") || line.contains(" FATAL ") {
                    Some(Annotation::for_file(Severity::Error, file, line))
                } else if line.contains(" WARN ") {
                    Some(Annotation::for_file(Severity::Warning, file, line))
                } else {
                    None
                }
            }
        }
    }
}

/// Ordered rules; the first one that matches wins, otherwise the line is plain.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    rules: Vec<LineRule>,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new(vec![LineRule::LogLevel, LineRule::Position])
    }
}

impl LineClassifier {
    pub fn new(rules: Vec<LineRule>) -> Self {
        Self { rules }
    }

    /// A classifier that never annotates.
    pub fn plain() -> Self {
        Self::new(Vec::new())
    }

    /// Classify one line of output produced while testing `file`.
    pub fn classify(&self, file: Option<&Path>, line: &str) -> Classified {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(file, line))
            .map(Classified::Annotated)
            .unwrap_or_else(|| Classified::Plain(line.to_string()))
    }
}
