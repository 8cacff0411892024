//! Product output: plain log lines, annotations and log groups on stdout.
//!
//! Everything the CI reader sees goes through a [`Reporter`]. Diagnostics for
//! developers go through `tracing` instead.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use tracing::warn;

use crate::core::annotation::{Annotation, Classified};

/// Line-oriented writer for workflow commands.
pub struct Reporter {
    out: RefCell<Box<dyn Write>>,
}

impl Reporter {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(out: Box<dyn Write>) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    /// A reporter writing into a shared in-memory buffer.
    pub fn capture() -> (Self, CapturedOutput) {
        let buffer = CapturedOutput::default();
        (Self::new(Box::new(buffer.clone())), buffer)
    }

    /// Write one line and flush, so ordering with child output is preserved.
    pub fn line(&self, text: &str) {
        let mut out = self.out.borrow_mut();
        if let Err(err) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            warn!(err = %err, "failed to write report line");
        }
    }

    /// Write raw text as-is (used for diffs that carry their own newlines).
    pub fn raw(&self, text: &str) {
        let mut out = self.out.borrow_mut();
        if let Err(err) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            warn!(err = %err, "failed to write report text");
        }
    }

    pub fn annotate(&self, annotation: &Annotation) {
        self.line(&annotation.to_string());
    }

    pub fn emit(&self, classified: Classified) {
        match classified {
            Classified::Plain(text) => self.line(&text),
            Classified::Annotated(annotation) => self.annotate(&annotation),
        }
    }

    /// Open a collapsible log group that closes when the guard drops.
    pub fn group(&self, title: &str) -> LogGroup<'_> {
        // Printed before returning so nested output cannot sneak in first.
        self.line(&format!("::group::{title}"));
        LogGroup { reporter: self }
    }
}

/// Guard for a `::group::` ... `::endgroup::` bracket.
#[must_use = "the group closes as soon as the guard is dropped"]
pub struct LogGroup<'a> {
    reporter: &'a Reporter,
}

impl Drop for LogGroup<'_> {
    fn drop(&mut self) {
        self.reporter.line("::endgroup::");
    }
}

/// Shared buffer behind [`Reporter::capture`].
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl CapturedOutput {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
