//! Shared deterministic types for a single tester run.

use std::path::{Path, PathBuf};

use clap::ValueEnum;

/// Which files a run selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Every metadata file below the working directory.
    #[value(name = "netkans")]
    FullScan,
    /// Files added, modified or renamed since the base ref.
    #[value(name = "commits")]
    Incremental,
}

/// Per-run bookkeeping owned by the pipeline.
///
/// `outputs` keeps sources in the order they were tested and each source's
/// compiled files in discovery order. `failed` only ever goes from false to true.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    outputs: Vec<(PathBuf, Vec<PathBuf>)>,
    failed: bool,
}

impl RunState {
    pub fn record_outputs(&mut self, source: &Path, outputs: Vec<PathBuf>) {
        match self.outputs.iter_mut().find(|(s, _)| s == source) {
            Some((_, existing)) => existing.extend(outputs),
            None => self.outputs.push((source.to_path_buf(), outputs)),
        }
    }

    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// Fold a single outcome into the run; returns the outcome unchanged.
    pub fn record(&mut self, ok: bool) -> bool {
        if !ok {
            self.failed = true;
        }
        ok
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    /// `(source, compiled output)` pairs in recording order.
    pub fn compiled_outputs(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.outputs.iter().flat_map(|(source, outputs)| {
            outputs
                .iter()
                .map(move |output| (source.as_path(), output.as_path()))
        })
    }

    pub fn outputs_for(&self, source: &Path) -> Option<&[PathBuf]> {
        self.outputs
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, outputs)| outputs.as_slice())
    }

    pub fn output_count(&self) -> usize {
        self.outputs.iter().map(|(_, outputs)| outputs.len()).sum()
    }
}
