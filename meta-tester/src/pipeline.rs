//! The run itself: lint, expand or validate, bundle, install.
//!
//! Files are processed one at a time in selection order. A failing file is
//! annotated and recorded, and the run moves on so every problem is reported;
//! installs only start once every file has passed. Unexpected errors while
//! testing one file or install are annotated and recorded the same way; only
//! an occupied sandbox directory aborts the run.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument};
use walkdir::WalkDir;

use crate::change_set::{self, ChangeSetOptions};
use crate::core::annotation::{Annotation, LineClassifier};
use crate::core::descriptor::source_identifier;
use crate::core::directives::PrDirectives;
use crate::core::errors::InstanceRootExists;
use crate::core::game::Catalog;
use crate::core::paths::FileKind;
use crate::core::types::{RunMode, RunState};
use crate::install::InstallCheck;
use crate::io::baseline::BaselineRepo;
use crate::io::bundle;
use crate::io::config::TesterConfig;
use crate::io::reporter::Reporter;
use crate::io::sandbox::SandboxSettings;
use crate::io::tools::{NetkanOptions, ToolCommand, ToolRunner, Toolchain};

const EMPTY_DESCRIPTION_WARNING: &str =
    "The pull request description is empty, please explain what this change does and why";

/// Run inputs gathered from the environment.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub mode: RunMode,
    /// Pull request description, already fetched when only a URL was given.
    pub pr_body: Option<String>,
    /// Whether this run belongs to a pull request (a description was expected).
    pub pr_run: bool,
    pub github_token: Option<String>,
    /// Checkout of the published metadata, used for diffs and version hints.
    pub diff_meta_root: Option<PathBuf>,
    pub actor: Option<String>,
    pub base_ref: String,
    pub stability: Option<String>,
}

impl RunInputs {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            pr_body: None,
            pr_run: false,
            github_token: None,
            diff_meta_root: None,
            actor: None,
            base_ref: "origin/master".to_string(),
            stability: None,
        }
    }

    fn empty_description(&self) -> bool {
        self.pr_run && self.pr_body.as_deref().is_none_or(|b| b.trim().is_empty())
    }
}

/// Drives one tester run over a repository checkout.
pub struct MetaTester<'a, R: ToolRunner> {
    runner: &'a R,
    config: &'a TesterConfig,
    catalog: &'a Catalog,
    reporter: &'a Reporter,
    tools: Toolchain,
    root: PathBuf,
    state: RunState,
    /// Copies made into the inflated dir this run, and the file they came from.
    inflated: HashMap<PathBuf, PathBuf>,
}

/// Per-run settings every expander and validator call shares.
struct FileOptions<'a> {
    netkan: NetkanOptions<'a>,
    baseline: Option<&'a BaselineRepo>,
    warn_empty_description: bool,
}

impl<'a, R: ToolRunner> MetaTester<'a, R> {
    pub fn new(
        runner: &'a R,
        config: &'a TesterConfig,
        catalog: &'a Catalog,
        reporter: &'a Reporter,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            config,
            catalog,
            reporter,
            tools: Toolchain::from_config(config),
            root: root.into(),
            state: RunState::default(),
            inflated: HashMap::new(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Test every selected file, then install every output. Returns whether
    /// the whole run passed.
    #[instrument(skip_all, fields(mode = ?inputs.mode))]
    pub fn test_metadata(&mut self, inputs: &RunInputs) -> Result<bool> {
        let builds: Vec<String> = self.catalog.versions.iter().map(ToString::to_string).collect();
        debug!(builds = ?builds, "starting metadata test");

        let directives = match PrDirectives::parse(inputs.pr_body.as_deref()) {
            Ok(directives) => directives,
            Err(err) => {
                self.reporter.annotate(&Annotation::run_error(format!(
                    "Pull request description has an invalid compat directive: {err}"
                )));
                self.state.mark_failed();
                PrDirectives::default()
            }
        };
        // Escape hatch in case an author replaces a download after a previous success
        debug!(overwrite_cache = directives.overwrite_cache, "directives parsed");

        let config = self.config;
        for dir in [&config.cache_dir, &config.inflated_dir] {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }

        let change_set = change_set::resolve(
            inputs.mode,
            &self.root,
            &ChangeSetOptions {
                base_ref: &inputs.base_ref,
                actor_is_bot: config.is_bot(inputs.actor.as_deref()),
            },
            self.reporter,
        )?;
        if change_set.policy_failed {
            self.state.mark_failed();
        }

        let baseline = inputs
            .diff_meta_root
            .as_ref()
            .map(|root| BaselineRepo::new(root.clone()));
        let options = FileOptions {
            netkan: NetkanOptions {
                game: Some(self.catalog.game),
                github_token: inputs.github_token.as_deref(),
                cache_dir: Some(&config.cache_dir),
                overwrite_cache: directives.overwrite_cache,
            },
            baseline: baseline.as_ref(),
            warn_empty_description: inputs.empty_description(),
        };
        for file in &change_set.files {
            let ok = self.test_file(file, &options).unwrap_or_else(|err| {
                self.reporter
                    .annotate(&Annotation::error(file, format!("{err:#}")));
                false
            });
            if !self.state.record(ok) {
                error!(file = %file.display(), "test failed");
            }
        }
        if self.state.failed() {
            return Ok(false);
        }

        if self.state.output_count() == 0 && directives.install_batches.is_empty() {
            info!("no compiled files found, done");
            return Ok(true);
        }

        self.build_bundle()?;

        let sandbox = SandboxSettings::from_config(
            config,
            self.catalog.game,
            inputs.stability.as_deref(),
        );
        let check = InstallCheck {
            runner: self.runner,
            tools: &self.tools,
            sandbox: &sandbox,
            catalog: self.catalog,
            directives: &directives,
            baseline: baseline.as_ref(),
            reporter: self.reporter,
        };
        let outputs: Vec<(PathBuf, PathBuf)> = self
            .state
            .compiled_outputs()
            .map(|(source, compiled)| (source.to_path_buf(), compiled.to_path_buf()))
            .collect();
        for (source, compiled) in outputs {
            let ok = match check.install_descriptor(&source, &compiled) {
                Ok(ok) => ok,
                Err(err) => {
                    fatal_to_run(&err)?;
                    self.reporter
                        .annotate(&Annotation::error(&source, format!("{err:#}")));
                    false
                }
            };
            if !self.state.record(ok) {
                error!(file = %compiled.display(), "install failed");
            }
        }
        for batch in &directives.install_batches {
            let ok = match check.install_identifiers(batch) {
                Ok(ok) => ok,
                Err(err) => {
                    fatal_to_run(&err)?;
                    self.reporter
                        .annotate(&Annotation::run_error(format!("{err:#}")));
                    false
                }
            };
            if !self.state.record(ok) {
                error!(batch = ?batch, "install failed");
            }
        }

        Ok(!self.state.failed())
    }

    /// Lint a file, then expand or validate it depending on its kind.
    fn test_file(&mut self, file: &Path, options: &FileOptions<'_>) -> Result<bool> {
        if options.warn_empty_description {
            self.reporter
                .annotate(&Annotation::warning(file, EMPTY_DESCRIPTION_WARNING));
        }
        if !self.lint_file(file)? {
            debug!(file = %file.display(), "lint failed");
            return Ok(false);
        }
        match FileKind::from_path(file) {
            Some(FileKind::Source) => self.inflate_file(file, options),
            Some(FileKind::Compiled) => self.validate_file(file, options),
            None => {
                self.reporter.annotate(&Annotation::error(
                    file,
                    format!("Cannot test {}, must be .netkan or .ckan", file.display()),
                ));
                Ok(false)
            }
        }
    }

    /// Syntax check with the JSON or YAML linter.
    ///
    /// Output is collected; on failure lines with a position become positioned
    /// errors, otherwise the whole output becomes one error.
    #[instrument(skip_all, fields(file = %file.display()))]
    pub fn lint_file(&self, file: &Path) -> Result<bool> {
        let path = self.root.join(file);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => {
                self.reporter
                    .annotate(&Annotation::error(file, format!("Cannot read {}: {err}", file.display())));
                return Ok(false);
            }
        };
        let command = if is_yaml_source(file, &contents) {
            self.tools.yaml_lint(&path)
        } else {
            self.tools.json_lint(&path)
        };

        let mut output = Vec::new();
        let success = self
            .runner
            .run(&command, &mut |line| output.push(line.to_string()))?;
        if success {
            for line in &output {
                self.reporter.line(line);
            }
            return Ok(true);
        }

        let positioned: Vec<Annotation> = output
            .iter()
            .filter_map(|line| Annotation::positioned_error(file, line))
            .collect();
        if positioned.is_empty() {
            self.reporter
                .annotate(&Annotation::error(file, output.join("\n")));
        } else {
            for annotation in &positioned {
                self.reporter.annotate(annotation);
            }
        }
        Ok(false)
    }

    fn inflate_file(&mut self, file: &Path, options: &FileOptions<'_>) -> Result<bool> {
        let _group = self
            .reporter
            .group(&format!("Inflating {}", file.display()));
        let highest = options
            .baseline
            .and_then(|baseline| self.highest_release(baseline, file));
        let output_dir = tempfile::tempdir().context("create expander output dir")?;
        let command = self.tools.inflate(
            &options.netkan,
            output_dir.path(),
            highest.as_deref(),
            &self.root.join(file),
        );
        if !self.run_classified(&command, file)? {
            return Ok(false);
        }

        let produced = collect_compiled(output_dir.path())?;
        if produced.is_empty() {
            info!(file = %file.display(), "expander produced no compiled files");
        }
        let mut copies = Vec::with_capacity(produced.len());
        for path in produced {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            self.reporter.line(&contents);
            let Some(copy) = self.copy_to_inflated(file, &path)? else {
                return Ok(false);
            };
            copies.push(copy);
        }
        self.state.record_outputs(file, copies);
        Ok(true)
    }

    fn validate_file(&mut self, file: &Path, options: &FileOptions<'_>) -> Result<bool> {
        let _group = self
            .reporter
            .group(&format!("Validating {}", file.display()));
        let path = self.root.join(file);
        let command = self.tools.validate(&options.netkan, &path);
        if !self.run_classified(&command, file)? {
            return Ok(false);
        }
        let Some(copy) = self.copy_to_inflated(file, &path)? else {
            return Ok(false);
        };
        self.state.record_outputs(file, vec![copy]);
        Ok(true)
    }

    /// Archive the inflated directory into the local repository bundle.
    pub fn build_bundle(&self) -> Result<()> {
        bundle::build_bundle(&self.config.inflated_dir, &self.config.bundle_path())
    }

    fn highest_release(&self, baseline: &BaselineRepo, file: &Path) -> Option<String> {
        let contents = fs::read_to_string(self.root.join(file)).ok()?;
        let identifier = match source_identifier(&contents) {
            Ok(identifier) => identifier,
            Err(err) => {
                debug!(file = %file.display(), err = %err, "no identifier for version hint");
                return None;
            }
        };
        match baseline.highest_version(&identifier) {
            Ok(highest) => {
                debug!(identifier = %identifier, highest = ?highest, "highest released version");
                highest
            }
            Err(err) => {
                debug!(err = %format!("{err:#}"), "no version hint");
                None
            }
        }
    }

    fn run_classified(&self, command: &ToolCommand, file: &Path) -> Result<bool> {
        let classifier = LineClassifier::default();
        self.runner.run(command, &mut |line| {
            self.reporter.emit(classifier.classify(Some(file), line));
        })
    }

    /// Copy a compiled file produced for `file` into the inflated dir.
    ///
    /// `None` (with an error annotation) when another file already put a copy
    /// under the same name during this run.
    fn copy_to_inflated(&mut self, file: &Path, path: &Path) -> Result<Option<PathBuf>> {
        let name = path
            .file_name()
            .with_context(|| format!("{} has no file name", path.display()))?;
        let dest = self.config.inflated_dir.join(name);
        if let Some(owner) = self.inflated.get(&dest) {
            self.reporter.annotate(&Annotation::error(
                file,
                format!(
                    "{} is also produced by {}",
                    Path::new(name).display(),
                    owner.display()
                ),
            ));
            return Ok(None);
        }
        fs::copy(path, &dest)
            .with_context(|| format!("copy {} to {}", path.display(), dest.display()))?;
        self.inflated.insert(dest.clone(), file.to_path_buf());
        Ok(Some(dest))
    }
}

/// Pass through errors that must stop the whole run.
fn fatal_to_run(err: &anyhow::Error) -> Result<()> {
    match err.downcast_ref::<InstanceRootExists>() {
        Some(collision) => Err(collision.clone().into()),
        None => Ok(()),
    }
}

/// YAML sources are the `.netkan` files that do not start with `{`.
fn is_yaml_source(file: &Path, contents: &str) -> bool {
    FileKind::from_path(file) == Some(FileKind::Source)
        && !contents.trim_start().starts_with('{')
}

/// Compiled files below `dir`, sorted by path.
fn collect_compiled(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
        if entry.file_type().is_file() && FileKind::from_path(entry.path()) == Some(FileKind::Compiled)
        {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}
