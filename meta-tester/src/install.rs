//! Installation checks: resolve target game versions, provision a sandbox and
//! drive the package manager's headless prompt.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::annotation::{Annotation, LineClassifier};
use crate::core::descriptor::Descriptor;
use crate::core::directives::PrDirectives;
use crate::core::errors::IncompatibleVersionError;
use crate::core::game::Catalog;
use crate::core::version::GameVersion;
use crate::io::baseline::{BaselineRepo, read_descriptor};
use crate::io::reporter::Reporter;
use crate::io::sandbox::{DummyInstance, SandboxSettings};
use crate::io::scripts::InstallScripts;
use crate::io::tools::{ToolCommand, ToolRunner, Toolchain};

/// Everything an install attempt needs, shared across attempts.
pub struct InstallCheck<'a, R: ToolRunner> {
    pub runner: &'a R,
    pub tools: &'a Toolchain,
    pub sandbox: &'a SandboxSettings,
    pub catalog: &'a Catalog,
    pub directives: &'a PrDirectives,
    pub baseline: Option<&'a BaselineRepo>,
    pub reporter: &'a Reporter,
}

impl<R: ToolRunner> InstallCheck<'_, R> {
    /// Directive versions first, then the descriptor's own compatible versions.
    pub fn resolve_versions(&self, descriptor: Option<&Descriptor>) -> Vec<GameVersion> {
        let mut versions = self.directives.compat_versions.clone();
        if let Some(descriptor) = descriptor {
            versions.extend(descriptor.compatible_versions(self.catalog));
        }
        versions
    }

    /// Install one compiled output; problems are annotated against `source`.
    #[instrument(skip_all, fields(source = %source.display(), compiled = %compiled.display()))]
    pub fn install_descriptor(&self, source: &Path, compiled: &Path) -> Result<bool> {
        let descriptor = match read_descriptor(compiled) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                self.reporter
                    .annotate(&Annotation::error(source, format!("{err:#}")));
                return Ok(false);
            }
        };
        self.print_diff(&descriptor);

        let _group = self
            .reporter
            .group(&format!("Installing {} {}", descriptor.name, descriptor.version));
        let versions = self.resolve_versions(Some(&descriptor));
        let Some((primary, additional)) = versions.split_last() else {
            let err = IncompatibleVersionError {
                subject: compiled.display().to_string(),
            };
            self.reporter.annotate(&Annotation::error(source, err.to_string()));
            return Ok(false);
        };

        let script = InstallScripts::new()?.install_ckan(compiled, &descriptor.identifier)?;
        self.run_in_sandbox(primary, additional, script, Some(source))
    }

    /// Install a batch of `identifier[=version]` tokens from a directive.
    #[instrument(skip_all, fields(batch = ?batch))]
    pub fn install_identifiers(&self, batch: &[String]) -> Result<bool> {
        let joined = batch.join(" ");
        let _group = self.reporter.group(&format!("Installing {joined}"));
        let versions = self.resolve_versions(None);
        let Some((primary, additional)) = versions.split_last() else {
            let err = IncompatibleVersionError { subject: joined };
            self.reporter.annotate(&Annotation::run_error(err.to_string()));
            return Ok(false);
        };

        let script = InstallScripts::new()?.install_identifiers(batch)?;
        self.run_in_sandbox(primary, additional, script, None)
    }

    fn run_in_sandbox(
        &self,
        primary: &GameVersion,
        additional: &[GameVersion],
        script: String,
        file: Option<&Path>,
    ) -> Result<bool> {
        let instance = DummyInstance::create(self.runner, self.tools, self.sandbox, primary, additional)?;
        debug!(root = %instance.root().display(), "running install prompt");
        let command: ToolCommand = self.tools.ckan(["prompt", "--headless"]).stdin(script);
        let classifier = LineClassifier::default();
        let success = self.runner.run(&command, &mut |line| {
            self.reporter.emit(classifier.classify(file, line));
        })?;
        if success {
            info!("install succeeded");
        } else {
            warn!("install failed");
        }
        Ok(success)
    }

    /// Print the change against the published release of the same version.
    /// Purely informational.
    fn print_diff(&self, descriptor: &Descriptor) {
        let Some(baseline) = self.baseline else {
            return;
        };
        let releases = match baseline.releases(&descriptor.identifier) {
            Ok(releases) => releases,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed to read baseline releases");
                return;
            }
        };
        let Some(diff) = descriptor.diff_against(&releases) else {
            debug!(identifier = %descriptor.identifier, "no baseline to diff against");
            return;
        };
        let _group = self
            .reporter
            .group(&format!("Diffing {} {}", descriptor.name, descriptor.version));
        self.reporter.raw(&diff);
        if !diff.is_empty() && !diff.ends_with('\n') {
            self.reporter.raw("\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::*;
    use crate::core::game::Game;
    use crate::io::config::TesterConfig;
    use crate::test_support::{ScriptedReply, ScriptedRunner, fixture_catalog};

    const COUNTDOWN: &str = r#"{
    "spec_version": "v1.4",
    "identifier": "NASA-CountDown",
    "name": "NASA CountDown Clock",
    "version": "1.3.9.1",
    "ksp_version_min": "1.8",
    "ksp_version_max": "1.10"
}
"#;

    struct Fixture {
        temp: tempfile::TempDir,
        tools: Toolchain,
        settings: SandboxSettings,
        catalog: Catalog,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = TesterConfig {
            launcher: Vec::new(),
            ckan_exe: PathBuf::from("ckan"),
            instance_dir: temp.path().join("game-instance"),
            cache_dir: temp.path().join("cache"),
            repo_dir: temp.path().join("repo"),
            saved_registry: temp.path().join("registry.json"),
            ..TesterConfig::default()
        };
        fs::create_dir_all(&config.cache_dir).expect("cache");
        Fixture {
            tools: Toolchain::from_config(&config),
            settings: SandboxSettings::from_config(&config, Game::Ksp1, None),
            catalog: fixture_catalog(),
            temp,
        }
    }

    impl Fixture {
        fn check<'a>(
            &'a self,
            runner: &'a ScriptedRunner,
            directives: &'a PrDirectives,
            baseline: Option<&'a BaselineRepo>,
            reporter: &'a Reporter,
        ) -> InstallCheck<'a, ScriptedRunner> {
            InstallCheck {
                runner,
                tools: &self.tools,
                sandbox: &self.settings,
                catalog: &self.catalog,
                directives,
                baseline,
                reporter,
            }
        }

        fn write(&self, rel: &str, contents: &str) -> PathBuf {
            let path = self.temp.path().join(rel);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(&path, contents).expect("write");
            path
        }
    }

    #[test]
    fn installs_into_sandbox_pinned_to_last_version() {
        let fx = fixture();
        let compiled = fx.write("ckans/NASA-CountDown-1.3.9.1.ckan", COUNTDOWN);
        let runner = ScriptedRunner::new(|cmd| {
            if cmd.has_args(&["prompt", "--headless"]) {
                ScriptedReply::ok_with(["Installing NASA-CountDown", "1 [1] WARN CKAN - slow mirror"])
            } else {
                ScriptedReply::ok()
            }
        });
        let directives = PrDirectives::default();
        let (reporter, captured) = Reporter::capture();

        let ok = fx
            .check(&runner, &directives, None, &reporter)
            .install_descriptor(Path::new("NetKAN/NASA-CountDown.netkan"), &compiled)
            .expect("install");

        assert!(ok);
        let fake = &runner.calls()[0];
        assert!(fake.has_args(&["instance", "fake"]));
        assert!(fake.has_args(&["1.10.1"]));
        for version in ["1.8.0", "1.8.1", "1.9.0", "1.9.1", "1.10.0"] {
            assert_eq!(runner.count_matching(&["compat", "add", version]), 1, "{version}");
        }
        let prompt = runner
            .calls()
            .into_iter()
            .find(|c| c.has_args(&["prompt", "--headless"]))
            .expect("prompt call");
        let script = prompt.stdin.expect("script on stdin");
        assert!(script.contains(&format!("install --headless -c {}", compiled.display())));
        assert!(script.contains("show NASA-CountDown"));
        assert_eq!(
            captured.lines(),
            [
                "::group::Installing NASA CountDown Clock 1.3.9.1",
                "Installing NASA-CountDown",
                "::warning file=NetKAN/NASA-CountDown.netkan::1 [1] WARN CKAN - slow mirror",
                "::endgroup::",
            ]
        );
        assert!(!fx.settings.root.exists());
    }

    #[test]
    fn directive_versions_come_first() {
        let fx = fixture();
        let runner = ScriptedRunner::succeeding();
        let directives = PrDirectives::parse(Some("ckan compat add 1.7.3")).expect("directives");
        let (reporter, _captured) = Reporter::capture();
        let descriptor = Descriptor::parse(COUNTDOWN).expect("descriptor");

        let versions: Vec<String> = fx
            .check(&runner, &directives, None, &reporter)
            .resolve_versions(Some(&descriptor))
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            versions,
            ["1.7.3", "1.8.0", "1.8.1", "1.9.0", "1.9.1", "1.10.0", "1.10.1"]
        );
    }

    #[test]
    fn no_compatible_versions_fails_without_sandbox() {
        let fx = fixture();
        let compiled = fx.write(
            "ckans/Old-1.0.ckan",
            r#"{"identifier": "Old", "version": "1.0", "ksp_version": "1.3"}"#,
        );
        let runner = ScriptedRunner::succeeding();
        let directives = PrDirectives::default();
        let (reporter, captured) = Reporter::capture();

        let ok = fx
            .check(&runner, &directives, None, &reporter)
            .install_descriptor(Path::new("NetKAN/Old.netkan"), &compiled)
            .expect("install");

        assert!(!ok);
        assert!(runner.calls().is_empty());
        assert!(!fx.settings.root.exists());
        assert!(captured.contents().contains(&format!(
            "::error file=NetKAN/Old.netkan::{} is not compatible with any game versions!",
            compiled.display()
        )));
    }

    #[test]
    fn failed_install_still_tears_down() {
        let fx = fixture();
        let compiled = fx.write("ckans/NASA-CountDown-1.3.9.1.ckan", COUNTDOWN);
        let runner = ScriptedRunner::new(|cmd| {
            if cmd.has_args(&["prompt"]) {
                ScriptedReply::fail(["5 [1] ERROR CKAN - dependency missing"])
            } else {
                ScriptedReply::ok()
            }
        });
        let directives = PrDirectives::default();
        let (reporter, captured) = Reporter::capture();

        let ok = fx
            .check(&runner, &directives, None, &reporter)
            .install_descriptor(Path::new("NetKAN/NASA-CountDown.netkan"), &compiled)
            .expect("install");

        assert!(!ok);
        assert_eq!(runner.count_matching(&["instance", "forget", "dummy"]), 1);
        assert!(!fx.settings.root.exists());
        assert!(captured.contents().contains(
            "::error file=NetKAN/NASA-CountDown.netkan::5 [1] ERROR CKAN - dependency missing"
        ));
    }

    #[test]
    fn prints_diff_against_matching_release() {
        let fx = fixture();
        let compiled = fx.write("ckans/NASA-CountDown-1.3.9.1.ckan", COUNTDOWN);
        fx.write(
            "meta/NASA-CountDown/NASA-CountDown-1.3.9.1.ckan",
            &COUNTDOWN.replace("\"1.10\"", "\"1.9\""),
        );
        let baseline = BaselineRepo::new(fx.temp.path().join("meta"));
        let runner = ScriptedRunner::succeeding();
        let directives = PrDirectives::default();
        let (reporter, captured) = Reporter::capture();

        fx.check(&runner, &directives, Some(&baseline), &reporter)
            .install_descriptor(Path::new("NetKAN/NASA-CountDown.netkan"), &compiled)
            .expect("install");

        let lines = captured.lines();
        assert_eq!(lines[0], "::group::Diffing NASA CountDown Clock 1.3.9.1");
        assert!(lines.contains(&"--- Previous NASA CountDown Clock 1.3.9.1".to_string()));
        assert!(lines.contains(&"+++ New NASA CountDown Clock 1.3.9.1".to_string()));
        assert!(lines.contains(&"-    \"ksp_version_max\": \"1.9\"".to_string()));
        assert!(lines.contains(&"+    \"ksp_version_max\": \"1.10\"".to_string()));
        let end = lines.iter().position(|l| l == "::endgroup::").expect("diff group closed");
        assert_eq!(lines[end + 1], "::group::Installing NASA CountDown Clock 1.3.9.1");
    }

    #[test]
    fn identifier_batch_needs_directive_versions() {
        let fx = fixture();
        let runner = ScriptedRunner::succeeding();
        let directives = PrDirectives::default();
        let (reporter, captured) = Reporter::capture();
        let batch = vec!["Astrogator".to_string(), "ModuleManager=4.2.1".to_string()];

        let ok = fx
            .check(&runner, &directives, None, &reporter)
            .install_identifiers(&batch)
            .expect("install");
        assert!(!ok);
        assert!(runner.calls().is_empty());
        assert!(captured.contents().contains(
            "::error::Astrogator ModuleManager=4.2.1 is not compatible with any game versions!"
        ));

        let directives = PrDirectives::parse(Some("ckan compat add 1.12")).expect("directives");
        let ok = fx
            .check(&runner, &directives, None, &reporter)
            .install_identifiers(&batch)
            .expect("install");
        assert!(ok);
        let prompt = runner
            .calls()
            .into_iter()
            .find(|c| c.has_args(&["prompt"]))
            .expect("prompt");
        assert_eq!(
            prompt.stdin.as_deref(),
            Some("install --headless Astrogator ModuleManager=4.2.1\nlist\n")
        );
    }
}
