//! Whole-run tests: file selection, lint, expansion, validation, bundling and
//! installs, driven through a scripted tool runner.

use std::fs;
use std::path::{Path, PathBuf};

use meta_tester::core::errors::InstanceRootExists;
use meta_tester::core::types::RunMode;
use meta_tester::io::config::TesterConfig;
use meta_tester::io::reporter::Reporter;
use meta_tester::io::tools::ToolCommand;
use meta_tester::pipeline::{MetaTester, RunInputs};
use meta_tester::test_support::{ScriptedReply, ScriptedRunner, TestRepo, fixture_catalog};

const FOO_NETKAN: &str = r##"{
    "spec_version": "v1.4",
    "identifier": "Foo",
    "$kref": "#/ckan/github/author/Foo",
    "ksp_version": "1.9"
}
"##;

const FOO_CKAN: &str = r#"{
    "spec_version": "v1.4",
    "identifier": "Foo",
    "version": "1.0",
    "ksp_version": "1.9"
}
"#;

const BAR_CKAN: &str = r#"{
    "spec_version": "v1.4",
    "identifier": "Bar",
    "version": "2.0",
    "ksp_version_min": "1.8",
    "ksp_version_max": "1.8"
}
"#;

struct Workspace {
    _temp: tempfile::TempDir,
    checkout: PathBuf,
    config: TesterConfig,
}

fn workspace() -> Workspace {
    let temp = tempfile::tempdir().expect("tempdir");
    let checkout = temp.path().join("checkout");
    let work = temp.path().join("work");
    fs::create_dir_all(&checkout).expect("checkout");
    let config = TesterConfig {
        launcher: Vec::new(),
        netkan_exe: PathBuf::from("netkan"),
        ckan_exe: PathBuf::from("ckan"),
        inflated_dir: work.join("ckans"),
        cache_dir: work.join("cache"),
        repo_dir: work.join("repo"),
        instance_dir: work.join("game-instance"),
        saved_registry: work.join("registry.json"),
        ..TesterConfig::default()
    };
    Workspace {
        _temp: temp,
        checkout,
        config,
    }
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, contents).expect("write");
}

/// Every tool succeeds; the expander writes `Foo-1.0.ckan` into its output dir.
fn expanding_runner() -> ScriptedRunner {
    ScriptedRunner::new(|cmd: &ToolCommand| {
        if let Some(out) = cmd.flag_value("--outputdir") {
            fs::write(Path::new(out).join("Foo-1.0.ckan"), FOO_CKAN).expect("expander output");
        }
        ScriptedReply::ok()
    })
}

fn is_lint(cmd: &ToolCommand) -> bool {
    cmd.program == "jsonlint" || cmd.program == "yamllint"
}

#[test]
fn full_scan_expands_validates_and_installs_everything() {
    let ws = workspace();
    write(&ws.checkout, "NetKAN/Foo.netkan", FOO_NETKAN);
    write(&ws.checkout, "Bar/Bar-2.0.ckan", BAR_CKAN);
    let runner = expanding_runner();
    let catalog = fixture_catalog();
    let (reporter, captured) = Reporter::capture();

    let mut tester = MetaTester::new(&runner, &ws.config, &catalog, &reporter, &ws.checkout);
    let ok = tester
        .test_metadata(&RunInputs::new(RunMode::FullScan))
        .expect("run");

    assert!(ok, "{}", captured.contents());
    assert_eq!(tester.state().output_count(), 2);
    assert!(ws.config.inflated_dir.join("Foo-1.0.ckan").exists());
    assert!(ws.config.inflated_dir.join("Bar-2.0.ckan").exists());
    assert!(ws.config.bundle_path().exists());
    assert!(!ws.config.instance_dir.exists());

    let calls = runner.calls();
    assert_eq!(calls.iter().filter(|c| is_lint(c)).count(), 2);
    let inflate = calls
        .iter()
        .find(|c| c.has_args(&["--outputdir"]))
        .expect("expander call");
    assert!(inflate.has_args(&["--game", "KSP"]));
    assert!(!inflate.has_args(&["--overwrite-cache"]));
    assert_eq!(runner.count_matching(&["--validate-ckan"]), 1);
    assert_eq!(runner.count_matching(&["instance", "fake"]), 2);
    assert_eq!(runner.count_matching(&["prompt", "--headless"]), 2);
    assert_eq!(runner.count_matching(&["instance", "forget", "dummy"]), 2);

    // Installs only start after every file passed its checks
    let first_install = calls
        .iter()
        .position(|c| c.has_args(&["instance", "fake"]))
        .expect("install");
    let last_check = calls
        .iter()
        .rposition(|c| is_lint(c) || c.has_args(&["--validate-ckan"]) || c.has_args(&["--outputdir"]))
        .expect("check");
    assert!(last_check < first_install);

    let out = captured.contents();
    assert!(out.contains("::group::Inflating NetKAN/Foo.netkan"));
    assert!(out.contains("::group::Validating Bar/Bar-2.0.ckan"));
    assert!(out.contains("::group::Installing Foo 1.0"));
    assert!(out.contains("::group::Installing Bar 2.0"));
}

#[test]
fn lint_failure_fails_run_but_other_files_are_still_checked() {
    let ws = workspace();
    write(&ws.checkout, "NetKAN/Foo.netkan", "{\n  \"identifier\": \"Foo\",\n");
    write(&ws.checkout, "Bar/Bar-2.0.ckan", BAR_CKAN);
    let runner = ScriptedRunner::new(|cmd: &ToolCommand| {
        if cmd.program == "jsonlint" && cmd.args.last().is_some_and(|a| a.ends_with("Foo.netkan")) {
            ScriptedReply::fail(["Error: Parse error on line 3:", "...\"Foo\",", "Expecting 'STRING'"])
        } else {
            ScriptedReply::ok()
        }
    });
    let catalog = fixture_catalog();
    let (reporter, captured) = Reporter::capture();

    let mut tester = MetaTester::new(&runner, &ws.config, &catalog, &reporter, &ws.checkout);
    let ok = tester
        .test_metadata(&RunInputs::new(RunMode::FullScan))
        .expect("run");

    assert!(!ok);
    assert!(captured.contents().contains(
        "::error file=NetKAN/Foo.netkan::Error: Parse error on line 3:%0A...\"Foo\",%0AExpecting 'STRING'"
    ));
    assert_eq!(runner.count_matching(&["--outputdir"]), 0);
    assert_eq!(runner.count_matching(&["--validate-ckan"]), 1);
    assert_eq!(runner.count_matching(&["instance", "fake"]), 0);
    assert!(!ws.config.bundle_path().exists());
}

#[test]
fn yaml_sources_use_the_yaml_linter_with_positions() {
    let ws = workspace();
    write(&ws.checkout, "NetKAN/Foo.netkan", "identifier: Foo\n  bad: indent\n");
    let runner = ScriptedRunner::new(|cmd: &ToolCommand| {
        if cmd.program == "yamllint" {
            ScriptedReply::fail(["NetKAN/Foo.netkan:2:6: [error] mapping values are not allowed here (syntax)"])
        } else {
            ScriptedReply::ok()
        }
    });
    let catalog = fixture_catalog();
    let (reporter, captured) = Reporter::capture();

    let mut tester = MetaTester::new(&runner, &ws.config, &catalog, &reporter, &ws.checkout);
    assert!(!tester.test_metadata(&RunInputs::new(RunMode::FullScan)).expect("run"));
    assert!(captured.contents().contains(
        "::error file=NetKAN/Foo.netkan,line=2,col=6::[error] mapping values are not allowed here (syntax)"
    ));
}

#[test]
fn nothing_selected_succeeds_without_tools() {
    let ws = workspace();
    write(&ws.checkout, "README.md", "nothing to see");
    let runner = ScriptedRunner::succeeding();
    let catalog = fixture_catalog();
    let (reporter, _captured) = Reporter::capture();

    let mut tester = MetaTester::new(&runner, &ws.config, &catalog, &reporter, &ws.checkout);
    assert!(tester.test_metadata(&RunInputs::new(RunMode::FullScan)).expect("run"));
    assert!(runner.calls().is_empty());
    assert!(!ws.config.bundle_path().exists());
}

#[test]
fn pull_request_directives_drive_cache_and_batch_installs() {
    let ws = workspace();
    write(&ws.checkout, "NetKAN/Foo.netkan", FOO_NETKAN);
    let runner = expanding_runner();
    let catalog = fixture_catalog();
    let (reporter, captured) = Reporter::capture();
    let inputs = RunInputs {
        pr_run: true,
        pr_body: Some(
            "Adds Foo #overwrite_cache\nckan compat add 1.7.3\nckan install Astrogator ModuleManager=4.2.1"
                .to_string(),
        ),
        github_token: Some("secret".to_string()),
        ..RunInputs::new(RunMode::FullScan)
    };

    let mut tester = MetaTester::new(&runner, &ws.config, &catalog, &reporter, &ws.checkout);
    assert!(tester.test_metadata(&inputs).expect("run"), "{}", captured.contents());

    let inflate = runner
        .calls()
        .into_iter()
        .find(|c| c.has_args(&["--outputdir"]))
        .expect("expander call");
    assert!(inflate.has_args(&["--github-token", "secret"]));
    assert!(inflate.has_args(&["--overwrite-cache"]));
    // Foo targets 1.9: the directive version comes first, the catalog match is
    // primary. The batch install only has the directive version, as primary.
    assert_eq!(runner.count_matching(&["compat", "add", "1.7.3"]), 1);
    assert_eq!(runner.count_matching(&["compat", "add", "1.9.0"]), 1);
    let batch_prompt = runner
        .calls()
        .into_iter()
        .rev()
        .find(|c| c.has_args(&["prompt"]))
        .expect("batch prompt");
    assert_eq!(
        batch_prompt.stdin.as_deref(),
        Some("install --headless Astrogator ModuleManager=4.2.1\nlist\n")
    );
    assert!(!captured.contents().contains("description is empty"));
}

#[test]
fn empty_description_warns_for_every_file() {
    let ws = workspace();
    write(&ws.checkout, "Bar/Bar-2.0.ckan", BAR_CKAN);
    write(&ws.checkout, "Baz/Baz-2.0.ckan", &BAR_CKAN.replace("Bar", "Baz"));
    let runner = ScriptedRunner::succeeding();
    let catalog = fixture_catalog();
    let (reporter, captured) = Reporter::capture();
    let inputs = RunInputs {
        pr_run: true,
        pr_body: Some(String::new()),
        ..RunInputs::new(RunMode::FullScan)
    };

    let mut tester = MetaTester::new(&runner, &ws.config, &catalog, &reporter, &ws.checkout);
    assert!(tester.test_metadata(&inputs).expect("run"));
    let warnings = captured
        .lines()
        .into_iter()
        .filter(|l| l.starts_with("::warning") && l.contains("description is empty"))
        .count();
    assert_eq!(warnings, 2);
}

#[test]
fn incremental_run_rejects_misplaced_file_and_tests_the_rest() {
    let repo = TestRepo::new().expect("repo");
    let base = repo.git().rev_parse("HEAD").expect("base");
    repo.write("NetKAN/Foo.netkan", FOO_NETKAN).expect("write");
    repo.write("Elsewhere/Foo.netkan", FOO_NETKAN).expect("write");
    repo.commit("add Foo twice").expect("commit");

    let ws = workspace();
    let runner = expanding_runner();
    let catalog = fixture_catalog();
    let (reporter, captured) = Reporter::capture();
    let inputs = RunInputs {
        base_ref: base,
        actor: Some("netkan-bot".to_string()),
        ..RunInputs::new(RunMode::Incremental)
    };

    let mut tester = MetaTester::new(&runner, &ws.config, &catalog, &reporter, repo.path());
    let ok = tester.test_metadata(&inputs).expect("run");

    assert!(!ok);
    assert!(captured.contents().contains(
        "::error file=Elsewhere/Foo.netkan::Elsewhere/Foo.netkan should be in the NetKAN folder"
    ));
    assert_eq!(runner.count_matching(&["--outputdir"]), 1);
    assert_eq!(runner.count_matching(&["instance", "fake"]), 0);
}

#[test]
fn unreadable_expander_output_fails_that_file_only() {
    let ws = workspace();
    write(&ws.checkout, "NetKAN/A.netkan", FOO_NETKAN);
    write(&ws.checkout, "NetKAN/B.netkan", FOO_NETKAN);
    let runner = ScriptedRunner::new(|cmd: &ToolCommand| {
        if let Some(out) = cmd.flag_value("--outputdir") {
            let out = Path::new(out);
            if cmd.args.last().is_some_and(|a| a.ends_with("A.netkan")) {
                fs::write(out.join("X-1.ckan"), [0xff, 0xfe, 0x7b]).expect("expander output");
            } else {
                fs::write(out.join("Foo-1.0.ckan"), FOO_CKAN).expect("expander output");
            }
        }
        ScriptedReply::ok()
    });
    let catalog = fixture_catalog();
    let (reporter, captured) = Reporter::capture();

    let mut tester = MetaTester::new(&runner, &ws.config, &catalog, &reporter, &ws.checkout);
    let ok = tester
        .test_metadata(&RunInputs::new(RunMode::FullScan))
        .expect("run keeps going");

    assert!(!ok);
    assert_eq!(runner.count_matching(&["--outputdir"]), 2);
    assert!(ws.config.inflated_dir.join("Foo-1.0.ckan").exists());
    assert_eq!(runner.count_matching(&["instance", "fake"]), 0);
    let out = captured.contents();
    assert!(out.contains("::error file=NetKAN/A.netkan::read "), "{out}");
    assert!(out.contains("stream did not contain valid UTF-8"), "{out}");
}

#[test]
fn two_files_producing_the_same_output_name_fail() {
    let ws = workspace();
    write(&ws.checkout, "NetKAN/Foo.netkan", FOO_NETKAN);
    write(&ws.checkout, "Foo/Foo-1.0.ckan", FOO_CKAN);
    let runner = expanding_runner();
    let catalog = fixture_catalog();
    let (reporter, captured) = Reporter::capture();

    let mut tester = MetaTester::new(&runner, &ws.config, &catalog, &reporter, &ws.checkout);
    assert!(!tester.test_metadata(&RunInputs::new(RunMode::FullScan)).expect("run"));

    let out = captured.contents();
    assert!(out.contains("Foo-1.0.ckan is also produced by "), "{out}");
    assert_eq!(tester.state().output_count(), 1);
    assert_eq!(runner.count_matching(&["instance", "fake"]), 0);
}

#[test]
fn occupied_instance_dir_aborts_the_run() {
    let ws = workspace();
    write(&ws.checkout, "Bar/Bar-2.0.ckan", BAR_CKAN);
    fs::create_dir_all(&ws.config.instance_dir).expect("occupied");
    let runner = ScriptedRunner::succeeding();
    let catalog = fixture_catalog();
    let (reporter, _captured) = Reporter::capture();

    let mut tester = MetaTester::new(&runner, &ws.config, &catalog, &reporter, &ws.checkout);
    let err = tester
        .test_metadata(&RunInputs::new(RunMode::FullScan))
        .unwrap_err();
    assert!(err.downcast_ref::<InstanceRootExists>().is_some());
    assert_eq!(runner.count_matching(&["prompt", "--headless"]), 0);
}
