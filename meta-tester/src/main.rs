//! `ckan-meta-tester`: test the metadata touched by a pull request (or the
//! whole repository) and report through GitHub Actions annotations.
//!
//! All inputs come from the environment the Action sets up; every one can
//! also be passed as a flag.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use meta_tester::change_set::select_base_ref;
use meta_tester::core::game::Game;
use meta_tester::core::types::RunMode;
use meta_tester::exit_codes;
use meta_tester::io::catalog::load_catalog;
use meta_tester::io::config::load_config;
use meta_tester::io::github::fetch_pull_request_body;
use meta_tester::io::reporter::Reporter;
use meta_tester::io::tools::SystemRunner;
use meta_tester::logging;
use meta_tester::pipeline::{MetaTester, RunInputs};

#[derive(Parser)]
#[command(
    name = "ckan-meta-tester",
    version,
    about = "Lint, expand and test-install CKAN metadata"
)]
struct Cli {
    /// Which files to test: every metadata file, or those changed since the base ref.
    #[arg(long, env = "INPUT_SOURCE", value_enum, default_value = "netkans")]
    source: RunMode,

    /// Pull request description holding optional directives.
    #[arg(long, env = "INPUT_PULL_REQUEST_BODY")]
    pull_request_body: Option<String>,

    /// API URL of the pull request; its description is fetched when no body is given.
    #[arg(long, env = "INPUT_PULL_REQUEST_URL")]
    pull_request_url: Option<String>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Game id: KSP or KSP2.
    #[arg(long, env = "INPUT_GAME", default_value = "KSP")]
    game: String,

    /// Checkout of the published metadata repository, for diffs.
    #[arg(long, env = "INPUT_DIFF_META_ROOT")]
    diff_meta_root: Option<PathBuf>,

    #[arg(long, env = "INPUT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Who triggered the run.
    #[arg(long, env = "GITHUB_ACTOR")]
    actor: Option<String>,

    /// Stability tolerance for the test instances (stable, testing, development).
    #[arg(long, env = "INPUT_STABILITY_TOLERANCE")]
    stability: Option<String>,

    /// TOML file overriding tool paths and directories.
    #[arg(long, env = "INPUT_CONFIG")]
    config: Option<PathBuf>,
}

fn main() {
    let code = match run() {
        Ok(true) => exit_codes::OK,
        Ok(false) => exit_codes::FAILED,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::for_error(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<bool> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    // Action inputs are '' rather than unset when not provided
    let pr_body = non_empty(cli.pull_request_body);
    let pr_url = non_empty(cli.pull_request_url);
    let github_token = non_empty(cli.github_token);
    let diff_meta_root = non_empty_path(cli.diff_meta_root);

    let config = load_config(non_empty_path(cli.config).as_deref())?;
    let game = Game::from_id(cli.game.trim())?;

    let pr_body = match (pr_body, &pr_url) {
        (None, Some(url)) => match fetch_pull_request_body(url, github_token.as_deref()) {
            Ok(body) => Some(body),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "could not fetch pull request description");
                None
            }
        },
        (body, _) => body,
    };

    let catalog = load_catalog(game).context("load game versions")?;
    let base_ref = select_base_ref(
        &config.base_ref_vars,
        |name| env::var(name).ok(),
        &config.default_base_ref,
    );
    debug!(base_ref = %base_ref, "base ref");

    let inputs = RunInputs {
        mode: cli.source,
        pr_body,
        pr_run: pr_url.is_some(),
        github_token,
        diff_meta_root,
        actor: non_empty(cli.actor),
        base_ref,
        stability: non_empty(cli.stability),
    };
    let root = env::current_dir().context("resolve working directory")?;
    let reporter = Reporter::stdout();
    let runner = SystemRunner;
    let mut tester = MetaTester::new(&runner, &config, &catalog, &reporter, root);
    let passed = tester.test_metadata(&inputs)?;
    info!(passed, "metadata test finished");
    Ok(passed)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty_path(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|p| !p.as_os_str().is_empty())
}
