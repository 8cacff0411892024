//! Pull request description lookup through the GitHub REST API.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, instrument};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct PullRequest {
    body: Option<String>,
}

/// Fetch the description of the pull request at `url` (an API URL).
///
/// A pull request without a description yields an empty string.
#[instrument(skip(token))]
pub fn fetch_pull_request_body(url: &str, token: Option<&str>) -> Result<String> {
    let client = http_client()?;
    let mut request = client
        .get(url)
        .header(ACCEPT, "application/vnd.github+json")
        .header(USER_AGENT, "ckan-meta-tester");
    if let Some(token) = token {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let pull: PullRequest = request
        .send()
        .with_context(|| format!("fetch {url}"))?
        .error_for_status()
        .with_context(|| format!("fetch {url}"))?
        .json()
        .with_context(|| format!("parse pull request from {url}"))?;
    let body = pull.body.unwrap_or_default();
    debug!(len = body.len(), "fetched pull request body");
    Ok(body)
}

pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("build http client")
}
