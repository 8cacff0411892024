//! Scripts fed to the package manager's headless prompt.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const INSTALL_CKAN_TEMPLATE: &str = include_str!("scripts/install_ckan.txt");
const INSTALL_IDENTIFIERS_TEMPLATE: &str = include_str!("scripts/install_identifiers.txt");

/// Template engine wrapper around minijinja.
pub struct InstallScripts {
    env: Environment<'static>,
}

impl InstallScripts {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.add_template("install_ckan", INSTALL_CKAN_TEMPLATE)
            .context("install_ckan template")?;
        env.add_template("install_identifiers", INSTALL_IDENTIFIERS_TEMPLATE)
            .context("install_identifiers template")?;
        Ok(Self { env })
    }

    /// Install one compiled file from disk.
    pub fn install_ckan(&self, ckan_file: &Path, identifier: &str) -> Result<String> {
        let template = self.env.get_template("install_ckan")?;
        Ok(template.render(context! {
            ckanfile => ckan_file.to_string_lossy(),
            identifier => identifier,
        })?)
    }

    /// Install a batch of `identifier[=version]` tokens from the repositories.
    pub fn install_identifiers(&self, identifiers: &[String]) -> Result<String> {
        let template = self.env.get_template("install_identifiers")?;
        Ok(template.render(context! { identifiers => identifiers })?)
    }
}
