//! CLI command implementations

pub mod follow;
pub mod run;

use crate::config::Settings;
use crate::Cli;
use anyhow::{Context, Result};

/// Layered settings with this invocation's flags applied
pub(crate) fn settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load()?;
    settings.apply(&cli.target);
    Ok(settings)
}

pub(crate) async fn kube_client() -> Result<kube::Client> {
    kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")
}
