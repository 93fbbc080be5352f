//! Profile the deployment and deliver the analysis

use anyhow::{Context, Result};
use squirrly_lib::cluster::KubeCluster;
use squirrly_lib::exec::KubeExecutor;
use squirrly_lib::sink::ResultSink;
use squirrly_lib::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::output::{self, print_info, print_success};
use crate::Cli;

/// Per-command exec ceiling; must outlast the analysis request's own limit
const EXEC_TIMEOUT: Duration = Duration::from_secs(180);

pub async fn execute(cli: &Cli) -> Result<u8> {
    let config = super::settings(cli)?.into_orchestrator_config()?;
    let client = super::kube_client().await?;

    let executor = Arc::new(KubeExecutor::new(client.clone()).with_timeout(EXEC_TIMEOUT));
    let cluster = Arc::new(KubeCluster::new(client));
    let orchestrator = Orchestrator::new(config, cluster, executor);

    let delivery = cli.delivery();
    if !delivery.is_stream() {
        print_info("Results will be written when the run finishes");
    }
    let mut sink = ResultSink::stdout(delivery).with_styler(output::style_notice);

    let report = orchestrator
        .run(&mut sink)
        .await
        .context("Failed to write results")?;

    if let Some(path) = sink.finish().context("Failed to write results file")? {
        print_success(&format!("Results written to {}", path.display()));
    }

    let status = report.status();
    info!(status = %status, "Run complete");
    output::print_report(&report, cli.format);
    Ok(status.exit_code())
}
