//! Deliver the log of a pod running squirrly

use anyhow::{Context, Result};
use squirrly_lib::cluster::{KubeCluster, PodOutcome};
use squirrly_lib::sink::{deliver_pod_log, ResultSink};

use crate::output::{self, print_success, print_warning};
use crate::Cli;

pub async fn execute(cli: &Cli, pod: &str) -> Result<u8> {
    let namespace = super::settings(cli)?.namespace;
    let cluster = KubeCluster::new(super::kube_client().await?);

    let mut sink = ResultSink::stdout(cli.delivery()).with_styler(output::style_notice);
    let outcome = deliver_pod_log(&cluster, &namespace, pod, &mut sink)
        .await
        .with_context(|| format!("Failed to deliver log of pod {}/{}", namespace, pod))?;

    if let Some(path) = sink.finish().context("Failed to write results file")? {
        print_success(&format!("Log written to {}", path.display()));
    }

    match outcome {
        PodOutcome::Succeeded => Ok(0),
        PodOutcome::Failed => {
            print_warning(&format!("Pod {}/{} failed", namespace, pod));
            Ok(1)
        }
    }
}
