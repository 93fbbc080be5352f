//! Scripted fakes for the cluster seams
//!
//! `ScriptedExecutor` answers remote commands from registered rules and
//! records every invocation; `FakeCluster` serves deployments, labelled pods,
//! services and pod logs from memory.

use crate::cluster::{ClusterQuery, LogSource, PodOutcome};
use crate::error::{ExecError, Result};
use crate::exec::{ExecOutput, RemoteExecutor};
use crate::models::{Deployment, ProcessTarget};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A command observed by [`ScriptedExecutor`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub target: ProcessTarget,
    pub command: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

impl RecordedCall {
    pub fn joined(&self) -> String {
        self.command.join(" ")
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Output(ExecOutput),
    Transport(String),
}

struct Rule {
    pod: Option<String>,
    pattern: String,
    /// The last reply repeats once the queue is down to one entry
    replies: VecDeque<Reply>,
}

/// Remote executor answering from rules matched against the joined argv.
///
/// Rules are checked in registration order; the first rule whose pattern is
/// a substring of the command (and whose pod matches, when set) answers.
/// Unmatched commands exit with code 127.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, pod: Option<&str>, pattern: &str, replies: Vec<Reply>) {
        self.rules.lock().unwrap().push(Rule {
            pod: pod.map(str::to_string),
            pattern: pattern.to_string(),
            replies: replies.into(),
        });
    }

    /// Answer every command containing `pattern`
    pub fn on(&self, pattern: &str, output: ExecOutput) {
        self.push(None, pattern, vec![Reply::Output(output)]);
    }

    /// Answer commands containing `pattern` that run on `pod`
    pub fn on_pod(&self, pod: &str, pattern: &str, output: ExecOutput) {
        self.push(Some(pod), pattern, vec![Reply::Output(output)]);
    }

    /// Answer successive matching commands from `outputs`, repeating the last
    pub fn on_sequence(&self, pod: Option<&str>, pattern: &str, outputs: Vec<ExecOutput>) {
        self.push(pod, pattern, outputs.into_iter().map(Reply::Output).collect());
    }

    /// Fail matching commands as if the pod could not be reached
    pub fn fail_transport(&self, pattern: &str, reason: &str) {
        self.push(None, pattern, vec![Reply::Transport(reason.to_string())]);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls whose joined argv contains `pattern`
    pub fn calls_matching(&self, pattern: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.joined().contains(pattern))
            .collect()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        target: &ProcessTarget,
        command: &[String],
        stdin: Option<&[u8]>,
    ) -> std::result::Result<ExecOutput, ExecError> {
        let call = RecordedCall {
            target: target.clone(),
            command: command.to_vec(),
            stdin: stdin.map(<[u8]>::to_vec),
        };
        let joined = call.joined();
        self.calls.lock().unwrap().push(call);

        let reply = {
            let mut rules = self.rules.lock().unwrap();
            rules
                .iter_mut()
                .find(|rule| {
                    joined.contains(&rule.pattern)
                        && rule.pod.as_deref().map_or(true, |pod| pod == target.pod)
                })
                .and_then(|rule| {
                    if rule.replies.len() > 1 {
                        rule.replies.pop_front()
                    } else {
                        rule.replies.front().cloned()
                    }
                })
        };

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Transport(reason)) => Err(ExecError::Transport {
                target: target.to_string(),
                reason,
            }),
            None => Ok(ExecOutput::failure(127, format!("no scripted reply: {}", joined))),
        }
    }
}

/// In-memory cluster
#[derive(Default)]
pub struct FakeCluster {
    deployments: HashSet<(String, String)>,
    pods: HashMap<(String, String), Vec<String>>,
    services: HashSet<(String, String)>,
    logs: HashMap<String, (Vec<String>, PodOutcome)>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deployment(mut self, deployment: &Deployment) -> Self {
        self.deployments
            .insert((deployment.namespace.clone(), deployment.name.clone()));
        self
    }

    pub fn with_pods(mut self, namespace: &str, selector: &str, pods: &[&str]) -> Self {
        self.pods.insert(
            (namespace.to_string(), selector.to_string()),
            pods.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn with_service(mut self, namespace: &str, name: &str) -> Self {
        self.services
            .insert((namespace.to_string(), name.to_string()));
        self
    }

    pub fn with_pod_log(mut self, pod: &str, lines: &[&str], outcome: PodOutcome) -> Self {
        self.logs.insert(
            pod.to_string(),
            (lines.iter().map(|l| l.to_string()).collect(), outcome),
        );
        self
    }
}

#[async_trait]
impl ClusterQuery for FakeCluster {
    async fn deployment_exists(&self, deployment: &Deployment) -> Result<bool> {
        Ok(self
            .deployments
            .contains(&(deployment.namespace.clone(), deployment.name.clone())))
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<String>> {
        Ok(self
            .pods
            .get(&(namespace.to_string(), selector.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        Ok(self
            .services
            .contains(&(namespace.to_string(), name.to_string())))
    }
}

#[async_trait]
impl LogSource for FakeCluster {
    async fn follow_log(
        &self,
        _namespace: &str,
        pod: &str,
        lines: mpsc::Sender<String>,
    ) -> Result<()> {
        if let Some((log, _)) = self.logs.get(pod) {
            for line in log {
                if lines.send(line.clone()).await.is_err() {
                    break;
                }
            }
        }
        Ok(())
    }

    async fn wait_for_completion(&self, _namespace: &str, pod: &str) -> Result<PodOutcome> {
        Ok(self
            .logs
            .get(pod)
            .map(|(_, outcome)| *outcome)
            .unwrap_or(PodOutcome::Succeeded))
    }

    async fn collect_log(&self, _namespace: &str, pod: &str) -> Result<String> {
        Ok(self
            .logs
            .get(pod)
            .map(|(log, _)| log.join("\n"))
            .unwrap_or_default())
    }
}
