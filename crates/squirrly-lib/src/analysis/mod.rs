//! Analysis providers
//!
//! A provider knows how to shape its request payload on the coordinator, where
//! to send it, and how to unwrap the answer from its response envelope. The
//! request itself is issued by [`AnalysisClient`] with `curl` from the
//! coordinator, the only process with egress.

mod openai;

pub use openai::OpenAiProvider;

use crate::control_plane::HttpResponse;
use crate::error::{Error, ExecError, Result};
use crate::exec::{command, RemoteExecutor};
use crate::models::{AnalysisResult, ProcessTarget};
use crate::observability::StructuredLogger;
use crate::relay::{ArtifactRelay, Scratch};
use std::sync::Arc;

/// Prompt used when no prompt file is available
pub const DEFAULT_PROMPT: &str = "You are a JVM performance engineer. The following HTML document \
is a flamegraph produced by a sampling profiler attached to a stream-processing worker. \
Identify the hottest code paths, explain what they are doing, and suggest concrete \
changes that would reduce CPU time or allocation pressure.";

/// Request timeout handed to curl, in seconds
const REQUEST_MAX_TIME_SECS: u32 = 120;

/// A supported analysis backend
pub trait AnalysisProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Chat-completion endpoint
    fn endpoint(&self) -> &str;

    /// Coordinator command that reads the prompt and artifact files and
    /// writes the request body to `payload_path`
    fn payload_command(&self, prompt_path: &str, artifact_path: &str, payload_path: &str)
        -> Vec<String>;

    /// Pull the answer text out of a successful response body
    fn extract_text(&self, body: &str) -> Option<String>;
}

/// Resolve a provider by its configured name
pub fn provider_for(name: &str) -> Result<Box<dyn AnalysisProvider>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new())),
        _ => Err(Error::UnsupportedProvider(name.to_string())),
    }
}

/// Submits prepared payloads from the coordinator
pub struct AnalysisClient {
    executor: Arc<dyn RemoteExecutor>,
    relay: ArtifactRelay,
    logger: StructuredLogger,
}

impl AnalysisClient {
    pub fn new(executor: Arc<dyn RemoteExecutor>, logger: StructuredLogger) -> Self {
        Self {
            relay: ArtifactRelay::new(executor.clone(), logger.clone()),
            executor,
            logger,
        }
    }

    /// POST `scratch.payload` to the provider with bearer auth.
    ///
    /// The token goes into a header file on the coordinator rather than the
    /// command line; the caller removes it with the rest of the scratch set.
    pub async fn submit(
        &self,
        coordinator: &ProcessTarget,
        scratch: &Scratch,
        provider: &dyn AnalysisProvider,
        credential: &str,
    ) -> Result<AnalysisResult> {
        let header = format!("Authorization: Bearer {}\n", credential);
        match self
            .relay
            .write_file(coordinator, &scratch.headers, header.as_bytes())
            .await
        {
            Err(Error::Exec(ExecError::NonZeroExit { code, stderr, .. })) => {
                let e = Error::ProviderRequestFailed {
                    http_code: None,
                    body: format!(
                        "could not write request headers (exit code {}): {}",
                        code,
                        stderr.trim()
                    ),
                };
                self.logger
                    .log_analysis(provider.name(), Err(&e.to_string()));
                return Err(e);
            }
            other => other?,
        }

        let max_time = REQUEST_MAX_TIME_SECS.to_string();
        let headers = format!("@{}", scratch.headers);
        let data = format!("@{}", scratch.payload);
        let argv = command([
            "curl",
            "-sS",
            "--max-time",
            max_time.as_str(),
            "-X",
            "POST",
            "-H",
            "Content-Type: application/json",
            "-H",
            headers.as_str(),
            "--data-binary",
            data.as_str(),
            "-w",
            "\n%{http_code}",
            provider.endpoint(),
        ]);

        let output = self.executor.execute(coordinator, &argv, None).await?;
        let response = HttpResponse::parse(&output.stdout_text());

        let outcome = match response.code {
            Some(200) => provider
                .extract_text(&response.body)
                .ok_or(Error::ProviderRequestFailed {
                    http_code: response.code,
                    body: response.body.clone(),
                }),
            http_code => Err(Error::ProviderRequestFailed {
                http_code,
                body: if response.body.is_empty() {
                    output.stderr.trim().to_string()
                } else {
                    response.body.clone()
                },
            }),
        };

        match outcome {
            Ok(text) => {
                self.logger.log_analysis(provider.name(), Ok(text.len()));
                Ok(AnalysisResult {
                    provider_name: provider.name().to_string(),
                    request_payload: scratch.payload.clone(),
                    response_text: text,
                })
            }
            Err(e) => {
                self.logger
                    .log_analysis(provider.name(), Err(&e.to_string()));
                Err(e)
            }
        }
    }
}
