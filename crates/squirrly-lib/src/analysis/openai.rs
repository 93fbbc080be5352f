//! OpenAI chat-completions provider

use super::AnalysisProvider;
use crate::exec::shell;
use serde::Deserialize;

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const MODEL: &str = "gpt-4o";

/// Builds `{model, messages, temperature, max_tokens}` from the two scratch
/// files. `--rawfile` keeps the artifact byte-for-byte inside the JSON string.
const PAYLOAD_SCRIPT: &str = r#"jq -n --rawfile prompt "$1" --rawfile artifact "$2" --arg model "$3" \
  '{model: $model, messages: [{role: "user", content: ($prompt + "\n\n" + $artifact)}], temperature: 0.7, max_tokens: 2000}' \
  > "$4""#;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OpenAiProvider {
    model: Option<String>,
}

impl OpenAiProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
        }
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(MODEL)
    }
}

impl AnalysisProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn endpoint(&self) -> &str {
        ENDPOINT
    }

    fn payload_command(
        &self,
        prompt_path: &str,
        artifact_path: &str,
        payload_path: &str,
    ) -> Vec<String> {
        shell(
            PAYLOAD_SCRIPT,
            [prompt_path, artifact_path, self.model(), payload_path],
        )
    }

    fn extract_text(&self, body: &str) -> Option<String> {
        serde_json::from_str::<ChatResponse>(body)
            .ok()?
            .choices
            .into_iter()
            .next()?
            .message
            .content
    }
}
