//! Layered configuration
//!
//! Built-in defaults, then `~/.config/squirrly/config.toml`, then `SQUIRRLY_*`
//! environment variables, then command-line flags.

use crate::output;
use crate::TargetArgs;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use squirrly_lib::analysis::DEFAULT_PROMPT;
use squirrly_lib::models::ProfilerMode;
use squirrly_lib::profiler::{ProfilerSettings, DEFAULT_SEARCH_PATHS};
use squirrly_lib::OrchestratorConfig;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "SQUIRRLY";
const DEFAULT_PROMPT_FILE: &str = "/etc/squirrly/prompt.txt";

/// Resolved settings before they are turned into an orchestrator config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub namespace: String,
    pub deployment_name: String,
    pub profiler_mode: String,
    pub profiler_duration: u64,
    pub search_paths: Vec<String>,
    pub analysis_provider: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub prompt_file: PathBuf,
    #[serde(default)]
    pub container: Option<String>,
    pub control_api_url: String,
}

impl Settings {
    /// Load from the user config file and the process environment
    pub fn load() -> Result<Self> {
        let file = Self::config_path().ok();
        let mut settings = Self::build(file.as_deref(), config::Environment::with_prefix(ENV_PREFIX))?;
        if settings.api_key.is_none() {
            settings.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        Ok(settings)
    }

    fn build(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("namespace", "default")?
            .set_default("deployment_name", "sample-job")?
            .set_default("profiler_mode", ProfilerMode::default().as_str())?
            .set_default("profiler_duration", 60)?
            .set_default(
                "search_paths",
                DEFAULT_SEARCH_PATHS
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>(),
            )?
            .set_default("analysis_provider", "openai")?
            .set_default("prompt_file", DEFAULT_PROMPT_FILE)?
            .set_default("container", "flink-main-container")?
            .set_default("control_api_url", "http://localhost:8081")?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config = builder
            .add_source(
                env.try_parsing(true)
                    .list_separator(" ")
                    .with_list_parse_key("search_paths"),
            )
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Apply command-line overrides
    pub fn apply(&mut self, args: &TargetArgs) {
        if let Some(namespace) = &args.namespace {
            self.namespace = namespace.clone();
        }
        if let Some(deployment) = &args.deployment {
            self.deployment_name = deployment.clone();
        }
        if let Some(mode) = args.mode {
            self.profiler_mode = mode.to_string();
        }
        if let Some(duration) = args.duration {
            self.profiler_duration = duration;
        }
        if !args.search_paths.is_empty() {
            self.search_paths = args.search_paths.clone();
        }
        if let Some(provider) = &args.provider {
            self.analysis_provider = provider.clone();
        }
        if let Some(api_key) = &args.api_key {
            self.api_key = Some(api_key.clone());
        }
        if let Some(prompt_file) = &args.prompt_file {
            self.prompt_file = prompt_file.clone();
        }
        if let Some(container) = &args.container {
            self.container = Some(container.clone());
        }
        if let Some(url) = &args.control_api_url {
            self.control_api_url = url.clone();
        }
    }

    pub fn mode(&self) -> Result<ProfilerMode> {
        self.profiler_mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
    }

    pub fn validate(&self) -> Result<()> {
        self.mode()?;
        if self.profiler_duration == 0 {
            bail!("profiler duration must be a positive number of seconds");
        }
        if self.search_paths.is_empty() {
            bail!("at least one artifact search path is required");
        }
        let url = url::Url::parse(&self.control_api_url)
            .with_context(|| format!("Invalid control API URL '{}'", self.control_api_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!(
                "control API URL must use http or https, got '{}'",
                url.scheme()
            );
        }
        Ok(())
    }

    /// Read the prompt file, falling back to the built-in prompt when absent
    pub fn prompt(&self) -> Result<String> {
        match std::fs::read_to_string(&self.prompt_file) {
            Ok(prompt) if !prompt.trim().is_empty() => Ok(prompt),
            Ok(_) => {
                output::print_warning(&format!(
                    "Prompt file {} is empty; using the built-in prompt",
                    self.prompt_file.display()
                ));
                Ok(DEFAULT_PROMPT.to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                output::print_warning(&format!(
                    "Prompt file {} not found; using the built-in prompt",
                    self.prompt_file.display()
                ));
                Ok(DEFAULT_PROMPT.to_string())
            }
            Err(e) => Err(e).with_context(|| {
                format!("Failed to read prompt file {}", self.prompt_file.display())
            }),
        }
    }

    /// Validate and convert into the library's run configuration
    pub fn into_orchestrator_config(self) -> Result<OrchestratorConfig> {
        self.validate()?;
        let prompt = self.prompt()?;
        let defaults = OrchestratorConfig::default();

        Ok(OrchestratorConfig {
            profiler: ProfilerSettings {
                mode: self.mode()?,
                duration_secs: self.profiler_duration,
                search_paths: self.search_paths,
                poll: defaults.profiler.poll,
            },
            namespace: self.namespace,
            deployment: self.deployment_name,
            container: self.container.filter(|c| !c.is_empty()),
            control_api_url: self.control_api_url,
            provider: self.analysis_provider,
            api_key: self.api_key.filter(|k| !k.trim().is_empty()),
            prompt,
            relay_timeout: defaults.relay_timeout,
        })
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("squirrly").join("config.toml"))
    }
}
