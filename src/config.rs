//! Harness configuration.
//!
//! Values are layered, lowest precedence first: built-in defaults, an
//! optional YAML file, `SWEBENCH_*` environment variables, then CLI flags
//! (applied by the `cli` module).
//!
//! ```yaml
//! agent:
//!   model: anthropic/claude-sonnet-4-5-20250929
//!   step_limit: 100
//! docker:
//!   memory: 8g
//! batch:
//!   workers: 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::scaffold::AgentConfig;
use crate::swe::{DockerConfig, DEFAULT_OUTPUT_DIR};

/// Settings of a batch invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub output_dir: PathBuf,
    pub workers: usize,
    /// Run tools in containers; otherwise on the host.
    pub use_sandbox: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            workers: 1,
            use_sandbox: true,
        }
    }
}

/// Complete configuration of the harness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub agent: AgentConfig,
    pub docker: DockerConfig,
    pub batch: BatchConfig,
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML configuration file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Defaults, then the optional file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SWEBENCH_MODEL`, `SWEBENCH_STEP_LIMIT`, `SWEBENCH_COST_LIMIT`,
    ///   `SWEBENCH_TEMPERATURE`, `SWEBENCH_CWD`, `SWEBENCH_ASH_BINARY`
    /// - `SWEBENCH_DOCKER_RUNTIME`, `SWEBENCH_DOCKER_IMAGE`,
    ///   `SWEBENCH_DOCKER_MEMORY`, `SWEBENCH_DOCKER_CPUS`,
    ///   `SWEBENCH_DOCKER_TIMEOUT_SECS`, `SWEBENCH_DOCKER_PULL`,
    ///   `SWEBENCH_DOCKER_ASH_BINARY`
    /// - `SWEBENCH_OUTPUT_DIR`, `SWEBENCH_WORKERS`, `SWEBENCH_USE_SANDBOX`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from variables returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Agent settings
        if let Some(val) = lookup("SWEBENCH_MODEL") {
            self.agent.model = val;
        }
        if let Some(val) = lookup("SWEBENCH_STEP_LIMIT") {
            self.agent.step_limit = parse_env_value(&val, "SWEBENCH_STEP_LIMIT")?;
        }
        if let Some(val) = lookup("SWEBENCH_COST_LIMIT") {
            self.agent.cost_limit = parse_env_value(&val, "SWEBENCH_COST_LIMIT")?;
        }
        if let Some(val) = lookup("SWEBENCH_TEMPERATURE") {
            self.agent.temperature = parse_env_value(&val, "SWEBENCH_TEMPERATURE")?;
        }
        if let Some(val) = lookup("SWEBENCH_CWD") {
            self.agent.cwd = val;
        }
        if let Some(val) = lookup("SWEBENCH_ASH_BINARY") {
            self.agent.ash_binary = val;
        }

        // Docker settings
        if let Some(val) = lookup("SWEBENCH_DOCKER_RUNTIME") {
            self.docker.runtime = val;
        }
        if let Some(val) = lookup("SWEBENCH_DOCKER_IMAGE") {
            self.docker.image = Some(val).filter(|v| !v.is_empty());
        }
        if let Some(val) = lookup("SWEBENCH_DOCKER_MEMORY") {
            self.docker.memory = val;
        }
        if let Some(val) = lookup("SWEBENCH_DOCKER_CPUS") {
            self.docker.cpus = val;
        }
        if let Some(val) = lookup("SWEBENCH_DOCKER_TIMEOUT_SECS") {
            self.docker.timeout_secs = parse_env_value(&val, "SWEBENCH_DOCKER_TIMEOUT_SECS")?;
        }
        if let Some(val) = lookup("SWEBENCH_DOCKER_PULL") {
            self.docker.pull_if_missing = parse_env_bool(&val, "SWEBENCH_DOCKER_PULL")?;
        }
        if let Some(val) = lookup("SWEBENCH_DOCKER_ASH_BINARY") {
            self.docker.ash_binary = Some(PathBuf::from(val));
        }

        // Batch settings
        if let Some(val) = lookup("SWEBENCH_OUTPUT_DIR") {
            self.batch.output_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("SWEBENCH_WORKERS") {
            self.batch.workers = parse_env_value(&val, "SWEBENCH_WORKERS")?;
        }
        if let Some(val) = lookup("SWEBENCH_USE_SANDBOX") {
            self.batch.use_sandbox = parse_env_bool(&val, "SWEBENCH_USE_SANDBOX")?;
        }

        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let agent = &self.agent;
        if agent.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model cannot be empty".to_string(),
            ));
        }
        if agent.step_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "step_limit must be greater than 0".to_string(),
            ));
        }
        if !agent.cost_limit.is_finite() || agent.cost_limit <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "cost_limit must be a positive number".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&agent.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        let docker = &self.docker;
        if docker.workdir.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "docker workdir cannot be empty".to_string(),
            ));
        }
        if docker.memory.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "docker memory cannot be empty".to_string(),
            ));
        }
        if docker.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "docker timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.batch.workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "workers must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
