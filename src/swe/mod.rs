//! SWE-bench execution: instances, sandboxes, checkpoints and batches.
//!
//! One instance flows through
//! `SandboxEnvironment::start -> AgentLoop::run -> TrajectoryStorage::save
//! -> PredictionStore::record -> SandboxEnvironment::stop`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub mod batch;
pub mod checkpoint;
pub mod dataset;
pub mod docker_sandbox;
pub mod local;

pub use batch::{
    docker_factory, local_factory, BatchRunner, BatchSummary, EnvironmentFactory, InstanceOutcome,
};
pub use checkpoint::{Prediction, PredictionStore, ENVIRONMENT_ERROR_STATUS, PREDICTIONS_FILE};
pub use dataset::{load_instances, parse_slice, select_instances, InstanceSelection};
pub use docker_sandbox::{DockerConfig, DockerEnvironment};
pub use local::LocalEnvironment;

use crate::error::SandboxError;
use crate::scaffold::tools::ToolExecutor;

/// Default output directory for batch runs.
pub const DEFAULT_OUTPUT_DIR: &str = "swebench_results";

/// Registry prefix for derived evaluation images.
const IMAGE_PREFIX: &str = "swebench/sweb.eval.x86_64";

/// Characters of the base commit used in a derived image tag.
const IMAGE_TAG_COMMIT_CHARS: usize = 12;

/// One benchmark problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweInstance {
    pub instance_id: String,
    pub repo: String,
    pub base_commit: String,
    pub problem_statement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_image_key: Option<String>,
    /// Dataset fields this harness does not interpret (patch, tests, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SweInstance {
    pub fn new(
        instance_id: impl Into<String>,
        repo: impl Into<String>,
        base_commit: impl Into<String>,
        problem_statement: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            repo: repo.into(),
            base_commit: base_commit.into(),
            problem_statement: problem_statement.into(),
            image_name: None,
            env_image_key: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_env_image_key(mut self, key: impl Into<String>) -> Self {
        self.env_image_key = Some(key.into());
        self
    }

    /// Container image for this instance.
    ///
    /// `env_image_key` wins, then `image_name`; otherwise the image is derived
    /// as `swebench/sweb.eval.x86_64.<owner>__<repo>:<commit[..12]>`.
    pub fn resolve_image(&self) -> String {
        let explicit = self
            .env_image_key
            .as_deref()
            .or(self.image_name.as_deref())
            .filter(|s| !s.trim().is_empty());
        if let Some(image) = explicit {
            return image.to_string();
        }

        let repo = self.repo.replace('/', "__").to_lowercase();
        let commit: String = self.base_commit.chars().take(IMAGE_TAG_COMMIT_CHARS).collect();
        format!("{}.{}:{}", IMAGE_PREFIX, repo, commit)
    }
}

/// Lifecycle of a sandbox. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Unstarted,
    Running,
    Stopped,
}

impl SandboxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxState::Unstarted => "Unstarted",
            SandboxState::Running => "Running",
            SandboxState::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An isolated execution target for one instance.
///
/// `start` is called at most once. `stop` never fails and may be called any
/// number of times; on an environment that never ran it does nothing.
#[async_trait]
pub trait SandboxEnvironment: Send + Sync {
    /// Bring the environment up for `instance`.
    async fn start(&mut self, instance: &SweInstance) -> Result<(), SandboxError>;

    /// Tear the environment down.
    async fn stop(&mut self);

    fn state(&self) -> SandboxState;

    /// Executor bound to this environment.
    fn executor(&self) -> &dyn ToolExecutor;
}

/// Reduce an instance id to characters valid in container names.
pub fn sanitize_name(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '-' => c.to_ascii_lowercase(),
            _ => '-',
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        "instance".to_string()
    } else {
        trimmed.to_string()
    }
}
