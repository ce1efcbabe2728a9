//! Host execution without a container (`--no-docker`).

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

use super::{SandboxEnvironment, SandboxState, SweInstance};
use crate::error::SandboxError;
use crate::scaffold::tools::{CliToolExecutor, ToolExecutor, ToolResult};

/// Runs tools on the host through `<ash_binary> call`, from a fixed directory.
pub struct LocalEnvironment {
    executor: CliToolExecutor,
    state: SandboxState,
}

impl LocalEnvironment {
    pub fn new(ash_binary: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            executor: CliToolExecutor::new(ash_binary).with_working_dir(working_dir),
            state: SandboxState::Unstarted,
        }
    }
}

#[async_trait]
impl SandboxEnvironment for LocalEnvironment {
    async fn start(&mut self, instance: &SweInstance) -> Result<(), SandboxError> {
        if self.state != SandboxState::Unstarted {
            return Err(SandboxError::InvalidState {
                expected: SandboxState::Unstarted.as_str(),
                found: self.state.as_str(),
            });
        }
        tracing::info!(
            instance = %instance.instance_id,
            binary = %self.executor.binary(),
            "Running tools on the host"
        );
        self.state = SandboxState::Running;
        Ok(())
    }

    async fn stop(&mut self) {
        if self.state == SandboxState::Running {
            self.state = SandboxState::Stopped;
        }
    }

    fn state(&self) -> SandboxState {
        self.state
    }

    fn executor(&self) -> &dyn ToolExecutor {
        self
    }
}

#[async_trait]
impl ToolExecutor for LocalEnvironment {
    async fn execute(&self, tool_name: &str, arguments: &Value) -> ToolResult {
        if self.state != SandboxState::Running {
            return ToolResult::failure("Container not running");
        }
        self.executor.execute(tool_name, arguments).await
    }
}
