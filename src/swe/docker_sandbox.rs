//! Docker sandbox for running the agent's tools against an instance.
//!
//! Each instance gets a long-lived container (`sleep infinity`) started from
//! its evaluation image. When a tool binary is configured it is copied in and
//! probed once at start; a working binary serves every tool call natively,
//! otherwise calls are emulated with fixed shell and python programs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use super::{sanitize_name, SandboxEnvironment, SandboxState, SweInstance};
use crate::error::SandboxError;
use crate::scaffold::tools::{emulate, parse_call_output, shell_result, ToolExecutor, ToolResult};

/// Prefix of every container this harness creates.
pub const CONTAINER_PREFIX: &str = "ash-swebench";

/// Settings for [`DockerEnvironment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Container runtime CLI (`docker`, `podman`, ...).
    pub runtime: String,
    /// Image to use instead of the one resolved from the instance.
    pub image: Option<String>,
    pub workdir: String,
    pub memory: String,
    pub cpus: String,
    /// Default per-exec timeout in seconds.
    pub timeout_secs: u64,
    pub pull_if_missing: bool,
    /// Host path of the tool binary copied into the container.
    pub ash_binary: Option<PathBuf>,
    pub ash_install_path: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            image: None,
            workdir: "/testbed".to_string(),
            memory: "16g".to_string(),
            cpus: "4".to_string(),
            timeout_secs: 60,
            pull_if_missing: true,
            ash_binary: None,
            ash_install_path: "/usr/local/bin/ash".to_string(),
        }
    }
}

impl DockerConfig {
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn with_ash_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.ash_binary = Some(path.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Captured result of one runtime invocation.
#[derive(Debug)]
struct ProcessOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl ProcessOutput {
    fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug)]
enum ProcessFailure {
    Io(std::io::Error),
    Timeout,
}

async fn run_process(
    binary: &str,
    args: &[String],
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessFailure> {
    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let run = async {
        let mut child = cmd.spawn()?;
        if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(data.as_bytes()).await?;
            pipe.shutdown().await?;
        }
        child.wait_with_output().await
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(Ok(output)) => Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        }),
        Ok(Err(e)) => Err(ProcessFailure::Io(e)),
        Err(_) => Err(ProcessFailure::Timeout),
    }
}

fn args<const N: usize>(values: [&str; N]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Longest a lifecycle command (inspect, run, cp, rm) may take.
const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest an image pull may take.
const PULL_TIMEOUT: Duration = Duration::from_secs(1800);

/// A container-backed [`SandboxEnvironment`].
pub struct DockerEnvironment {
    config: DockerConfig,
    state: SandboxState,
    container_id: Option<String>,
    ash_ready: bool,
}

impl DockerEnvironment {
    pub fn new(config: DockerConfig) -> Self {
        Self {
            config,
            state: SandboxState::Unstarted,
            container_id: None,
            ash_ready: false,
        }
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    /// Whether tool calls go to the in-container binary.
    pub fn is_ash_ready(&self) -> bool {
        self.ash_ready
    }

    async fn runtime(&self, args: Vec<String>, timeout: Duration) -> Result<ProcessOutput, SandboxError> {
        match run_process(&self.config.runtime, &args, None, timeout).await {
            Ok(output) => Ok(output),
            Err(ProcessFailure::Io(source)) => Err(SandboxError::RuntimeUnavailable {
                binary: self.config.runtime.clone(),
                source,
            }),
            Err(ProcessFailure::Timeout) => Err(SandboxError::CommandTimeout {
                command: args.join(" "),
                secs: timeout.as_secs(),
            }),
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        let inspect = self
            .runtime(args(["image", "inspect", image]), LIFECYCLE_TIMEOUT)
            .await?;
        if inspect.success() {
            return Ok(());
        }
        if !self.config.pull_if_missing {
            return Err(SandboxError::ImageUnavailable {
                image: image.to_string(),
                reason: "not present locally and pulling is disabled".to_string(),
            });
        }

        tracing::info!(image = image, "Pulling image");
        let pull = self.runtime(args(["pull", image]), PULL_TIMEOUT).await?;
        if pull.success() {
            Ok(())
        } else {
            Err(SandboxError::ImageUnavailable {
                image: image.to_string(),
                reason: pull.stderr.trim().to_string(),
            })
        }
    }

    /// Copy the tool binary in and probe it. Returns whether it answered.
    async fn install_tool(&self, container: &str, binary: &Path) -> bool {
        if !binary.exists() {
            tracing::warn!(path = %binary.display(), "Tool binary not found on host");
            return false;
        }

        let source = binary.to_string_lossy().into_owned();
        let dest = format!("{}:{}", container, self.config.ash_install_path);
        let steps = [
            args(["cp", source.as_str(), dest.as_str()]),
            args(["exec", container, "chmod", "+x", &self.config.ash_install_path]),
            args(["exec", container, &self.config.ash_install_path, "tools"]),
        ];
        for step in steps {
            match self.runtime(step, LIFECYCLE_TIMEOUT).await {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    tracing::warn!(container = container, stderr = %output.stderr.trim(), "Tool binary setup failed");
                    return false;
                }
                Err(e) => {
                    tracing::warn!(container = container, error = %e, "Tool binary setup failed");
                    return false;
                }
            }
        }
        true
    }

    async fn remove_container(&self, container: &str) {
        match self
            .runtime(args(["rm", "-f", container]), LIFECYCLE_TIMEOUT)
            .await
        {
            Ok(output) if output.success() => {
                tracing::debug!(container = container, "Container removed");
            }
            Ok(output) => {
                tracing::warn!(container = container, stderr = %output.stderr.trim(), "Container removal failed");
            }
            Err(e) => {
                tracing::warn!(container = container, error = %e, "Container removal failed");
            }
        }
    }

    async fn exec(
        &self,
        container: &str,
        program: Vec<String>,
        stdin: Option<&str>,
        timeout: Duration,
    ) -> Result<ProcessOutput, String> {
        let mut argv = vec!["exec".to_string()];
        if stdin.is_some() {
            argv.push("-i".to_string());
        }
        argv.extend(args(["-w", &self.config.workdir, container]));
        argv.extend(program);

        match run_process(&self.config.runtime, &argv, stdin, timeout).await {
            Ok(output) => Ok(output),
            Err(ProcessFailure::Timeout) => Err(format!("Timeout after {}s", timeout.as_secs())),
            Err(ProcessFailure::Io(e)) => Err(format!("Failed to run {}: {}", self.config.runtime, e)),
        }
    }

    async fn call_native(&self, container: &str, tool_name: &str, arguments: &Value) -> ToolResult {
        let program = vec![
            self.config.ash_install_path.clone(),
            "call".to_string(),
            tool_name.to_string(),
            arguments.to_string(),
        ];
        match self.exec(container, program, None, self.config.timeout()).await {
            Ok(out) => parse_call_output(&out.stdout, &out.stderr, out.exit_code),
            Err(reason) => ToolResult::failure(reason),
        }
    }

    async fn call_emulated(&self, container: &str, tool_name: &str, arguments: &Value) -> ToolResult {
        let command = match emulate(tool_name, arguments) {
            Ok(command) => command,
            Err(reason) => return ToolResult::failure(reason),
        };
        let timeout = command.timeout.unwrap_or_else(|| self.config.timeout());
        match self
            .exec(container, command.argv, command.stdin.as_deref(), timeout)
            .await
        {
            Ok(out) => shell_result(&out.stdout, &out.stderr, out.exit_code),
            Err(reason) => ToolResult::failure(reason),
        }
    }
}

#[async_trait]
impl SandboxEnvironment for DockerEnvironment {
    async fn start(&mut self, instance: &SweInstance) -> Result<(), SandboxError> {
        if self.state != SandboxState::Unstarted {
            return Err(SandboxError::InvalidState {
                expected: SandboxState::Unstarted.as_str(),
                found: self.state.as_str(),
            });
        }

        let image = self
            .config
            .image
            .clone()
            .unwrap_or_else(|| instance.resolve_image());
        self.ensure_image(&image).await?;

        let name = format!(
            "{}-{}-{}",
            CONTAINER_PREFIX,
            sanitize_name(&instance.instance_id),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let run = self
            .runtime(
                args([
                    "run",
                    "-d",
                    "--name",
                    &name,
                    "--memory",
                    &self.config.memory,
                    "--cpus",
                    &self.config.cpus,
                    "-w",
                    &self.config.workdir,
                    &image,
                    "sleep",
                    "infinity",
                ]),
                LIFECYCLE_TIMEOUT,
            )
            .await?;
        if !run.success() {
            // `run` may leave a created-but-not-started container behind.
            self.remove_container(&name).await;
            return Err(SandboxError::LaunchFailed {
                image,
                reason: run.stderr.trim().to_string(),
            });
        }

        self.container_id = Some(name.clone());
        self.state = SandboxState::Running;

        if let Some(binary) = self.config.ash_binary.clone() {
            self.ash_ready = self.install_tool(&name, &binary).await;
        }
        if !self.ash_ready {
            tracing::warn!(container = %name, "Tool binary unavailable, using shell emulation");
        }

        tracing::info!(
            instance = %instance.instance_id,
            container = %name,
            image = %image,
            ash_ready = self.ash_ready,
            "Docker sandbox ready"
        );
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(container) = self.container_id.take() {
            self.remove_container(&container).await;
            self.state = SandboxState::Stopped;
            self.ash_ready = false;
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
impl ToolExecutor for DockerEnvironment {
    async fn execute(&self, tool_name: &str, arguments: &Value) -> ToolResult {
        let container = match (&self.state, &self.container_id) {
            (SandboxState::Running, Some(id)) => id.as_str(),
            _ => return ToolResult::failure("Container not running"),
        };

        tracing::debug!(container = container, tool = tool_name, native = self.ash_ready, "Executing tool");
        if self.ash_ready {
            self.call_native(container, tool_name, arguments).await
        } else {
            self.call_emulated(container, tool_name, arguments).await
        }
    }
}

/// Best-effort removal when dropped while still running.
impl Drop for DockerEnvironment {
    fn drop(&mut self) {
        if let Some(container) = self.container_id.take() {
            let runtime = self.config.runtime.clone();
            std::thread::spawn(move || {
                let _ = std::process::Command::new(runtime)
                    .args(["rm", "-f", &container])
                    .stdout(std::process::Stdio::null())
                    .stderr(std::process::Stdio::null())
                    .status();
            });
        }
    }
}
