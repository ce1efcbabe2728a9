//! Subprocess executor: `<binary> call <tool> <json-args>`.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{parse_call_output, ToolExecutor, ToolResult};

/// Upper bound on a single CLI tool call.
pub const DEFAULT_CLI_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs tools by spawning the tool binary on the host.
#[derive(Debug, Clone)]
pub struct CliToolExecutor {
    binary: String,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CliToolExecutor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            working_dir: None,
            timeout: DEFAULT_CLI_TIMEOUT,
        }
    }

    /// Run the binary from this directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

#[async_trait]
impl ToolExecutor for CliToolExecutor {
    async fn execute(&self, tool_name: &str, arguments: &Value) -> ToolResult {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("call")
            .arg(tool_name)
            .arg(arguments.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(binary = %self.binary, tool = tool_name, "Calling CLI tool");

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => parse_call_output(
                &String::from_utf8_lossy(&output.stdout),
                &String::from_utf8_lossy(&output.stderr),
                output.status.code().unwrap_or(-1),
            ),
            Ok(Err(e)) => ToolResult::failure(format!("Failed to run {}: {}", self.binary, e)),
            Err(_) => ToolResult::failure(format!("Timeout after {}s", self.timeout.as_secs())),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("fake-ash");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_json_output_is_parsed() {
        let dir = TempDir::new().expect("tempdir");
        let bin = script(
            &dir,
            r#"[ "$1" = call ] || exit 9
printf '{"success": true, "output": "tool=%s args=%s"}' "$2" "$3""#,
        );
        let executor = CliToolExecutor::new(bin);
        let result = executor.execute("git_status", &json!({"short": true})).await;
        assert!(result.success);
        assert_eq!(result.output, r#"tool=git_status args={"short":true}"#);
    }

    #[tokio::test]
    async fn test_raw_output_fallback() {
        let dir = TempDir::new().expect("tempdir");
        let bin = script(&dir, "echo not json; echo oops >&2; exit 4");
        let result = CliToolExecutor::new(bin).execute("shell", &json!({})).await;
        assert!(!result.success);
        assert_eq!(result.output, "not json\n");
        assert_eq!(result.error.as_deref(), Some("oops"));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let bin = script(&dir, "sleep 5");
        let executor = CliToolExecutor::new(bin).with_timeout(Duration::from_millis(200));
        let result = executor.execute("shell", &json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap_or_default().starts_with("Timeout after"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_failure() {
        let result = CliToolExecutor::new("/nonexistent/ash-binary")
            .execute("shell", &json!({}))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap_or_default().starts_with("Failed to run"));
    }
}
