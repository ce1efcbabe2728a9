//! Tool results, the executor seam, and the executor backends.
//!
//! Every backend implements [`ToolExecutor`]: it takes a tool name and a
//! JSON object of arguments and always produces a [`ToolResult`]. Timeouts,
//! protocol errors and non-zero exits are reported as failed results, never
//! as `Err`, so a single bad call cannot abort an agent run.

pub mod catalogue;
pub mod cli;
pub mod emulation;
pub mod mcp;

pub use catalogue::{tool_definitions, tools_description, ParamSpec, ToolSpec, TOOL_CATALOGUE};
pub use cli::CliToolExecutor;
pub use emulation::{emulate, EmulatedCommand};
pub use mcp::{McpToolExecutor, McpTransport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool execution was successful.
    pub success: bool,
    /// Output from the tool execution.
    pub output: String,
    /// Error message if execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful tool result.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Create a failed tool result.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    /// Create a failed result that still carries output.
    pub fn partial(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
        }
    }

    /// Text shown to the model: the output on success, `Error: <reason>` otherwise.
    pub fn observation_text(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("Unknown error")
            )
        }
    }
}

/// A target that can run named tools.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run `tool_name` with a JSON object of arguments.
    async fn execute(&self, tool_name: &str, arguments: &Value) -> ToolResult;
}

/// Interpret the stdout of a `<binary> call <tool> <json>` invocation.
///
/// The binary prints `{success, output, error}`; anything that is not such
/// an object is taken as raw output with success decided by the exit code.
pub fn parse_call_output(stdout: &str, stderr: &str, exit_code: i32) -> ToolResult {
    if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(stdout.trim()) {
        let success = data
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(exit_code == 0);
        let output = match data.get("output") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let error = data
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string);
        return ToolResult {
            success,
            output,
            error,
        };
    }

    if exit_code == 0 {
        ToolResult::success(stdout)
    } else {
        let error = if stderr.trim().is_empty() {
            format!("Exit code: {}", exit_code)
        } else {
            stderr.trim().to_string()
        };
        ToolResult::partial(stdout, error)
    }
}

/// Fold a raw process result into a shell-style `ToolResult`.
///
/// stderr is appended after a `[stderr]` separator; a non-zero exit fails
/// with `Exit code: N`, followed by stderr when there is any.
pub fn shell_result(stdout: &str, stderr: &str, exit_code: i32) -> ToolResult {
    let mut output = stdout.to_string();
    if !stderr.is_empty() {
        output.push_str("\n[stderr]\n");
        output.push_str(stderr);
    }

    if exit_code == 0 {
        ToolResult::success(output)
    } else {
        let mut error = format!("Exit code: {}", exit_code);
        if !stderr.trim().is_empty() {
            error.push('\n');
            error.push_str(stderr.trim());
        }
        ToolResult::partial(output, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_constructors() {
        let ok = ToolResult::success("output text");
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ToolResult::failure("boom");
        assert!(!failed.success);
        assert!(failed.output.is_empty());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_observation_text() {
        assert_eq!(ToolResult::success("hi").observation_text(), "hi");
        assert_eq!(
            ToolResult::failure("Container not running").observation_text(),
            "Error: Container not running"
        );
        let no_reason = ToolResult {
            success: false,
            output: String::new(),
            error: None,
        };
        assert_eq!(no_reason.observation_text(), "Error: Unknown error");
    }

    #[test]
    fn test_parse_call_output_json() {
        let result = parse_call_output(r#"{"success": true, "output": "ok"}"#, "", 0);
        assert_eq!(result, ToolResult::success("ok"));

        let result = parse_call_output(
            r#"{"success": false, "output": "", "error": "not found"}"#,
            "",
            0,
        );
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("not found"));
    }

    #[test]
    fn test_parse_call_output_missing_success_uses_exit_code() {
        let result = parse_call_output(r#"{"output": "x"}"#, "", 2);
        assert!(!result.success);
        assert_eq!(result.output, "x");
    }

    #[test]
    fn test_parse_call_output_raw_fallback() {
        let result = parse_call_output("plain text\n", "", 0);
        assert!(result.success);
        assert_eq!(result.output, "plain text\n");

        let result = parse_call_output("", "bad flag\n", 2);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("bad flag"));

        let result = parse_call_output("", "", 3);
        assert_eq!(result.error.as_deref(), Some("Exit code: 3"));
    }

    #[test]
    fn test_shell_result_appends_stderr() {
        let result = shell_result("out", "warn", 0);
        assert!(result.success);
        assert_eq!(result.output, "out\n[stderr]\nwarn");

        let result = shell_result("", "", 1);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Exit code: 1"));

        let result = shell_result("", "ERROR: No match found\n", 1);
        assert_eq!(
            result.error.as_deref(),
            Some("Exit code: 1\nERROR: No match found")
        );
    }
}
