//! Agent execution loop.
//!
//! One run alternates between querying the model and dispatching the tool
//! calls it requests:
//! 1. Init: render the system prompt and seed the history with the task
//! 2. Query: send the full history plus the tool catalogue, account cost
//! 3. Dispatch: record the reply, run its tool calls, look for a submission
//! 4. Repeat while `calls < step_limit` and `cost < cost_limit`
//!
//! Every run ends in exactly one [`ExitStatus`]; only a failure to reach
//! the model is reported as an error.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

use super::prompts::{render_system_prompt, COMPLETION_MARKER, DEFAULT_SYSTEM_TEMPLATE};
use super::tools::{tool_definitions, tools_description, ToolExecutor, ToolResult};
use crate::llm::{
    GenerationRequest, LlmProvider, Message, ModelPricing, ToolCallInfo, ToolDefinition,
};
use crate::trajectory::{ExitStatus, ModelStats, Trajectory};

/// Characters of tool output shown to the model per observation.
pub const MAX_OBSERVATION_CHARS: usize = 10_000;

/// Finish reasons that end the agent's turn for good when no tool was called.
const TERMINAL_FINISH_REASONS: &[&str] = &["stop", "end_turn"];

/// Errors that abort an agent run.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] crate::error::LlmError),

    #[error("Model returned no choices")]
    EmptyResponse,
}

/// Configuration for an agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Maximum number of model queries per run.
    pub step_limit: u32,
    /// Maximum estimated spend per run, in dollars.
    pub cost_limit: f64,
    pub temperature: f64,
    /// Working directory of the checked-out repository.
    pub cwd: String,
    /// Tool binary used for native tool calls.
    pub ash_binary: String,
    /// System prompt template; `{tools_description}` is substituted.
    pub system_template: String,
    pub pricing: ModelPricing,
    pub max_observation_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-sonnet-4-5-20250929".to_string(),
            step_limit: 250,
            cost_limit: 3.0,
            temperature: 0.0,
            cwd: "/testbed".to_string(),
            ash_binary: "ash".to_string(),
            system_template: DEFAULT_SYSTEM_TEMPLATE.to_string(),
            pricing: ModelPricing::default(),
            max_observation_chars: MAX_OBSERVATION_CHARS,
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_step_limit(mut self, step_limit: u32) -> Self {
        self.step_limit = step_limit;
        self
    }

    pub fn with_cost_limit(mut self, cost_limit: f64) -> Self {
        self.cost_limit = cost_limit;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_ash_binary(mut self, ash_binary: impl Into<String>) -> Self {
        self.ash_binary = ash_binary.into();
        self
    }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub exit_status: ExitStatus,
    pub submission: String,
    pub model_stats: ModelStats,
    pub trajectory: Trajectory,
}

/// What a dispatch step decided.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Continue,
    Submitted(String),
    Stopped,
}

/// Text after the line holding the completion marker, if the marker occurs.
///
/// Everything up to and including the first newline after the marker token
/// is dropped; a marker with nothing after its line yields an empty string.
pub fn extract_submission(text: &str) -> Option<String> {
    let idx = text.find(COMPLETION_MARKER)?;
    let rest = &text[idx + COMPLETION_MARKER.len()..];
    Some(match rest.find('\n') {
        Some(nl) => rest[nl + 1..].to_string(),
        None => String::new(),
    })
}

/// Submission signalled by assistant text: the marker must sit on the first line.
pub fn assistant_submission(text: &str) -> Option<String> {
    let first_line = text.trim_start().lines().next()?;
    if first_line.contains(COMPLETION_MARKER) {
        extract_submission(text)
    } else {
        None
    }
}

/// Cap an observation at `max_chars` characters with a truncation notice.
pub fn truncate_observation(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}\n... (truncated {} chars)", kept, total - max_chars)
}

fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(format!("Invalid tool arguments: expected a JSON object, got {}", other)),
        Err(e) => Err(format!("Invalid tool arguments: {}", e)),
    }
}

/// The agent state machine.
pub struct AgentLoop {
    llm_client: Arc<dyn LlmProvider>,
    config: AgentConfig,
    tools: Vec<ToolDefinition>,
}

impl AgentLoop {
    pub fn new(llm_client: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        Self {
            llm_client,
            config,
            tools: tool_definitions(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run the agent on `task` until it submits, stops, or runs out of budget.
    pub async fn run(
        &self,
        executor: &dyn ToolExecutor,
        task: &str,
        instance_id: &str,
    ) -> Result<AgentOutcome, AgentError> {
        let mut trajectory = Trajectory::new(instance_id);
        let system_prompt =
            render_system_prompt(&self.config.system_template, &tools_description());

        let mut messages = vec![Message::system(&system_prompt), Message::user(task)];
        trajectory.add_message("system", system_prompt, None);
        trajectory.add_message("user", task, None);

        let mut calls: u32 = 0;
        let mut cost = 0.0_f64;

        let (exit_status, submission) = loop {
            if calls >= self.config.step_limit || cost >= self.config.cost_limit {
                break (ExitStatus::LimitsExceeded, String::new());
            }

            let request = GenerationRequest::new(self.config.model.clone(), messages.clone())
                .with_temperature(self.config.temperature)
                .with_tools(self.tools.clone());
            let response = self.llm_client.generate(request).await?;
            calls += 1;
            cost += self.config.pricing.estimate(&response.usage);

            let choice = response
                .choices
                .into_iter()
                .next()
                .ok_or(AgentError::EmptyResponse)?;

            let step = self
                .dispatch(
                    executor,
                    choice.message.content,
                    choice.message.tool_calls.unwrap_or_default(),
                    choice.finish_reason.as_deref(),
                    &mut messages,
                    &mut trajectory,
                )
                .await;

            match step {
                Step::Continue => {}
                Step::Submitted(submission) => break (ExitStatus::Submitted, submission),
                Step::Stopped => break (ExitStatus::AgentStopped, String::new()),
            }
        };

        let model_stats = ModelStats {
            api_calls: calls,
            instance_cost: cost,
        };
        trajectory.finish(exit_status, submission.clone(), &self.config.model, model_stats);

        tracing::info!(
            instance = instance_id,
            exit_status = %exit_status,
            api_calls = calls,
            cost = cost,
            submission_chars = submission.len(),
            "Agent run finished"
        );

        Ok(AgentOutcome {
            exit_status,
            submission,
            model_stats,
            trajectory,
        })
    }

    async fn dispatch(
        &self,
        executor: &dyn ToolExecutor,
        content: String,
        tool_calls: Vec<ToolCallInfo>,
        finish_reason: Option<&str>,
        messages: &mut Vec<Message>,
        trajectory: &mut Trajectory,
    ) -> Step {
        if tool_calls.is_empty() {
            messages.push(Message::assistant(content.clone()));
            let submission = assistant_submission(&content);
            trajectory.add_message("assistant", content, None);

            if let Some(submission) = submission {
                return Step::Submitted(submission);
            }
            if finish_reason.is_some_and(|r| TERMINAL_FINISH_REASONS.contains(&r)) {
                return Step::Stopped;
            }
            tracing::debug!(finish_reason = ?finish_reason, "Idle turn without tool calls");
            return Step::Continue;
        }

        let calls_extra: Vec<Value> = tool_calls
            .iter()
            .map(|tc| {
                json!({
                    "id": tc.id,
                    "name": tc.function.name,
                    "arguments": tc.function.arguments,
                })
            })
            .collect();
        messages.push(Message::assistant_with_tool_calls(
            content.clone(),
            tool_calls.clone(),
        ));
        trajectory.add_message("assistant", content, Some(json!({ "tool_calls": calls_extra })));

        for tc in &tool_calls {
            let name = tc.function.name.as_str();
            let (args, result) = match parse_arguments(&tc.function.arguments) {
                Ok(args) => {
                    let result = executor.execute(name, &args).await;
                    (args, result)
                }
                Err(reason) => (
                    Value::String(tc.function.arguments.clone()),
                    ToolResult::failure(reason),
                ),
            };

            tracing::debug!(tool = name, success = result.success, "Tool call dispatched");

            let full_text = result.observation_text();
            let observation = truncate_observation(&full_text, self.config.max_observation_chars);
            messages.push(Message::tool_result(&tc.id, observation.clone()));
            trajectory.add_message(
                "tool_result",
                observation,
                Some(json!({
                    "tool_name": name,
                    "tool_args": args,
                    "success": result.success,
                })),
            );

            if let Some(submission) = extract_submission(&full_text) {
                return Step::Submitted(submission);
            }
        }

        Step::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationResponse, Usage};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedLlm {
        replies: Mutex<VecDeque<GenerationResponse>>,
        fallback: Option<GenerationResponse>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<GenerationResponse>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                fallback: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn repeating(reply: GenerationResponse) -> Self {
            Self {
                fallback: Some(reply),
                ..Self::new(vec![])
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.requests.lock().unwrap().push(request);
            let next = self.replies.lock().unwrap().pop_front();
            next.or_else(|| self.fallback.clone())
                .ok_or_else(|| LlmError::RequestFailed("script exhausted".to_string()))
        }
    }

    struct EchoExecutor {
        calls: Mutex<Vec<(String, Value)>>,
        output: String,
    }

    impl EchoExecutor {
        fn new(output: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                output: output.to_string(),
            }
        }
    }

    #[async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn execute(&self, tool_name: &str, arguments: &Value) -> ToolResult {
            self.calls
                .lock()
                .unwrap()
                .push((tool_name.to_string(), arguments.clone()));
            ToolResult::success(self.output.clone())
        }
    }

    fn reply(content: &str, calls: Vec<ToolCallInfo>, finish: &str, usage: Usage) -> GenerationResponse {
        GenerationResponse {
            id: "r".to_string(),
            model: "m".to_string(),
            choices: vec![Choice {
                index: 0,
                message: if calls.is_empty() {
                    Message::assistant(content)
                } else {
                    Message::assistant_with_tool_calls(content, calls)
                },
                finish_reason: Some(finish.to_string()),
            }],
            usage,
        }
    }

    fn shell_call(id: &str, command: &str) -> ToolCallInfo {
        ToolCallInfo::function(id, "shell", json!({ "command": command }).to_string())
    }

    fn small_usage() -> Usage {
        Usage {
            prompt_tokens: 100,
            completion_tokens: 10,
            total_tokens: 110,
        }
    }

    #[test]
    fn test_agent_config_default() {
        let config = AgentConfig::default();
        assert_eq!(config.model, "anthropic/claude-sonnet-4-5-20250929");
        assert_eq!(config.step_limit, 250);
        assert!((config.cost_limit - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.cwd, "/testbed");
        assert_eq!(config.ash_binary, "ash");
        assert!(config.system_template.contains("{tools_description}"));
    }

    #[test]
    fn test_agent_config_builder_and_yaml() {
        let config = AgentConfig::new()
            .with_model("gpt-4")
            .with_step_limit(10)
            .with_cost_limit(0.5)
            .with_temperature(0.2);
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.step_limit, 10);

        let parsed: AgentConfig =
            serde_yaml::from_str("model: other\nstep_limit: 7\n").expect("yaml");
        assert_eq!(parsed.model, "other");
        assert_eq!(parsed.step_limit, 7);
        assert_eq!(parsed.cwd, "/testbed");
    }

    #[test]
    fn test_extract_submission() {
        let text = format!("{}\ndiff --git a/x b/x\n+fix\n", COMPLETION_MARKER);
        assert_eq!(
            extract_submission(&text).as_deref(),
            Some("diff --git a/x b/x\n+fix\n")
        );
        assert_eq!(extract_submission(COMPLETION_MARKER).as_deref(), Some(""));
        assert_eq!(extract_submission("no marker here"), None);

        let shell_output = format!("building...\n{} \ndiff --git a/y b/y\n", COMPLETION_MARKER);
        assert_eq!(
            extract_submission(&shell_output).as_deref(),
            Some("diff --git a/y b/y\n")
        );
    }

    #[test]
    fn test_assistant_submission_requires_first_line() {
        let first = format!("  {}\ndiff", COMPLETION_MARKER);
        assert_eq!(assistant_submission(&first).as_deref(), Some("diff"));

        let later = format!("I will now print\n{}\ndiff", COMPLETION_MARKER);
        assert_eq!(assistant_submission(&later), None);
        assert_eq!(assistant_submission(""), None);
    }

    #[test]
    fn test_truncate_observation() {
        let text = "a".repeat(15_000);
        let truncated = truncate_observation(&text, MAX_OBSERVATION_CHARS);
        assert!(truncated.starts_with(&"a".repeat(10_000)));
        assert!(truncated.ends_with("\n... (truncated 5000 chars)"));
        assert_eq!(truncated.len(), 10_000 + "\n... (truncated 5000 chars)".len());

        assert_eq!(truncate_observation("short", 10), "short");
        assert_eq!(truncate_observation("ééé", 2), "éé\n... (truncated 1 chars)");
    }

    #[tokio::test]
    async fn test_submission_through_tool_observation() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            reply("", vec![shell_call("c1", "git diff > patch.txt")], "tool_calls", small_usage()),
            reply(
                "",
                vec![shell_call("c2", "echo marker && cat patch.txt")],
                "tool_calls",
                small_usage(),
            ),
        ]));
        let executor = ScriptedObservations::new(vec![
            ToolResult::success(""),
            ToolResult::success(format!("{}\ndiff --git a/x b/x\n", COMPLETION_MARKER)),
        ]);

        let agent = AgentLoop::new(llm.clone(), AgentConfig::default());
        let outcome = agent.run(&executor, "fix off-by-one", "inst-1").await.expect("run");

        assert_eq!(outcome.exit_status, ExitStatus::Submitted);
        assert_eq!(outcome.submission, "diff --git a/x b/x\n");
        assert_eq!(outcome.model_stats.api_calls, 2);
        assert_eq!(llm.request_count(), 2);

        let roles: Vec<&str> = outcome
            .trajectory
            .messages()
            .iter()
            .map(|m| m.role.as_str())
            .collect();
        assert_eq!(
            roles,
            vec!["system", "user", "assistant", "tool_result", "assistant", "tool_result"]
        );
        let extra = outcome.trajectory.messages()[3].extra.clone().expect("extra");
        assert_eq!(extra["tool_name"], "shell");
        assert_eq!(extra["tool_args"]["command"], "git diff > patch.txt");
        assert_eq!(extra["success"], true);
    }

    struct ScriptedObservations {
        results: Mutex<VecDeque<ToolResult>>,
        executed: Mutex<usize>,
    }

    impl ScriptedObservations {
        fn new(results: Vec<ToolResult>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                executed: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ToolExecutor for ScriptedObservations {
        async fn execute(&self, _tool_name: &str, _arguments: &Value) -> ToolResult {
            *self.executed.lock().unwrap() += 1;
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ToolResult::success("ok"))
        }
    }

    #[tokio::test]
    async fn test_submission_short_circuits_remaining_calls() {
        let llm = Arc::new(ScriptedLlm::new(vec![reply(
            "",
            vec![shell_call("c1", "submit"), shell_call("c2", "rm -rf build")],
            "tool_calls",
            small_usage(),
        )]));
        let executor = ScriptedObservations::new(vec![ToolResult::success(format!(
            "{}\npatch\n",
            COMPLETION_MARKER
        ))]);

        let agent = AgentLoop::new(llm, AgentConfig::default());
        let outcome = agent.run(&executor, "task", "inst").await.expect("run");
        assert_eq!(outcome.exit_status, ExitStatus::Submitted);
        assert_eq!(outcome.submission, "patch\n");
        assert_eq!(*executor.executed.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submission_in_assistant_text() {
        let text = format!("{}\ndiff --git a/x b/x\n...", COMPLETION_MARKER);
        let llm = Arc::new(ScriptedLlm::new(vec![reply(&text, vec![], "stop", small_usage())]));
        let agent = AgentLoop::new(llm, AgentConfig::default());
        let outcome = agent
            .run(&EchoExecutor::new(""), "task", "inst")
            .await
            .expect("run");
        assert_eq!(outcome.exit_status, ExitStatus::Submitted);
        assert_eq!(outcome.submission, "diff --git a/x b/x\n...");
        assert_eq!(outcome.trajectory.submission(), outcome.submission);
    }

    #[tokio::test]
    async fn test_marker_later_in_assistant_text_stops_without_submission() {
        let text = format!("Done. To submit run:\n{}\n", COMPLETION_MARKER);
        let llm = Arc::new(ScriptedLlm::new(vec![reply(&text, vec![], "stop", small_usage())]));
        let agent = AgentLoop::new(llm, AgentConfig::default());
        let outcome = agent
            .run(&EchoExecutor::new(""), "task", "inst")
            .await
            .expect("run");
        assert_eq!(outcome.exit_status, ExitStatus::AgentStopped);
        assert!(outcome.submission.is_empty());
    }

    #[tokio::test]
    async fn test_idle_turn_continues() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            reply("thinking...", vec![], "length", small_usage()),
            reply(&format!("{}\n", COMPLETION_MARKER), vec![], "stop", small_usage()),
        ]));
        let agent = AgentLoop::new(llm.clone(), AgentConfig::default());
        let outcome = agent
            .run(&EchoExecutor::new(""), "task", "inst")
            .await
            .expect("run");
        assert_eq!(outcome.exit_status, ExitStatus::Submitted);
        assert_eq!(outcome.submission, "");
        assert_eq!(llm.request_count(), 2);
    }

    #[tokio::test]
    async fn test_step_limit_is_exact() {
        let llm = Arc::new(ScriptedLlm::repeating(reply(
            "",
            vec![shell_call("c", "ls")],
            "tool_calls",
            small_usage(),
        )));
        let config = AgentConfig::default().with_step_limit(3);
        let agent = AgentLoop::new(llm.clone(), config);
        let executor = EchoExecutor::new("file.py");

        let outcome = agent.run(&executor, "task", "inst").await.expect("run");
        assert_eq!(outcome.exit_status, ExitStatus::LimitsExceeded);
        assert_eq!(llm.request_count(), 3);
        assert_eq!(outcome.model_stats.api_calls, 3);
        assert_eq!(executor.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_step_limit_never_queries() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let agent = AgentLoop::new(llm.clone(), AgentConfig::default().with_step_limit(0));
        let outcome = agent
            .run(&EchoExecutor::new(""), "task", "inst")
            .await
            .expect("run");
        assert_eq!(outcome.exit_status, ExitStatus::LimitsExceeded);
        assert_eq!(llm.request_count(), 0);
        assert_eq!(outcome.trajectory.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_cost_limit_stops_run() {
        let expensive = Usage {
            prompt_tokens: 2_000_000,
            completion_tokens: 0,
            total_tokens: 2_000_000,
        };
        let llm = Arc::new(ScriptedLlm::repeating(reply(
            "",
            vec![shell_call("c", "ls")],
            "tool_calls",
            expensive,
        )));
        let agent = AgentLoop::new(llm.clone(), AgentConfig::default());
        let outcome = agent
            .run(&EchoExecutor::new(""), "task", "inst")
            .await
            .expect("run");
        assert_eq!(outcome.exit_status, ExitStatus::LimitsExceeded);
        assert_eq!(llm.request_count(), 1);
        assert!((outcome.model_stats.instance_cost - 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invalid_arguments_become_error_observation() {
        let bad = ToolCallInfo::function("c1", "shell", "{not json");
        let llm = Arc::new(ScriptedLlm::new(vec![
            reply("", vec![bad], "tool_calls", small_usage()),
            reply("giving up", vec![], "stop", small_usage()),
        ]));
        let executor = EchoExecutor::new("");
        let agent = AgentLoop::new(llm.clone(), AgentConfig::default());
        let outcome = agent.run(&executor, "task", "inst").await.expect("run");

        assert_eq!(outcome.exit_status, ExitStatus::AgentStopped);
        assert!(executor.calls.lock().unwrap().is_empty());
        let observation = &outcome.trajectory.messages()[3];
        assert_eq!(observation.role, "tool_result");
        assert!(observation.content.starts_with("Error: Invalid tool arguments"));

        let requests = llm.requests.lock().unwrap();
        let last = requests.last().expect("second request");
        let tool_msg = last.messages.last().expect("tool message");
        assert_eq!(tool_msg.role, "tool");
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_requests_carry_catalogue_and_history() {
        let llm = Arc::new(ScriptedLlm::new(vec![reply(
            "",
            vec![],
            "stop",
            small_usage(),
        )]));
        let config = AgentConfig::default().with_model("test-model").with_temperature(0.3);
        let agent = AgentLoop::new(llm.clone(), config);
        agent
            .run(&EchoExecutor::new(""), "the task", "inst")
            .await
            .expect("run");

        let requests = llm.requests.lock().unwrap();
        let first = &requests[0];
        assert_eq!(first.model, "test-model");
        assert_eq!(first.temperature, Some(0.3));
        assert_eq!(first.tools.as_ref().map(Vec::len), Some(6));
        assert_eq!(first.messages[0].role, "system");
        assert!(first.messages[0].content.contains("- shell(command: string"));
        assert_eq!(first.messages[1].content, "the task");
    }

    #[tokio::test]
    async fn test_llm_error_aborts_run() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let agent = AgentLoop::new(llm, AgentConfig::default());
        let result = agent.run(&EchoExecutor::new(""), "task", "inst").await;
        assert!(matches!(result, Err(AgentError::Llm(_))));
    }
}
