//! Integration tests for the LLM client.
//!
//! These tests make real API calls to OpenRouter.
//! Run with: OPENROUTER_API_KEY=your_key cargo test --test llm_integration -- --ignored

use std::sync::Arc;

use swebench_harness::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
use swebench_harness::scaffold::tools::tool_definitions;
use swebench_harness::scaffold::{AgentConfig, AgentLoop, ToolExecutor, ToolResult};

const TEST_MODEL: &str = "anthropic/claude-sonnet-4-5-20250929";

fn get_test_api_key() -> String {
    std::env::var("OPENROUTER_API_KEY")
        .expect("OPENROUTER_API_KEY environment variable must be set for integration tests")
}

fn create_test_client() -> LiteLlmClient {
    LiteLlmClient::new_with_defaults(get_test_api_key())
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_generation() {
    let client = create_test_client();

    let request = GenerationRequest::new(
        TEST_MODEL,
        vec![
            Message::system("You are a helpful assistant. Reply concisely."),
            Message::user("What is 2 + 2? Reply with just the number."),
        ],
    )
    .with_max_tokens(10)
    .with_temperature(0.0);

    let response = client.generate(request).await.expect("Generation should succeed");
    let content = response.first_content().expect("Should have content");
    assert!(content.contains('4'), "Response should contain '4', got: {}", content);
    assert!(response.usage.total_tokens > 0, "Should have token usage");
}

#[tokio::test]
#[ignore]
async fn test_model_requests_tool_call() {
    let client = create_test_client();

    let request = GenerationRequest::new(
        TEST_MODEL,
        vec![
            Message::system("Use the provided tools to answer."),
            Message::user("Show the git status of the repository using the git_status tool."),
        ],
    )
    .with_tools(tool_definitions())
    .with_max_tokens(200)
    .with_temperature(0.0);

    let response = client.generate(request).await.expect("Generation should succeed");
    let calls = response.choices[0]
        .message
        .tool_calls
        .clone()
        .unwrap_or_default();
    assert!(
        calls.iter().any(|c| c.function.name == "git_status"),
        "Expected a git_status call, got: {:?}",
        calls
    );
}

struct CannedShell;

#[async_trait::async_trait]
impl ToolExecutor for CannedShell {
    async fn execute(&self, _tool_name: &str, _arguments: &serde_json::Value) -> ToolResult {
        ToolResult::success(
            "COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT\ndiff --git a/README b/README\n+hello\n",
        )
    }
}

#[tokio::test]
#[ignore]
async fn test_agent_loop_against_live_model() {
    let config = AgentConfig::new()
        .with_model(TEST_MODEL)
        .with_step_limit(5)
        .with_cost_limit(0.5);
    let agent = AgentLoop::new(Arc::new(create_test_client()), config);

    let outcome = agent
        .run(
            &CannedShell,
            "Add the line 'hello' to README, then submit your change.",
            "live__smoke-1",
        )
        .await
        .expect("agent run");

    assert!(outcome.model_stats.api_calls >= 1);
    assert!(outcome.model_stats.api_calls <= 5);
}
