//! LLM integration for swebench-harness.
//!
//! ```ignore
//! use swebench_harness::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello!")])
//!     .with_tools(swebench_harness::scaffold::tools::tool_definitions());
//! let response = client.generate(request).await?;
//! ```

pub mod cost;
pub mod litellm;

pub use cost::{CostReport, CostTracker, ModelPricing};
pub use litellm::{
    Choice, FunctionCall, FunctionDefinition, GenerationRequest, GenerationResponse,
    LiteLlmClient, LlmProvider, Message, ToolCallInfo, ToolChoice, ToolDefinition, Usage,
};
