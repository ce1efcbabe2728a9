//! Agent scaffold: prompts, the tool catalogue and executors, and the loop.
//!
//! ```ignore
//! use swebench_harness::scaffold::{AgentConfig, AgentLoop, CliToolExecutor};
//!
//! let agent = AgentLoop::new(llm_client, AgentConfig::default());
//! let executor = CliToolExecutor::new("ash");
//! let outcome = agent.run(&executor, &task, "django__django-11099").await?;
//! ```

pub mod agent_loop;
pub mod prompts;
pub mod tools;

pub use agent_loop::{
    assistant_submission, extract_submission, truncate_observation, AgentConfig, AgentError,
    AgentLoop, AgentOutcome, MAX_OBSERVATION_CHARS,
};
pub use prompts::{
    format_task_prompt, render_system_prompt, COMPLETION_MARKER, DEFAULT_SYSTEM_TEMPLATE,
};
pub use tools::{CliToolExecutor, McpToolExecutor, ToolExecutor, ToolResult};
