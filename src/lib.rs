//! swebench-harness: run a tool-calling LLM agent against SWE-bench instances.
//!
//! The library drives an agent through a bounded query/dispatch loop inside
//! a disposable container, records every step as a trajectory, and runs many
//! instances concurrently with a resumable `preds.json` checkpoint.

pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod scaffold;
pub mod swe;
pub mod trajectory;

pub use error::{BatchError, ConfigError, DatasetError, LlmError, SandboxError, StorageError};
