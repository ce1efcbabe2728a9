//! Error types for swebench-harness operations.
//!
//! Defines error types for the major subsystems:
//! - LLM API interactions
//! - Sandbox (container) lifecycle
//! - Configuration loading and validation
//! - Trajectory and checkpoint persistence
//! - Batch-level aborts
//! - Benchmark instance loading

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors that can occur while bringing up or tearing down a sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Image '{image}' unavailable: {reason}")]
    ImageUnavailable { image: String, reason: String },

    #[error("Container launch failed for image '{image}': {reason}")]
    LaunchFailed { image: String, reason: String },

    #[error("Failed to run container runtime '{binary}': {source}")]
    RuntimeUnavailable {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Container runtime command '{command}' timed out after {secs}s")]
    CommandTimeout { command: String, secs: u64 },

    #[error("Invalid sandbox state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },
}

impl SandboxError {
    /// Errors that will recur for every instance, so a batch must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RuntimeUnavailable { .. })
    }
}

/// Errors that end a batch early.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Batch aborted: {0}")]
    RuntimeUnavailable(String),
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors that can occur while persisting trajectories or predictions.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error at '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to persist '{path}': {reason}")]
    Persist { path: String, reason: String },
}

/// Errors that can occur while loading benchmark instances.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read dataset '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid record at {location}: {source}")]
    InvalidRecord {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid slice '{0}': expected 'start:end'")]
    InvalidSlice(String),

    #[error("Invalid filter pattern: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("Instance '{0}' not found in dataset")]
    InstanceNotFound(String),
}
