//! Trajectory data types.
//!
//! A trajectory is the append-only transcript of one agent run plus its
//! outcome. On disk it uses the `ash-agent-1.0` layout:
//! `{trajectory_format, messages, info: {model_stats, exit_status, submission}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::swe::checkpoint::Prediction;

/// Format tag written into every trajectory file.
pub const TRAJECTORY_FORMAT: &str = "ash-agent-1.0";

/// Terminal state of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitStatus {
    /// The completion marker was seen; the submission may be empty.
    Submitted,
    /// The step or cost budget ran out first.
    LimitsExceeded,
    /// The model ended its turn without tools and without submitting.
    AgentStopped,
}

impl ExitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitStatus::Submitted => "Submitted",
            ExitStatus::LimitsExceeded => "LimitsExceeded",
            ExitStatus::AgentStopped => "AgentStopped",
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryMessage {
    /// "system", "user", "assistant" or "tool_result".
    pub role: String,
    pub content: String,
    /// Structured metadata, e.g. tool name, arguments and success flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Model usage for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub api_calls: u32,
    pub instance_cost: f64,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryInfo {
    pub exit_status: ExitStatus,
    pub submission: String,
    pub model: String,
}

/// The transcript and outcome of one agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    instance_id: String,
    messages: Vec<TrajectoryMessage>,
    model_stats: ModelStats,
    info: Option<TrajectoryInfo>,
}

impl Trajectory {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            messages: Vec::new(),
            model_stats: ModelStats::default(),
            info: None,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Messages in the order they were recorded.
    pub fn messages(&self) -> &[TrajectoryMessage] {
        &self.messages
    }

    pub fn model_stats(&self) -> ModelStats {
        self.model_stats
    }

    /// The recorded outcome, once the run has finished.
    pub fn info(&self) -> Option<&TrajectoryInfo> {
        self.info.as_ref()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.info.as_ref().map(|i| i.exit_status)
    }

    pub fn submission(&self) -> &str {
        self.info.as_ref().map_or("", |i| i.submission.as_str())
    }

    /// Append a message. Ignored once the run has finished.
    pub fn add_message(&mut self, role: &str, content: impl Into<String>, extra: Option<Value>) {
        if self.info.is_some() {
            tracing::warn!(instance = %self.instance_id, role = role, "Message after finish ignored");
            return;
        }
        self.messages.push(TrajectoryMessage {
            role: role.to_string(),
            content: content.into(),
            extra,
        });
    }

    /// Record the terminal state. Only the first call has any effect.
    pub fn finish(
        &mut self,
        exit_status: ExitStatus,
        submission: impl Into<String>,
        model: impl Into<String>,
        model_stats: ModelStats,
    ) -> bool {
        if self.info.is_some() {
            tracing::warn!(instance = %self.instance_id, "Trajectory already finished");
            return false;
        }
        self.model_stats = model_stats;
        self.info = Some(TrajectoryInfo {
            exit_status,
            submission: submission.into(),
            model: model.into(),
        });
        true
    }

    /// The on-disk representation.
    pub fn to_file(&self) -> TrajectoryFile {
        TrajectoryFile {
            trajectory_format: TRAJECTORY_FORMAT.to_string(),
            messages: self.messages.clone(),
            info: FileInfo {
                model_stats: self.model_stats,
                exit_status: self
                    .exit_status()
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                submission: self.submission().to_string(),
            },
        }
    }

    /// Prediction record for this run.
    pub fn to_prediction(&self, model_name_or_path: &str) -> Prediction {
        Prediction {
            instance_id: self.instance_id.clone(),
            model_patch: self.submission().to_string(),
            model_name_or_path: model_name_or_path.to_string(),
            exit_status: self
                .exit_status()
                .map(|s| s.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Serialized trajectory file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryFile {
    pub trajectory_format: String,
    pub messages: Vec<TrajectoryMessage>,
    pub info: FileInfo,
}

/// `info` block of a trajectory file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub model_stats: ModelStats,
    pub exit_status: String,
    pub submission: String,
}
