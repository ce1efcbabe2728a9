//! Trajectory recording and storage.
//!
//! A [`Trajectory`] is owned by one agent run. Messages are appended in
//! chronological order and the exit status is recorded exactly once when
//! the run reaches a terminal state. [`TrajectoryStorage`] persists the
//! result as `trajectories/<instance_id>.json`.

pub mod storage;
pub mod types;

pub use storage::{read_json, trajectory_file_name, write_json_atomic, TrajectoryStorage};
pub use types::{
    ExitStatus, FileInfo, ModelStats, Trajectory, TrajectoryFile, TrajectoryInfo,
    TrajectoryMessage, TRAJECTORY_FORMAT,
};
