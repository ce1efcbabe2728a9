//! File storage for trajectories.
//!
//! Each trajectory lives at `<base>/<instance_id>.json`. Files are written
//! to a sibling temp file and renamed into place so readers never observe
//! a partially written document.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use super::types::Trajectory;
use crate::error::StorageError;

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub async fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StorageError::Json {
        path: path.display().to_string(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StorageError::Persist {
            path: path.display().to_string(),
            reason: "path has no file name".to_string(),
        })?;
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| io_error(&tmp_path, e))?;
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(io_error(path, e));
    }
    Ok(())
}

/// Read and deserialize a JSON file.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let contents = fs::read_to_string(path)
        .await
        .map_err(|e| io_error(path, e))?;
    serde_json::from_str(&contents).map_err(|source| StorageError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// File name used for an instance's trajectory.
pub fn trajectory_file_name(instance_id: &str) -> String {
    format!("{}.json", instance_id.replace(['/', '\\'], "__"))
}

/// Local file storage for trajectories.
#[derive(Debug, Clone)]
pub struct TrajectoryStorage {
    base_path: PathBuf,
}

impl TrajectoryStorage {
    /// Creates a storage rooted at `base_path` (usually `<output>/trajectories`).
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn path_for(&self, instance_id: &str) -> PathBuf {
        self.base_path.join(trajectory_file_name(instance_id))
    }

    /// Saves a trajectory and returns where it was written.
    pub async fn save(&self, trajectory: &Trajectory) -> Result<PathBuf, StorageError> {
        let path = self.path_for(trajectory.instance_id());
        write_json_atomic(&path, &trajectory.to_file()).await?;
        tracing::debug!(instance = %trajectory.instance_id(), path = %path.display(), "Saved trajectory");
        Ok(path)
    }
}
