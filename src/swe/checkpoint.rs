//! Batch checkpoint: the `preds.json` prediction list.
//!
//! The file is a JSON array rewritten in full after every recorded result.
//! Writes are serialized behind the store's mutex and replace the file
//! atomically, so it is valid JSON at every point of a batch.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::trajectory::{read_json, write_json_atomic};

/// Checkpoint file name inside the output directory.
pub const PREDICTIONS_FILE: &str = "preds.json";

/// Exit status recorded when the sandbox never reached `Running`.
pub const ENVIRONMENT_ERROR_STATUS: &str = "EnvironmentError";

/// One instance's result, in the format consumed by SWE-bench evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub instance_id: String,
    #[serde(default)]
    pub model_patch: String,
    #[serde(default)]
    pub model_name_or_path: String,
    #[serde(default)]
    pub exit_status: String,
}

impl Prediction {
    pub fn environment_error(instance_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            model_patch: String::new(),
            model_name_or_path: model.into(),
            exit_status: ENVIRONMENT_ERROR_STATUS.to_string(),
        }
    }

    /// Result of an instance whose run failed unexpectedly.
    pub fn error(
        instance_id: impl Into<String>,
        model: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            model_patch: String::new(),
            model_name_or_path: model.into(),
            exit_status: format!("Error: {}", message),
        }
    }

    pub fn has_patch(&self) -> bool {
        !self.model_patch.trim().is_empty()
    }
}

/// Predictions of a batch, persisted to `<output>/preds.json`.
#[derive(Debug)]
pub struct PredictionStore {
    path: PathBuf,
    predictions: Mutex<Vec<Prediction>>,
}

impl PredictionStore {
    /// Open the checkpoint in `output_dir`, loading earlier predictions if present.
    pub async fn open(output_dir: &Path) -> Result<Self, StorageError> {
        let path = output_dir.join(PREDICTIONS_FILE);
        let predictions: Vec<Prediction> = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            read_json(&path).await?
        } else {
            Vec::new()
        };

        if !predictions.is_empty() {
            tracing::info!(path = %path.display(), completed = predictions.len(), "Loaded checkpoint");
        }

        Ok(Self {
            path,
            predictions: Mutex::new(predictions),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ids that already have a prediction.
    pub async fn completed_ids(&self) -> HashSet<String> {
        self.predictions
            .lock()
            .await
            .iter()
            .map(|p| p.instance_id.clone())
            .collect()
    }

    /// Record a prediction and rewrite the checkpoint.
    ///
    /// A prediction for an id that is already present replaces the old one.
    pub async fn record(&self, prediction: Prediction) -> Result<(), StorageError> {
        let mut predictions = self.predictions.lock().await;
        match predictions
            .iter_mut()
            .find(|p| p.instance_id == prediction.instance_id)
        {
            Some(existing) => *existing = prediction,
            None => predictions.push(prediction),
        }
        write_json_atomic(&self.path, &*predictions).await
    }

    /// Rewrite the checkpoint with the current predictions.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let predictions = self.predictions.lock().await;
        write_json_atomic(&self.path, &*predictions).await
    }
}
