//! Best-model checkpoint persistence
//!
//! The parameters are written at full precision with Burn's
//! `NamedMpkFileRecorder` (`best_metric_model.mpk`) next to a JSON sidecar
//! carrying what is needed to rebuild and interpret the model: its config,
//! the class names, and the metric and epoch that produced it.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::config::TrainingConfig;
use crate::model::densenet::{DenseNet, DenseNetConfig};
use crate::utils::error::{MedNistError, Result};

/// File stem of the parameter record; the recorder appends `.mpk`
pub const MODEL_FILE_STEM: &str = "best_metric_model";

/// Full-precision MessagePack recorder
type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Sidecar file name
pub const METADATA_FILE: &str = "best_metric_model.json";

/// Metadata stored next to the best checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// 1-based epoch that produced the checkpoint
    pub epoch: usize,
    /// Validation AUC at that epoch
    pub metric: f64,
    /// Validation accuracy at that epoch
    pub accuracy: f64,
    pub class_names: Vec<String>,
    pub model: DenseNetConfig,
    pub training: TrainingConfig,
    pub timestamp: String,
}

impl CheckpointMetadata {
    pub fn new(
        epoch: usize,
        metric: f64,
        accuracy: f64,
        class_names: Vec<String>,
        model: DenseNetConfig,
        training: TrainingConfig,
    ) -> Self {
        Self {
            epoch,
            metric,
            accuracy,
            class_names,
            model,
            training,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Path of the parameter record without extension
pub fn model_path(dir: &Path) -> PathBuf {
    dir.join(MODEL_FILE_STEM)
}

/// Whether a complete checkpoint exists in `dir`
pub fn checkpoint_exists(dir: &Path) -> bool {
    model_path(dir).with_extension("mpk").is_file() && dir.join(METADATA_FILE).is_file()
}

/// Write parameters and sidecar, replacing any previous checkpoint
pub fn save_checkpoint<B: Backend>(
    model: &DenseNet<B>,
    metadata: &CheckpointMetadata,
    dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = model_path(dir);

    model
        .clone()
        .save_file(&path, &CheckpointRecorder::new())
        .map_err(|e| MedNistError::Model(format!("Failed to save model: {:?}", e)))?;
    metadata.save(&dir.join(METADATA_FILE))?;

    info!(
        "Checkpoint saved to {:?} (epoch {}, AUC {:.4})",
        path, metadata.epoch, metadata.metric
    );
    Ok(path)
}

/// Rebuild the model from the sidecar config and load its parameters
pub fn load_checkpoint<B: Backend>(
    dir: &Path,
    device: &B::Device,
) -> Result<(DenseNet<B>, CheckpointMetadata)> {
    let metadata_path = dir.join(METADATA_FILE);
    if !metadata_path.is_file() {
        return Err(MedNistError::PathNotFound(metadata_path));
    }
    let metadata = CheckpointMetadata::load(&metadata_path)?;

    let model = DenseNet::<B>::new(&metadata.model, device)
        .load_file(model_path(dir), &CheckpointRecorder::new(), device)
        .map_err(|e| MedNistError::Model(format!("Failed to load model: {:?}", e)))?;

    info!("Checkpoint loaded from {:?} (epoch {})", dir, metadata.epoch);
    Ok((model, metadata))
}
