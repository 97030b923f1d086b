//! Training configuration
//!
//! Hyperparameters for one training run, serialisable to JSON so a run can be
//! reproduced and so the evaluation stage can rebuild the same split.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::split::SplitConfig;
use crate::utils::error::{MedNistError, Result};

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,

    /// Samples per batch for training, validation and test loaders
    pub batch_size: usize,

    /// Fixed Adam learning rate
    pub learning_rate: f64,

    /// Validate every N epochs
    pub val_interval: usize,

    /// Data loader worker threads
    pub num_workers: usize,

    /// Seed for the backend, loader shuffling and augmentation
    pub seed: u64,

    /// How the catalog is partitioned
    pub split: SplitConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 4,
            batch_size: 100,
            learning_rate: 1e-5,
            val_interval: 1,
            num_workers: 2,
            seed: 0,
            split: SplitConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(MedNistError::Config("epochs must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(MedNistError::Config("batch_size must be at least 1".to_string()));
        }
        if self.val_interval == 0 {
            return Err(MedNistError::Config("val_interval must be at least 1".to_string()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(MedNistError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        self.split.validate()
    }

    /// Whether validation runs after the given 1-based epoch
    pub fn is_validation_epoch(&self, epoch: usize) -> bool {
        epoch % self.val_interval == 0
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 4);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.learning_rate, 1e-5);
        assert_eq!(config.val_interval, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_training_config_validation() {
        let mut config = TrainingConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.learning_rate = -1.0;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.split.test_fraction = 0.95;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_epochs() {
        let config = TrainingConfig {
            val_interval: 2,
            ..Default::default()
        };
        assert!(!config.is_validation_epoch(1));
        assert!(config.is_validation_epoch(2));
        assert!(config.is_validation_epoch(4));
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = TrainingConfig {
            epochs: 10,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(TrainingConfig::load(&path).unwrap(), config);
    }
}
