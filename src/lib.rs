//! # MedNIST Classifier
//!
//! Medical image classification on the MedNIST dataset with the Burn
//! framework: six classes of 64x64 grayscale scans (AbdomenCT, BreastMRI,
//! ChestCT, CXR, Hand, HeadCT) classified by a DenseNet-121.
//!
//! ## Modules
//!
//! - `dataset`: Fetching, cataloguing, splitting and transforming images
//! - `model`: DenseNet architecture, training config and checkpoints
//! - `training`: The training loop and its state
//! - `inference`: Batched prediction and the test report
//! - `utils`: Errors, logging, metrics and charts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mednist_classifier::dataset::{Catalog, DatasetSplits, SplitConfig};
//!
//! let catalog = Catalog::from_dir("data/MedNIST")?;
//! let splits = DatasetSplits::from_catalog(&catalog, SplitConfig::default())?;
//! println!("{}", splits.stats());
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{Catalog, DatasetSplits, MedNistBatcher, MedNistDataset, SplitConfig, SplitDatasets};
pub use inference::{evaluate_test, predict, Predictions};
pub use model::{DenseNet, DenseNetConfig, TrainingConfig};
pub use training::{Trainer, TrainingState, TrainingSummary};
pub use utils::error::{MedNistError, Result};
pub use utils::metrics::{ClassificationReport, ConfusionMatrix};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
