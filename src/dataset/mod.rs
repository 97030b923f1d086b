//! Dataset module for MedNIST data handling
//!
//! This module provides functionality for:
//! - Resolving the data root and fetching the MedNIST archive
//! - Cataloguing class-labeled image folders
//! - Deterministic train/validation/test splits
//! - The per-sample transform pipeline
//! - Burn `Dataset`/`Batcher` integration

pub mod burn_dataset;
pub mod catalog;
pub mod download;
pub mod split;
pub mod transforms;
pub mod workspace;

pub use burn_dataset::{
    EpochCounter, MedNistBatch, MedNistBatcher, MedNistDataset, MedNistItem, SplitDatasets,
};
pub use catalog::{Catalog, CatalogStats, Sample};
pub use download::{ensure_mednist, MEDNIST_MD5, MEDNIST_URL};
pub use split::{partition_indices, DatasetSplits, SplitConfig, SplitIndices};
pub use transforms::{ImageArray, Pipeline, Transform};
pub use workspace::{RunWorkspace, DATA_DIR_ENV};
