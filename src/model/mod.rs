//! Model module for the DenseNet classifier using the Burn framework
//!
//! This module provides:
//! - The DenseNet-121 style architecture
//! - Training hyperparameters
//! - Best-checkpoint save/load

pub mod checkpoint;
pub mod config;
pub mod densenet;

pub use checkpoint::{load_checkpoint, save_checkpoint, CheckpointMetadata};
pub use config::TrainingConfig;
pub use densenet::{DenseNet, DenseNetConfig};
