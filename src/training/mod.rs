//! Training module for the DenseNet classifier
//!
//! - `state`: epoch/step bookkeeping and best-metric tracking
//! - `trainer`: the Burn training loop with best-AUC checkpointing

pub mod state;
pub mod trainer;

pub use state::{BestMetric, TrainingState, ValidationRecord};
pub use trainer::{Trainer, TrainingSummary};
