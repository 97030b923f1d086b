//! Inference module for model prediction and evaluation
//!
//! This module provides:
//! - Batched softmax prediction over a dataset
//! - The test-set classification report

pub mod evaluator;

pub use evaluator::{evaluate_test, predict, Predictions};
