//! Training loop bookkeeping
//!
//! `TrainingState` makes the loop's transitions explicit:
//!
//! ```text
//! Idle --begin_epoch--> InEpoch --record_step*--> InEpoch --end_epoch--> Idle
//! Idle --record_validation--> Idle   (after an epoch has ended)
//! ```
//!
//! It owns the loss history, the validation metric history and the best
//! metric tracker. Nothing here touches tensors.

use serde::{Deserialize, Serialize};

use crate::utils::error::{MedNistError, Result};
use crate::utils::metrics::RunningAverage;

/// Best validation metric seen so far.
///
/// Starts at -1 with no epoch; only a strictly greater value replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestMetric {
    pub value: f64,
    pub epoch: Option<usize>,
}

impl Default for BestMetric {
    fn default() -> Self {
        Self {
            value: -1.0,
            epoch: None,
        }
    }
}

impl BestMetric {
    /// Record an observation, returning whether it became the new best
    pub fn observe(&mut self, value: f64, epoch: usize) -> bool {
        if value > self.value {
            self.value = value;
            self.epoch = Some(epoch);
            true
        } else {
            false
        }
    }
}

/// One validation result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// 1-based epoch the validation ran after
    pub epoch: usize,
    /// Macro ROC AUC, `None` when undefined
    pub auc: Option<f64>,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    InEpoch,
}

/// Training state for monitoring and checkpoint decisions
#[derive(Debug, Clone)]
pub struct TrainingState {
    /// Last started epoch (1-based, 0 before the first)
    pub epoch: usize,
    /// Steps taken in the current epoch
    pub step: usize,
    /// Average training loss of each finished epoch
    pub epoch_losses: Vec<f64>,
    /// Every validation result in order
    pub validations: Vec<ValidationRecord>,
    pub best: BestMetric,
    epoch_loss: RunningAverage,
    phase: Phase,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self {
            epoch: 0,
            step: 0,
            epoch_losses: Vec::new(),
            validations: Vec::new(),
            best: BestMetric::default(),
            epoch_loss: RunningAverage::new(),
            phase: Phase::Idle,
        }
    }
}

impl TrainingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the next epoch and return its 1-based number
    pub fn begin_epoch(&mut self) -> Result<usize> {
        if self.phase != Phase::Idle {
            return Err(MedNistError::Training(format!(
                "epoch {} has not ended",
                self.epoch
            )));
        }
        self.epoch += 1;
        self.step = 0;
        self.epoch_loss.reset();
        self.phase = Phase::InEpoch;
        Ok(self.epoch)
    }

    /// Accumulate one batch loss and return the 1-based step number
    pub fn record_step(&mut self, loss: f64) -> Result<usize> {
        if self.phase != Phase::InEpoch {
            return Err(MedNistError::Training(
                "record_step called outside an epoch".to_string(),
            ));
        }
        if !loss.is_finite() {
            return Err(MedNistError::Training(format!(
                "non-finite loss {} at epoch {} step {}",
                loss,
                self.epoch,
                self.step + 1
            )));
        }
        self.step += 1;
        self.epoch_loss.add(loss);
        Ok(self.step)
    }

    /// Close the epoch and return its average loss
    pub fn end_epoch(&mut self) -> Result<f64> {
        if self.phase != Phase::InEpoch {
            return Err(MedNistError::Training(
                "end_epoch called outside an epoch".to_string(),
            ));
        }
        let average = self.epoch_loss.average();
        self.epoch_losses.push(average);
        self.phase = Phase::Idle;
        Ok(average)
    }

    /// Record a validation result for the last finished epoch.
    ///
    /// Returns true if the AUC strictly improved on the best so far. An
    /// undefined AUC never improves.
    pub fn record_validation(&mut self, auc: Option<f64>, accuracy: f64) -> Result<bool> {
        if self.phase != Phase::Idle || self.epoch == 0 {
            return Err(MedNistError::Training(
                "validation must follow a finished epoch".to_string(),
            ));
        }

        self.validations.push(ValidationRecord {
            epoch: self.epoch,
            auc,
            accuracy,
        });

        Ok(match auc {
            Some(value) => self.best.observe(value, self.epoch),
            None => false,
        })
    }

    /// `(epoch, auc)` for every validation with a defined AUC
    pub fn metric_points(&self) -> Vec<(usize, f64)> {
        self.validations
            .iter()
            .filter_map(|v| v.auc.map(|auc| (v.epoch, auc)))
            .collect()
    }
}
