//! Supervised Training Loop
//!
//! A hand-written loop over Burn's `DataLoader`: forward, cross-entropy,
//! backward and an Adam step per batch, then a validation pass on the
//! inner backend every `val_interval` epochs. The parameters with the best
//! validation AUC are checkpointed.

use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::DataLoaderBuilder,
    data::dataset::Dataset,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use colored::Colorize;
use tracing::{debug, info};

use crate::dataset::burn_dataset::{MedNistBatch, MedNistBatcher, MedNistDataset, MedNistItem};
use crate::inference::evaluator::predict;
use crate::model::checkpoint::{save_checkpoint, CheckpointMetadata};
use crate::model::config::TrainingConfig;
use crate::model::densenet::{DenseNet, DenseNetConfig};
use crate::training::state::{BestMetric, TrainingState, ValidationRecord};
use crate::utils::error::{MedNistError, Result};
use crate::utils::logging::TrainingLogger;

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub epoch_losses: Vec<f64>,
    pub validations: Vec<ValidationRecord>,
    /// `(epoch, auc)` for validations with a defined AUC
    pub metric_points: Vec<(usize, f64)>,
    pub best: BestMetric,
    pub checkpoint_dir: PathBuf,
    pub elapsed_secs: f64,
}

impl TrainingSummary {
    /// Whether any epoch produced a checkpoint
    pub fn has_checkpoint(&self) -> bool {
        self.best.epoch.is_some()
    }
}

/// Trains a DenseNet on the autodiff backend `B`
pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    model_config: DenseNetConfig,
    class_names: Vec<String>,
    checkpoint_dir: PathBuf,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(
        config: TrainingConfig,
        model_config: DenseNetConfig,
        class_names: Vec<String>,
        checkpoint_dir: &Path,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;
        model_config.validate().map_err(MedNistError::Config)?;
        if model_config.num_classes != class_names.len() {
            return Err(MedNistError::Config(format!(
                "Model has {} outputs but the catalog has {} classes",
                model_config.num_classes,
                class_names.len()
            )));
        }

        Ok(Self {
            config,
            model_config,
            class_names,
            checkpoint_dir: checkpoint_dir.to_path_buf(),
            device,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train for the configured number of epochs
    pub fn fit(&self, train: MedNistDataset, validation: MedNistDataset) -> Result<TrainingSummary> {
        if train.is_empty() {
            return Err(MedNistError::Training("Training set is empty".to_string()));
        }

        let config = &self.config;
        B::seed(config.seed);

        let mut model = DenseNet::<B>::new(&self.model_config, &self.device);
        let mut optimizer = AdamConfig::new().init();
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);

        let train_len = train.len();
        let steps_per_epoch = train_len / config.batch_size;
        let epoch_counter = train.epoch_counter();

        let train_loader =
            DataLoaderBuilder::<B, MedNistItem, MedNistBatch<B>>::new(MedNistBatcher::new())
                .batch_size(config.batch_size)
                .shuffle(config.seed)
                .num_workers(config.num_workers)
                .set_device(self.device.clone())
                .build(train);

        info!(
            "Training on {} samples, validating on {} samples",
            train_len,
            validation.len()
        );

        let mut state = TrainingState::new();
        let mut logger = TrainingLogger::new(config.epochs);

        for _ in 0..config.epochs {
            let epoch = state.begin_epoch()?;
            epoch_counter.set(epoch as u64 - 1);
            logger.start_epoch(epoch);

            println!("{}", "-".repeat(10));
            println!("{}", format!("epoch {}/{}", epoch, config.epochs).yellow().bold());

            let mut processed = 0usize;
            for batch in train_loader.iter() {
                processed += batch.targets.dims()[0];

                let logits = model.forward(batch.images);
                let loss = loss_fn.forward(logits, batch.targets);
                let loss_value: f64 = loss.clone().into_scalar().elem();

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(config.learning_rate, model, grads);

                let step = state.record_step(loss_value)?;
                println!("{}/{}, train_loss: {:.4}", step, steps_per_epoch, loss_value);
            }

            if processed != train_len {
                return Err(MedNistError::Training(format!(
                    "Epoch {} saw {} of {} training samples; see the log for load failures",
                    epoch, processed, train_len
                )));
            }

            let average_loss = state.end_epoch()?;
            logger.end_epoch(average_loss);
            println!("epoch {} average loss: {:.4}", epoch, average_loss);

            if !config.is_validation_epoch(epoch) {
                continue;
            }

            let predictions = predict(
                &model.valid(),
                &validation,
                config.batch_size,
                config.num_workers,
                &self.device,
            )?;
            let auc = predictions.roc_auc(self.class_names.len());
            let accuracy = predictions.accuracy();
            logger.log_validation(auc, accuracy);

            if state.record_validation(auc, accuracy)? {
                let metadata = CheckpointMetadata::new(
                    epoch,
                    state.best.value,
                    accuracy,
                    self.class_names.clone(),
                    self.model_config.clone(),
                    config.clone(),
                );
                save_checkpoint(&model, &metadata, &self.checkpoint_dir)?;
                println!("{}", "saved new best metric model".green());
            }

            println!(
                "current epoch: {} current AUC: {} current accuracy: {:.4} best AUC: {:.4} at epoch: {}",
                epoch,
                auc.map(|v| format!("{:.4}", v))
                    .unwrap_or_else(|| "undefined".to_string()),
                accuracy,
                state.best.value,
                state
                    .best
                    .epoch
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            );
        }

        println!(
            "{}",
            format!(
                "train completed, best_metric: {:.4} at epoch: {}",
                state.best.value,
                state
                    .best
                    .epoch
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "-".to_string())
            )
            .green()
            .bold()
        );
        logger.log_complete(state.best.value, state.best.epoch);
        debug!("Epoch losses: {:?}", state.epoch_losses);

        Ok(TrainingSummary {
            metric_points: state.metric_points(),
            epoch_losses: state.epoch_losses,
            validations: state.validations,
            best: state.best,
            checkpoint_dir: self.checkpoint_dir.clone(),
            elapsed_secs: logger.elapsed_secs(),
        })
    }
}
