//! Batched prediction over a `MedNistDataset`
//!
//! Used both by the validation pass during training and by the final test
//! report. Runs on whatever backend the model lives on; callers pass
//! `model.valid()` so no autodiff graph is built.

use burn::data::dataloader::DataLoaderBuilder;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use tracing::debug;

use crate::dataset::burn_dataset::{MedNistBatch, MedNistBatcher, MedNistDataset, MedNistItem};
use crate::model::densenet::DenseNet;
use crate::utils::error::{MedNistError, Result};
use crate::utils::metrics::{self, ClassificationReport};

/// Softmax outputs and true labels, in loader order
#[derive(Debug, Clone, Default)]
pub struct Predictions {
    pub probabilities: Vec<Vec<f32>>,
    pub labels: Vec<usize>,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Argmax class of every row
    pub fn predicted_classes(&self) -> Vec<usize> {
        metrics::argmax_rows(&self.probabilities)
    }

    pub fn accuracy(&self) -> f64 {
        metrics::accuracy(&self.predicted_classes(), &self.labels)
    }

    /// One-vs-rest macro ROC AUC, `None` when any class is unscorable
    pub fn roc_auc(&self, num_classes: usize) -> Option<f64> {
        metrics::roc_auc_ovr_macro(&self.probabilities, &self.labels, num_classes)
    }
}

/// Run the model over every sample of `dataset` without shuffling.
///
/// Fails if any sample could not be loaded.
pub fn predict<B: Backend>(
    model: &DenseNet<B>,
    dataset: &MedNistDataset,
    batch_size: usize,
    num_workers: usize,
    device: &B::Device,
) -> Result<Predictions> {
    let expected = dataset.len();
    let loader = DataLoaderBuilder::<B, MedNistItem, MedNistBatch<B>>::new(MedNistBatcher::new())
        .batch_size(batch_size)
        .num_workers(num_workers)
        .set_device(device.clone())
        .build(dataset.clone());

    let mut predictions = Predictions::default();

    for batch in loader.iter() {
        let probabilities = model.forward_softmax(batch.images);
        let [_, num_classes] = probabilities.dims();

        let values = probabilities
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| MedNistError::Model(format!("Failed to read probabilities: {:?}", e)))?;
        let labels = batch
            .targets
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| MedNistError::Model(format!("Failed to read labels: {:?}", e)))?;

        predictions
            .probabilities
            .extend(values.chunks(num_classes.max(1)).map(|row| row.to_vec()));
        predictions.labels.extend(labels.into_iter().map(|l| l as usize));
    }

    if predictions.len() != expected {
        return Err(MedNistError::Dataset(format!(
            "Predicted {} of {} samples; see the log for load failures",
            predictions.len(),
            expected
        )));
    }

    debug!("Predicted {} samples", predictions.len());
    Ok(predictions)
}

/// Classification report of `model` on the test subset
pub fn evaluate_test<B: Backend>(
    model: &DenseNet<B>,
    dataset: &MedNistDataset,
    class_names: &[String],
    batch_size: usize,
    num_workers: usize,
    device: &B::Device,
) -> Result<ClassificationReport> {
    let predictions = predict(model, dataset, batch_size, num_workers, device)?;
    Ok(ClassificationReport::new(
        &predictions.predicted_classes(),
        &predictions.labels,
        class_names,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::catalog::tests::write_fixture;
    use crate::dataset::catalog::Catalog;
    use crate::dataset::transforms::Pipeline;
    use crate::model::densenet::DenseNetConfig;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn tiny_model(device: &<TestBackend as Backend>::Device) -> DenseNet<TestBackend> {
        let config = DenseNetConfig::new(2)
            .with_growth_rate(4)
            .with_init_features(8)
            .with_bn_size(2)
            .with_block_config(vec![1, 1]);
        DenseNet::new(&config, device)
    }

    #[test]
    fn test_predict_covers_every_sample_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), &["A", "B"], &[3, 2], 16);
        let catalog = Catalog::from_dir(dir.path()).unwrap();
        let dataset = MedNistDataset::new(catalog.samples.clone(), Pipeline::eval(), 0);

        let device = Default::default();
        let model = tiny_model(&device);
        let predictions = predict(&model, &dataset, 2, 1, &device).unwrap();

        assert_eq!(predictions.len(), 5);
        assert_eq!(predictions.labels, vec![0, 0, 0, 1, 1]);
        for row in &predictions.probabilities {
            assert_eq!(row.len(), 2);
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
        assert!(predictions.roc_auc(2).is_some());
    }

    #[test]
    fn test_predict_fails_on_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), &["A", "B"], &[2, 2], 16);
        let catalog = Catalog::from_dir(dir.path()).unwrap();
        std::fs::remove_file(&catalog.samples[3].path).unwrap();
        let dataset = MedNistDataset::new(catalog.samples.clone(), Pipeline::eval(), 0);

        let device = Default::default();
        let model = tiny_model(&device);
        assert!(predict(&model, &dataset, 2, 1, &device).is_err());
    }

    #[test]
    fn test_evaluate_test_report_covers_all_classes() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), &["A", "B"], &[2, 2], 16);
        let catalog = Catalog::from_dir(dir.path()).unwrap();
        let dataset = MedNistDataset::new(catalog.samples.clone(), Pipeline::eval(), 0);

        let device = Default::default();
        let model = tiny_model(&device);
        let report =
            evaluate_test(&model, &dataset, &catalog.class_names, 4, 1, &device).unwrap();

        assert_eq!(report.total_samples, 4);
        assert_eq!(report.per_class.len(), 2);
        assert!(report.render().contains("accuracy"));
    }

    #[test]
    fn test_predictions_metrics() {
        let predictions = Predictions {
            probabilities: vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.6, 0.4]],
            labels: vec![0, 1, 1],
        };
        assert_eq!(predictions.predicted_classes(), vec![0, 1, 0]);
        assert!((predictions.accuracy() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(predictions.roc_auc(2), Some(1.0));
    }
}
