//! Burn Dataset Integration for MedNIST
//!
//! `MedNistDataset` implements Burn's `Dataset` trait over a subset of the
//! catalog and runs the transform pipeline lazily in `get`, so the data
//! loader's worker threads do the image decoding. `MedNistBatcher` stacks the
//! transformed samples into tensors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::dataset::catalog::{Catalog, Sample};
use crate::dataset::split::DatasetSplits;
use crate::dataset::transforms::Pipeline;
use crate::utils::error::Result;

/// A single transformed MedNIST sample ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MedNistItem {
    /// Image data as flattened CHW float array
    pub image: Vec<f32>,
    /// `[channels, height, width]`
    pub shape: [usize; 3],
    /// Class label
    pub label: usize,
    /// Image path (for logging)
    pub path: String,
}

/// Shared epoch counter that re-seeds the random transforms every epoch
#[derive(Clone, Debug, Default)]
pub struct EpochCounter(Arc<AtomicU64>);

impl EpochCounter {
    pub fn set(&self, epoch: u64) {
        self.0.store(epoch, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Catalog subset plus transform pipeline, evaluated lazily per index
#[derive(Debug, Clone)]
pub struct MedNistDataset {
    samples: Vec<Sample>,
    pipeline: Pipeline,
    seed: u64,
    epoch: EpochCounter,
}

impl MedNistDataset {
    pub fn new(samples: Vec<Sample>, pipeline: Pipeline, seed: u64) -> Self {
        Self {
            samples,
            pipeline,
            seed,
            epoch: EpochCounter::default(),
        }
    }

    /// Handle used by the training loop to advance the augmentation seed
    pub fn epoch_counter(&self) -> EpochCounter {
        self.epoch.clone()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// RNG for one sample, independent of which worker loads it
    fn rng_for(&self, index: usize) -> ChaCha8Rng {
        let epoch_seed = self
            .seed
            .wrapping_add(self.epoch.get().wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut rng = ChaCha8Rng::seed_from_u64(epoch_seed);
        rng.set_stream(index as u64);
        rng
    }

    /// Load and transform one sample, reporting failures
    pub fn try_get(&self, index: usize) -> Option<Result<MedNistItem>> {
        let sample = self.samples.get(index)?;
        let mut rng = self.rng_for(index);

        Some(self.pipeline.apply(&sample.path, &mut rng).and_then(|array| {
            let (c, h, w) = array.chw("MedNistDataset")?;
            Ok(MedNistItem {
                image: array.data,
                shape: [c, h, w],
                label: sample.label,
                path: sample.path.to_string_lossy().to_string(),
            })
        }))
    }
}

impl Dataset<MedNistItem> for MedNistDataset {
    /// A failed load ends the loader's iteration early; the training loop
    /// compares processed counts against `len` and aborts on mismatch.
    fn get(&self, index: usize) -> Option<MedNistItem> {
        match self.try_get(index)? {
            Ok(item) => Some(item),
            Err(e) => {
                error!("Failed to load sample {}: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// The three datasets of a run; only training gets random transforms
#[derive(Debug, Clone)]
pub struct SplitDatasets {
    pub train: MedNistDataset,
    pub validation: MedNistDataset,
    pub test: MedNistDataset,
}

impl SplitDatasets {
    pub fn new(catalog: &Catalog, splits: &DatasetSplits, seed: u64) -> Self {
        let indices = &splits.indices;
        Self {
            train: MedNistDataset::new(catalog.subset(&indices.train), Pipeline::train(), seed),
            validation: MedNistDataset::new(
                catalog.subset(&indices.validation),
                Pipeline::eval(),
                seed,
            ),
            test: MedNistDataset::new(catalog.subset(&indices.test), Pipeline::eval(), seed),
        }
    }
}

/// Batch of MedNIST samples
#[derive(Clone, Debug)]
pub struct MedNistBatch<B: Backend> {
    /// Batch of images with shape [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher that stacks transformed samples into tensors
#[derive(Clone, Debug, Default)]
pub struct MedNistBatcher;

impl MedNistBatcher {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Batcher<B, MedNistItem, MedNistBatch<B>> for MedNistBatcher {
    fn batch(&self, items: Vec<MedNistItem>, device: &B::Device) -> MedNistBatch<B> {
        let batch_size = items.len();
        let [channels, height, width] = items.first().map(|item| item.shape).unwrap_or([1, 0, 0]);

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        MedNistBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::catalog::tests::write_fixture;
    use crate::dataset::catalog::Catalog;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn fixture_catalog(dir: &std::path::Path) -> Catalog {
        write_fixture(dir, &["A", "B"], &[3, 2], 8);
        Catalog::from_dir(dir).unwrap()
    }

    #[test]
    fn test_dataset_len_and_item() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = fixture_catalog(dir.path());
        let dataset = MedNistDataset::new(catalog.samples.clone(), Pipeline::eval(), 0);

        assert_eq!(dataset.len(), 5);
        let item = dataset.get(4).unwrap();
        assert_eq!(item.shape, [1, 8, 8]);
        assert_eq!(item.image.len(), 64);
        assert_eq!(item.label, 1);
        assert!(dataset.get(5).is_none());
    }

    #[test]
    fn test_missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = fixture_catalog(dir.path());
        std::fs::remove_file(&catalog.samples[0].path).unwrap();

        let dataset = MedNistDataset::new(catalog.samples.clone(), Pipeline::eval(), 0);
        assert!(dataset.get(0).is_none());
        assert!(matches!(dataset.try_get(0), Some(Err(_))));
    }

    #[test]
    fn test_augmentation_reproducible_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = fixture_catalog(dir.path());
        let dataset = MedNistDataset::new(catalog.samples.clone(), Pipeline::train(), 3);

        let first = dataset.get(1).unwrap();
        let again = dataset.get(1).unwrap();
        assert_eq!(first.image, again.image);

        let counter = dataset.epoch_counter();
        counter.set(1);
        assert_eq!(dataset.epoch_counter().get(), 1);
        counter.set(0);
        assert_eq!(dataset.get(1).unwrap().image, first.image);
    }

    #[test]
    fn test_split_datasets_pipelines() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), &["A", "B"], &[10, 10], 8);
        let catalog = Catalog::from_dir(dir.path()).unwrap();
        let splits = DatasetSplits::from_catalog(&catalog, Default::default()).unwrap();

        let datasets = SplitDatasets::new(&catalog, &splits, 0);
        assert_eq!(datasets.train.len(), 16);
        assert_eq!(datasets.validation.len(), 2);
        assert_eq!(datasets.test.len(), 2);
        assert!(datasets.validation.pipeline.is_deterministic());
        assert!(!datasets.train.pipeline.is_deterministic());
    }

    #[test]
    fn test_multi_worker_train_batches_mix_classes() {
        use burn::data::dataloader::DataLoaderBuilder;

        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), &["A", "B", "C", "D"], &[50, 50, 50, 50], 8);
        let catalog = Catalog::from_dir(dir.path()).unwrap();
        let splits = DatasetSplits::from_catalog(&catalog, Default::default()).unwrap();
        let datasets = SplitDatasets::new(&catalog, &splits, 0);

        let loader =
            DataLoaderBuilder::<TestBackend, MedNistItem, MedNistBatch<TestBackend>>::new(
                MedNistBatcher::new(),
            )
            .batch_size(20)
            .shuffle(0)
            .num_workers(2)
            .build(datasets.train);

        for _ in 0..2 {
            let mut batches = 0;
            for batch in loader.iter() {
                let labels = batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap();
                assert!(labels.iter().any(|&l| l < 2), "batch lacks classes 0/1: {:?}", labels);
                assert!(labels.iter().any(|&l| l >= 2), "batch lacks classes 2/3: {:?}", labels);
                batches += 1;
            }
            assert_eq!(batches, 8);
        }
    }

    #[test]
    fn test_batcher_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = fixture_catalog(dir.path());
        let dataset = MedNistDataset::new(catalog.samples.clone(), Pipeline::eval(), 0);
        let items: Vec<MedNistItem> = (0..dataset.len()).filter_map(|i| dataset.get(i)).collect();

        let device = Default::default();
        let batch: MedNistBatch<TestBackend> = MedNistBatcher::new().batch(items, &device);
        assert_eq!(batch.images.dims(), [5, 1, 8, 8]);
        assert_eq!(batch.targets.dims(), [5]);

        let labels = batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(labels, vec![0, 0, 0, 1, 1]);
    }
}
