//! Train/validation/test partitioning
//!
//! The partition shuffles the identity permutation with a seeded ChaCha8 RNG
//! and slices it: the first `floor(test_fraction * n)` indices form the test
//! set, the next `floor(validation_fraction * n)` the validation set, and the
//! rest the training set. In stratified mode the same procedure runs inside
//! each class so every subset keeps the class proportions.
//!
//! The split is deterministic: the same seed and size always give the same
//! partition.

use std::path::Path;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::catalog::Catalog;
use crate::utils::error::{MedNistError, Result};

/// Configuration for dataset splitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of samples for the validation set
    pub validation_fraction: f64,
    /// Fraction of samples for the held-out test set
    pub test_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
    /// Split each class separately
    pub stratified: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.1,
            test_fraction: 0.1,
            seed: 0,
            stratified: true,
        }
    }
}

impl SplitConfig {
    /// Create a validated split configuration
    pub fn new(validation_fraction: f64, test_fraction: f64, seed: u64, stratified: bool) -> Result<Self> {
        let config = Self {
            validation_fraction,
            test_fraction,
            seed,
            stratified,
        };
        config.validate()?;
        Ok(config)
    }

    /// Fractions must lie in [0, 1) and leave room for training data
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("Validation", self.validation_fraction),
            ("Test", self.test_fraction),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(MedNistError::Config(format!(
                    "{} fraction must be in [0.0, 1.0), got {}",
                    name, value
                )));
            }
        }

        if self.validation_fraction + self.test_fraction >= 1.0 {
            return Err(MedNistError::Config(
                "Test + validation fractions must be less than 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Three disjoint index sets into a catalog
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitIndices {
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    /// Append another partition whose indices are given relative to `members`
    fn extend_mapped(&mut self, other: SplitIndices, members: &[usize]) {
        self.train.extend(other.train.into_iter().map(|i| members[i]));
        self.validation
            .extend(other.validation.into_iter().map(|i| members[i]));
        self.test.extend(other.test.into_iter().map(|i| members[i]));
    }
}

/// Partition `0..n` into train/validation/test.
///
/// Sizes are truncated: `floor(test_fraction * n)` test and
/// `floor(validation_fraction * n)` validation indices, remainder train.
pub fn partition_indices(
    n: usize,
    validation_fraction: f64,
    test_fraction: f64,
    seed: u64,
) -> SplitIndices {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((test_fraction * n as f64).floor() as usize).min(n);
    let n_val = ((validation_fraction * n as f64).floor() as usize).min(n - n_test);

    let validation_end = n_test + n_val;
    SplitIndices {
        test: indices[..n_test].to_vec(),
        validation: indices[n_test..validation_end].to_vec(),
        train: indices[validation_end..].to_vec(),
    }
}

/// A catalog split into train/validation/test index sets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplits {
    pub config: SplitConfig,
    pub indices: SplitIndices,
    pub class_names: Vec<String>,
    pub total_samples: usize,
}

impl DatasetSplits {
    /// Split a catalog according to `config`
    pub fn from_catalog(catalog: &Catalog, config: SplitConfig) -> Result<Self> {
        config.validate()?;

        let indices = if config.stratified {
            Self::stratified_split(&catalog.labels(), catalog.num_classes(), &config)
        } else {
            partition_indices(
                catalog.len(),
                config.validation_fraction,
                config.test_fraction,
                config.seed,
            )
        };

        let splits = Self {
            config,
            indices,
            class_names: catalog.class_names.clone(),
            total_samples: catalog.len(),
        };

        info!(
            "Split {} samples: train={}, validation={}, test={}",
            splits.total_samples,
            splits.indices.train.len(),
            splits.indices.validation.len(),
            splits.indices.test.len()
        );

        Ok(splits)
    }

    /// Partition within each class, class `c` seeded with `seed + c`.
    ///
    /// Each merged subset is then shuffled with `seed`, so no subset is
    /// ordered by class.
    fn stratified_split(labels: &[usize], num_classes: usize, config: &SplitConfig) -> SplitIndices {
        let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); num_classes];
        for (idx, &label) in labels.iter().enumerate() {
            if let Some(members) = by_class.get_mut(label) {
                members.push(idx);
            }
        }

        let mut result = SplitIndices::default();
        for (class_idx, members) in by_class.iter().enumerate() {
            let local = partition_indices(
                members.len(),
                config.validation_fraction,
                config.test_fraction,
                config.seed.wrapping_add(class_idx as u64),
            );
            result.extend_mapped(local, members);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        result.train.shuffle(&mut rng);
        result.validation.shuffle(&mut rng);
        result.test.shuffle(&mut rng);

        result
    }

    pub fn stats(&self) -> SplitStats {
        SplitStats {
            total_samples: self.total_samples,
            train_size: self.indices.train.len(),
            validation_size: self.indices.validation.len(),
            test_size: self.indices.test.len(),
            num_classes: self.class_names.len(),
        }
    }

    /// Save splits to a JSON file for reproducibility
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load splits from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Statistics about dataset splits
#[derive(Debug, Clone)]
pub struct SplitStats {
    pub total_samples: usize,
    pub train_size: usize,
    pub validation_size: usize,
    pub test_size: usize,
    pub num_classes: usize,
}

impl std::fmt::Display for SplitStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pct = |n: usize| 100.0 * n as f64 / self.total_samples.max(1) as f64;
        writeln!(f, "Dataset Split Statistics:")?;
        writeln!(f, "  Total samples: {}", self.total_samples)?;
        writeln!(f, "  Number of classes: {}", self.num_classes)?;
        writeln!(f, "  Training count: {} ({:.1}%)", self.train_size, pct(self.train_size))?;
        writeln!(
            f,
            "  Validation count: {} ({:.1}%)",
            self.validation_size,
            pct(self.validation_size)
        )?;
        writeln!(f, "  Test count: {} ({:.1}%)", self.test_size, pct(self.test_size))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::catalog::tests::write_fixture;
    use std::collections::HashSet;

    fn assert_partition(split: &SplitIndices, n: usize) {
        let all: HashSet<usize> = split
            .train
            .iter()
            .chain(&split.validation)
            .chain(&split.test)
            .copied()
            .collect();
        assert_eq!(split.total(), n, "every index assigned exactly once");
        assert_eq!(all.len(), n, "no duplicates");
        assert!(all.iter().all(|&i| i < n));
    }

    #[test]
    fn test_partition_sizes_truncate() {
        let split = partition_indices(58954, 0.1, 0.1, 0);
        assert_eq!(split.test.len(), 5895);
        assert_eq!(split.validation.len(), 5895);
        assert_eq!(split.train.len(), 58954 - 2 * 5895);

        let split = partition_indices(9, 0.1, 0.1, 0);
        assert_eq!(split.test.len(), 0);
        assert_eq!(split.validation.len(), 0);
        assert_eq!(split.train.len(), 9);
    }

    #[test]
    fn test_partition_is_disjoint_and_exhaustive() {
        for n in [0, 1, 7, 10, 100, 257] {
            for seed in [0, 1, 42] {
                assert_partition(&partition_indices(n, 0.2, 0.15, seed), n);
            }
        }
    }

    #[test]
    fn test_partition_reproducible() {
        let a = partition_indices(500, 0.1, 0.1, 7);
        let b = partition_indices(500, 0.1, 0.1, 7);
        assert_eq!(a, b);

        let c = partition_indices(500, 0.1, 0.1, 8);
        assert_ne!(a.test, c.test);
    }

    #[test]
    fn test_config_validation() {
        assert!(SplitConfig::new(0.1, 0.1, 0, true).is_ok());
        assert!(SplitConfig::new(0.5, 0.5, 0, true).is_err());
        assert!(SplitConfig::new(-0.1, 0.1, 0, false).is_err());
        assert!(SplitConfig::new(0.1, 1.0, 0, false).is_err());
    }

    #[test]
    fn test_stratified_split_per_class_counts() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), &["A", "B"], &[20, 20], 4);
        let catalog = Catalog::from_dir(dir.path()).unwrap();

        let splits = DatasetSplits::from_catalog(&catalog, SplitConfig::default()).unwrap();
        assert_partition(&splits.indices, 40);

        let labels = catalog.labels();
        for class in 0..2 {
            let count = |set: &[usize]| set.iter().filter(|&&i| labels[i] == class).count();
            assert_eq!(count(&splits.indices.train), 16);
            assert_eq!(count(&splits.indices.validation), 2);
            assert_eq!(count(&splits.indices.test), 2);
        }
    }

    #[test]
    fn test_stratified_train_set_interleaves_classes() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), &["A", "B", "C", "D"], &[50, 50, 50, 50], 4);
        let catalog = Catalog::from_dir(dir.path()).unwrap();
        let splits = DatasetSplits::from_catalog(&catalog, SplitConfig::default()).unwrap();

        let labels = catalog.labels();
        let train = &splits.indices.train;
        let (first, second) = train.split_at(train.len() / 2);
        for half in [first, second] {
            let classes: HashSet<usize> = half.iter().map(|&i| labels[i]).collect();
            assert_eq!(classes.len(), 4);
        }

        let again = DatasetSplits::from_catalog(&catalog, SplitConfig::default()).unwrap();
        assert_eq!(again.indices, splits.indices);
    }

    #[test]
    fn test_global_split_on_catalog() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), &["A", "B"], &[20, 20], 4);
        let catalog = Catalog::from_dir(dir.path()).unwrap();

        let config = SplitConfig::new(0.1, 0.1, 0, false).unwrap();
        let splits = DatasetSplits::from_catalog(&catalog, config).unwrap();
        assert_eq!(splits.indices.test.len(), 4);
        assert_eq!(splits.indices.validation.len(), 4);
        assert_eq!(splits.indices.train.len(), 32);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path().join("data").as_path(), &["A"], &[10], 4);
        let catalog = Catalog::from_dir(dir.path().join("data")).unwrap();
        let splits = DatasetSplits::from_catalog(&catalog, SplitConfig::default()).unwrap();

        let path = dir.path().join("splits.json");
        splits.save(&path).unwrap();
        let loaded = DatasetSplits::load(&path).unwrap();
        assert_eq!(loaded.indices, splits.indices);
        assert_eq!(loaded.config, splits.config);

        let text = loaded.stats().to_string();
        assert!(text.contains("Training count: 8"));
    }
}
