//! MedNIST Dataset Catalog
//!
//! Scans a directory with one subdirectory per class and records every image
//! file as a labeled sample. The catalog is built once and never mutated.

use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::{MedNistError, Result, ResultExt};

/// File extensions treated as images
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Path to the image file
    pub path: PathBuf,
    /// Index of the class in the sorted class list
    pub label: usize,
    /// Class directory name (e.g. "ChestCT")
    pub class_name: String,
}

/// Immutable list of samples plus the sorted class names
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Root directory the catalog was built from
    pub root_dir: PathBuf,
    /// Samples grouped by class, classes in sorted order
    pub samples: Vec<Sample>,
    /// Class names, sorted alphabetically; index = label
    pub class_names: Vec<String>,
    /// Number of samples per label
    pub class_counts: Vec<usize>,
}

impl Catalog {
    /// Build a catalog from a directory
    ///
    /// The directory should be structured as:
    /// ```text
    /// root_dir/
    /// ├── AbdomenCT/
    /// │   ├── 000000.jpeg
    /// │   └── 000001.jpeg
    /// ├── BreastMRI/
    /// │   └── ...
    /// └── ...
    /// ```
    pub fn from_dir<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Building catalog from: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(MedNistError::PathNotFound(root_dir));
        }

        let mut class_names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_names.push(name.to_string());
                }
            }
        }
        class_names.sort();

        if class_names.is_empty() {
            return Err(MedNistError::Dataset(format!(
                "No class directories found in {:?}",
                root_dir
            )));
        }

        info!("Found {} classes", class_names.len());

        let mut samples = Vec::new();
        let mut class_counts = Vec::with_capacity(class_names.len());

        for (label, class_name) in class_names.iter().enumerate() {
            let class_dir = root_dir.join(class_name);

            let mut files: Vec<PathBuf> = Vec::new();
            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry?;
                if entry.file_type().is_file() && is_image_file(entry.path()) {
                    files.push(entry.into_path());
                }
            }

            debug!("Class '{}' (label {}): {} images", class_name, label, files.len());
            class_counts.push(files.len());

            samples.extend(files.into_iter().map(|path| Sample {
                path,
                label,
                class_name: class_name.clone(),
            }));
        }

        if samples.is_empty() {
            return Err(MedNistError::Dataset(format!(
                "No images found under {:?}",
                root_dir
            )));
        }

        info!("Catalogued {} samples", samples.len());

        Ok(Self {
            root_dir,
            samples,
            class_names,
            class_counts,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Labels of all samples, in catalog order
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Clone the samples at the given indices
    pub fn subset(&self, indices: &[usize]) -> Vec<Sample> {
        indices
            .iter()
            .filter_map(|&i| self.samples.get(i).cloned())
            .collect()
    }

    /// Width and height of the first image
    pub fn image_dimensions(&self) -> Result<(u32, u32)> {
        let first = self.samples.first().context("Catalog is empty")?;
        image::image_dimensions(&first.path)
            .map_err(|e| MedNistError::ImageLoad(first.path.clone(), e.to_string()))
    }

    /// Summary statistics for display
    pub fn stats(&self) -> Result<CatalogStats> {
        Ok(CatalogStats {
            total_samples: self.len(),
            image_dimensions: self.image_dimensions()?,
            class_names: self.class_names.clone(),
            class_counts: self.class_counts.clone(),
        })
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Statistics about the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_samples: usize,
    pub image_dimensions: (u32, u32),
    pub class_names: Vec<String>,
    pub class_counts: Vec<usize>,
}

impl CatalogStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\n{}", "Dataset Statistics:".bold());
        println!("  Total image count: {}", self.total_samples);
        println!(
            "  Image dimensions: {} x {}",
            self.image_dimensions.0, self.image_dimensions.1
        );
        println!("  Label names: {:?}", self.class_names);
        println!("  Label counts: {:?}", self.class_counts);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    /// Write `counts[i]` small grayscale PNGs into `root/<names[i]>/`
    pub(crate) fn write_fixture(root: &Path, names: &[&str], counts: &[usize], size: u32) {
        for (class_idx, (name, &count)) in names.iter().zip(counts).enumerate() {
            let dir = root.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..count {
                let img = GrayImage::from_fn(size, size, |x, y| {
                    Luma([((x + y) as usize * 7 + i * 13 + class_idx * 50) as u8])
                });
                img.save(dir.join(format!("{:06}.png", i))).unwrap();
            }
        }
    }

    #[test]
    fn test_catalog_sorted_classes_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        // created out of order on purpose
        write_fixture(dir.path(), &["B", "A"], &[5, 3], 8);

        let catalog = Catalog::from_dir(dir.path()).unwrap();
        assert_eq!(catalog.class_names, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(catalog.len(), 8);
        assert_eq!(catalog.class_counts, vec![3, 5]);
        assert_eq!(catalog.num_classes(), 2);

        let labels = catalog.labels();
        assert_eq!(labels.iter().filter(|&&l| l == 0).count(), 3);
        assert_eq!(labels.iter().filter(|&&l| l == 1).count(), 5);
        assert!(catalog.samples.iter().all(|s| s.class_name == catalog.class_names[s.label]));
    }

    #[test]
    fn test_catalog_files_sorted_within_class() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), &["A"], &[4], 8);

        let catalog = Catalog::from_dir(dir.path()).unwrap();
        let names: Vec<_> = catalog
            .samples
            .iter()
            .map(|s| s.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_catalog_ignores_non_images_and_stray_files() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), &["A"], &[2], 8);
        std::fs::write(dir.path().join("A").join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("README.md"), "x").unwrap();

        let catalog = Catalog::from_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.num_classes(), 1);
    }

    #[test]
    fn test_catalog_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = Catalog::from_dir(dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, MedNistError::PathNotFound(_)));
    }

    #[test]
    fn test_catalog_without_images_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Empty")).unwrap();
        assert!(Catalog::from_dir(dir.path()).is_err());
    }

    #[test]
    fn test_catalog_stats() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), &["Hand", "CXR"], &[2, 1], 16);

        let catalog = Catalog::from_dir(dir.path()).unwrap();
        let stats = catalog.stats().unwrap();
        assert_eq!(stats.total_samples, 3);
        assert_eq!(stats.image_dimensions, (16, 16));
        assert_eq!(stats.class_counts, vec![1, 2]);

        let subset = catalog.subset(&[2, 0]);
        assert_eq!(subset[0].class_name, "Hand");
        assert_eq!(subset[1].class_name, "CXR");
    }
}
