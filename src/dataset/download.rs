//! MedNIST archive download and extraction
//!
//! Fetches the MedNIST tarball, verifies its MD5 digest, and unpacks it into
//! the data root. Each stage is skipped when its output already exists.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use md5::{Digest, Md5};
use tracing::{debug, info, warn};

use crate::utils::error::{MedNistError, Result};

/// Release asset holding the MedNIST images
pub const MEDNIST_URL: &str =
    "https://github.com/Project-MONAI/MONAI-extra-test-data/releases/download/0.8.1/MedNIST.tar.gz";

/// Expected MD5 digest of [`MEDNIST_URL`]
pub const MEDNIST_MD5: &str = "0bc7306e7427e00ad1c5526a6677552d";

/// Archive file name inside the data root
pub const ARCHIVE_NAME: &str = "MedNIST.tar.gz";

/// Directory the archive extracts to
pub const DATASET_DIR_NAME: &str = "MedNIST";

/// Location and checksum of a downloadable dataset archive
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    pub url: String,
    pub md5: String,
    pub archive_name: String,
    pub extracted_dir: String,
}

impl Default for ArchiveSource {
    fn default() -> Self {
        Self {
            url: MEDNIST_URL.to_string(),
            md5: MEDNIST_MD5.to_string(),
            archive_name: ARCHIVE_NAME.to_string(),
            extracted_dir: DATASET_DIR_NAME.to_string(),
        }
    }
}

/// Ensure the MedNIST dataset is present under `root_dir`.
///
/// Returns the extracted dataset directory.
pub fn ensure_mednist(root_dir: &Path) -> Result<PathBuf> {
    ensure_dataset(root_dir, &ArchiveSource::default())
}

/// Download, verify and extract `source` unless already present
pub fn ensure_dataset(root_dir: &Path, source: &ArchiveSource) -> Result<PathBuf> {
    let data_dir = root_dir.join(&source.extracted_dir);
    if data_dir.is_dir() {
        info!("Dataset already present at {:?}, skipping download", data_dir);
        return Ok(data_dir);
    }

    fs::create_dir_all(root_dir)?;
    let archive_path = root_dir.join(&source.archive_name);

    let have_valid_archive = archive_path.is_file() && {
        let digest = file_md5(&archive_path)?;
        if digest == source.md5 {
            true
        } else {
            warn!(
                "Existing archive {:?} has digest {}, downloading again",
                archive_path, digest
            );
            false
        }
    };

    if have_valid_archive {
        println!("  {} archive already downloaded", "✓".green());
    } else {
        download_file(&source.url, &archive_path)?;
        verify_md5(&archive_path, &source.md5)?;
    }

    println!("  Extracting {:?}...", archive_path);
    extract_tar_gz(&archive_path, root_dir)?;

    if !data_dir.is_dir() {
        return Err(MedNistError::Dataset(format!(
            "Archive did not contain {:?}",
            source.extracted_dir
        )));
    }

    println!("  {} dataset ready at {:?}", "✓".green(), data_dir);
    Ok(data_dir)
}

/// Stream `url` into `dest` with a progress bar
pub fn download_file(url: &str, dest: &Path) -> Result<()> {
    println!("  Downloading {}...", url);

    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| MedNistError::Download(format!("{}: {}", url, e)))?;

    let pb = match response.content_length() {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
            .map_err(|e| MedNistError::Config(e.to_string()))?
            .progress_chars("#>-"),
    );

    // renamed only once the body is fully written
    let partial = dest.with_extension("part");
    let mut file = File::create(&partial)?;
    let mut reader = pb.wrap_read(response);
    let written = io::copy(&mut reader, &mut file)?;
    pb.finish_and_clear();
    fs::rename(&partial, dest)?;

    debug!("Downloaded {} bytes to {:?}", written, dest);
    Ok(())
}

/// Hex MD5 digest of a file
pub fn file_md5(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Fail unless `path` has the expected MD5 digest
pub fn verify_md5(path: &Path, expected: &str) -> Result<()> {
    let actual = file_md5(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        debug!("Checksum verified for {:?}", path);
        Ok(())
    } else {
        Err(MedNistError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Extract tar.gz file
pub fn extract_tar_gz(tar_gz_path: &Path, output_dir: &Path) -> Result<()> {
    let tar_gz = File::open(tar_gz_path)?;
    let decompressor = flate2::read::GzDecoder::new(tar_gz);
    let mut archive = tar::Archive::new(decompressor);
    archive.unpack(output_dir)?;
    Ok(())
}
