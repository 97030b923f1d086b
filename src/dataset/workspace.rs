//! Data root resolution
//!
//! The data root comes from an explicit path, the `MONAI_DATA_DIRECTORY`
//! environment variable, or a fresh temporary directory. Only the temporary
//! directory is removed when the run finishes.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::info;

use crate::utils::error::Result;

/// Environment variable naming the persistent data root
pub const DATA_DIR_ENV: &str = "MONAI_DATA_DIRECTORY";

#[derive(Debug)]
enum Root {
    Persistent(PathBuf),
    Temporary(TempDir),
}

/// Directory holding the downloaded dataset, checkpoints and plots
#[derive(Debug)]
pub struct RunWorkspace {
    root: Root,
}

impl RunWorkspace {
    /// Resolve the root: `explicit`, then the environment, then a temp dir
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        let from_env = std::env::var_os(DATA_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::from_sources(explicit, from_env)
    }

    fn from_sources(explicit: Option<PathBuf>, from_env: Option<PathBuf>) -> Result<Self> {
        let root = match explicit.or(from_env) {
            Some(path) => {
                std::fs::create_dir_all(&path)?;
                Root::Persistent(path)
            }
            None => Root::Temporary(tempfile::Builder::new().prefix("mednist-").tempdir()?),
        };

        let workspace = Self { root };
        info!(
            "Data root: {:?} ({})",
            workspace.path(),
            if workspace.is_temporary() { "temporary" } else { "persistent" }
        );
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        match &self.root {
            Root::Persistent(path) => path,
            Root::Temporary(dir) => dir.path(),
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.root, Root::Temporary(_))
    }

    /// Remove the root if it is temporary; persistent roots are left alone
    pub fn cleanup(self) -> Result<()> {
        if let Root::Temporary(dir) = self.root {
            info!("Removing temporary data root {:?}", dir.path());
            dir.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_root_wins_and_survives_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("explicit");
        let env = dir.path().join("env");

        let ws = RunWorkspace::from_sources(Some(explicit.clone()), Some(env)).unwrap();
        assert_eq!(ws.path(), explicit.as_path());
        assert!(!ws.is_temporary());

        ws.cleanup().unwrap();
        assert!(explicit.is_dir());
    }

    #[test]
    fn test_env_root_used_when_no_explicit() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join("env");
        let ws = RunWorkspace::from_sources(None, Some(env.clone())).unwrap();
        assert_eq!(ws.path(), env.as_path());
    }

    #[test]
    fn test_temporary_root_removed() {
        let ws = RunWorkspace::from_sources(None, None).unwrap();
        assert!(ws.is_temporary());
        let path = ws.path().to_path_buf();
        assert!(path.is_dir());

        ws.cleanup().unwrap();
        assert!(!path.exists());
    }
}
