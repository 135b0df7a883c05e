//! Per-session result directory
//!
//! Test runs and watch processes write their result files into one
//! temporary directory. Runs use `{index}.trx` and watch processes use
//! `autoWatch{index}.trx`, so the two never collide.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::results::{ResultFileWatcher, RESULT_FILE_EXTENSION};
use crate::Result;

/// Prefix of the session directory name
const SESSION_PREFIX: &str = "test-explorer-";

/// A temporary result directory and the watch on it
///
/// The directory is removed when the session is dropped.
#[derive(Debug)]
pub struct ResultSession {
    _watcher: ResultFileWatcher,
    dir: TempDir,
}

impl ResultSession {
    /// Create a result directory under `staging_dir` and watch it
    ///
    /// `on_file` is called with the path of every settled result file.
    pub fn create<F>(staging_dir: &Path, on_file: F) -> Result<Self>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        std::fs::create_dir_all(staging_dir)?;
        let dir = tempfile::Builder::new()
            .prefix(SESSION_PREFIX)
            .tempdir_in(staging_dir)?;
        let watcher = ResultFileWatcher::start(dir.path(), RESULT_FILE_EXTENSION, on_file)?;
        tracing::info!(dir = %dir.path().display(), "Created test result directory");

        Ok(Self {
            _watcher: watcher,
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Result file for the run in the directory at `index`
    pub fn result_path(&self, index: usize) -> PathBuf {
        self.dir
            .path()
            .join(format!("{}.{}", index, RESULT_FILE_EXTENSION))
    }

    /// Result file for the watch process of the directory at `index`
    pub fn watch_result_path(&self, index: usize) -> PathBuf {
        self.dir
            .path()
            .join(format!("autoWatch{}.{}", index, RESULT_FILE_EXTENSION))
    }
}
