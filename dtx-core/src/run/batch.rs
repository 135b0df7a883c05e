//! Bookkeeping for one run or discovery cycle

use crate::results::{ResultBatch, TestResult};

/// Expected versus received result files for the open run
///
/// Result files carry no reference to the run that produced them, so a run
/// is considered complete by counting files. A single-directory run closes
/// on the first file; later files for it are still delivered, just outside
/// the batch.
#[derive(Debug, Clone, Default)]
pub struct RunBatch {
    expected_files: usize,
    current_files: usize,
    results: Vec<TestResult>,
    clear_previous: bool,
    directory_count: usize,
}

impl RunBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of directories the next run may touch
    pub fn set_directory_count(&mut self, count: usize) {
        self.directory_count = count;
    }

    pub fn directory_count(&self) -> usize {
        self.directory_count
    }

    /// Whether a run is waiting for result files
    pub fn is_open(&self) -> bool {
        self.expected_files > 0
    }

    pub fn expected_files(&self) -> usize {
        self.expected_files
    }

    pub fn current_files(&self) -> usize {
        self.current_files
    }

    pub fn clear_previous(&self) -> bool {
        self.clear_previous
    }

    /// Open a batch for a run
    ///
    /// A run of every test expects one file per directory and replaces all
    /// known results. A scoped run expects one file and merges.
    pub fn open(&mut self, run_all: bool) {
        self.expected_files = if run_all { self.directory_count } else { 1 };
        self.current_files = 0;
        self.results.clear();
        self.clear_previous = run_all;
    }

    /// Record a parsed result file
    ///
    /// Returns the batch to deliver once the run is complete. A file that
    /// arrives with no batch open (a late file, or one from a watch process)
    /// is delivered on its own and merges into the known results.
    pub fn record_file(&mut self, results: Vec<TestResult>) -> Option<ResultBatch> {
        if !self.is_open() {
            return Some(ResultBatch {
                results,
                clear_previous: false,
            });
        }

        self.results.extend(results);
        self.current_files += 1;

        if self.directory_count == 1 || self.current_files >= self.expected_files {
            let batch = ResultBatch {
                results: std::mem::take(&mut self.results),
                clear_previous: self.clear_previous,
            };
            self.reset();
            return Some(batch);
        }

        None
    }

    /// Drop the open run, keeping the directory count
    pub fn reset(&mut self) {
        self.expected_files = 0;
        self.current_files = 0;
        self.results.clear();
        self.clear_previous = false;
    }
}
