//! Error types for dtx

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for dtx operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for dtx operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed result file
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Invalid test project glob
    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    /// Result file watch could not be set up
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The external toolchain could not be started or failed unexpectedly
    #[error("Toolchain error: {0}")]
    Toolchain(String),

    /// Build step failed for a test directory
    #[error("Build command failed in {}", directory.display())]
    BuildFailed { directory: PathBuf },

    /// Test process was killed before it finished
    #[error("Test run was aborted")]
    Aborted,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error means the user cancelled the run
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}
