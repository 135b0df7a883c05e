//! External build/test toolchain
//!
//! The explorer never compiles or runs tests itself. Everything goes through
//! a [`Toolchain`], which the `dotnet` CLI implements.

mod dotnet;
mod output;
mod process;

use std::path::Path;

use async_trait::async_trait;

pub use dotnet::DotnetToolchain;
pub use output::{LineHandler, LineStreamer};
pub use process::{CancelSource, CancelToken, ProcessHandle, ProcessOutput};

use crate::Result;

/// A single test-execution request for one directory
#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    pub directory: &'a Path,
    /// `--filter` expression; `None` runs everything
    pub filter: Option<&'a str>,
    /// Where the toolchain writes the result file
    pub result_file: &'a Path,
    pub extra_args: &'a [String],
}

/// Operations the explorer needs from the external toolchain
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Name of this toolchain
    fn name(&self) -> &'static str;

    /// List the tests of a directory without running them
    async fn list_tests(&self, directory: &Path, extra_args: &[String])
        -> Result<ProcessOutput>;

    /// Build the project in a directory
    async fn build(&self, directory: &Path) -> Result<ProcessOutput>;

    /// Run tests, writing a result file
    ///
    /// The process is killed when `cancel` fires.
    async fn run_tests(&self, request: RunRequest<'_>, cancel: CancelToken)
        -> Result<ProcessOutput>;

    /// Start a long-lived watch process that re-runs tests on change
    async fn watch_tests(
        &self,
        directory: &Path,
        result_file: &Path,
        extra_args: &[String],
    ) -> Result<ProcessHandle>;

    /// Check if this toolchain is available on the system
    fn is_available(&self) -> bool;
}
