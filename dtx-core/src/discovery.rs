//! Test discovery
//!
//! Lists the tests of a directory with `dotnet test -t`. Discovery never
//! fails: a directory that cannot be listed reports zero tests and is pruned
//! by the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::toolchain::Toolchain;

/// Line that precedes the test list in `dotnet test -t` output
const LIST_MARKER: &str = "The following Tests are available";

/// Tests found in one directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredTests {
    pub directory: PathBuf,
    pub test_names: Vec<String>,
}

impl DiscoveredTests {
    pub fn empty(directory: &Path) -> Self {
        Self {
            directory: directory.to_path_buf(),
            test_names: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.test_names.is_empty()
    }
}

/// Extract test names from `dotnet test -t` output
///
/// Returns `None` if the output has no test list.
pub fn parse_test_list(stdout: &str) -> Option<Vec<String>> {
    let mut lines = stdout.lines();
    lines.by_ref().find(|line| line.trim_start().starts_with(LIST_MARKER))?;

    Some(
        lines
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// List the tests of one directory
pub async fn discover(
    toolchain: &dyn Toolchain,
    directory: &Path,
    extra_args: &[String],
    timeout: Duration,
) -> DiscoveredTests {
    let output = match tokio::time::timeout(timeout, toolchain.list_tests(directory, extra_args))
        .await
    {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::error!(dir = %directory.display(), error = %e, "Error while discovering tests");
            return DiscoveredTests::empty(directory);
        }
        Err(_) => {
            tracing::error!(
                dir = %directory.display(),
                timeout = ?timeout,
                "Timed out while discovering tests"
            );
            return DiscoveredTests::empty(directory);
        }
    };

    tracing::debug!(target: "dtx::runner_output", dir = %directory.display(), "{}", output.stdout);

    if !output.success() {
        tracing::error!(
            dir = %directory.display(),
            code = ?output.code,
            stderr = %output.stderr.trim(),
            "Listing tests failed"
        );
        return DiscoveredTests::empty(directory);
    }

    match parse_test_list(&output.stdout) {
        Some(test_names) => {
            tracing::info!(
                dir = %directory.display(),
                count = test_names.len(),
                "Discovered tests"
            );
            DiscoveredTests {
                directory: directory.to_path_buf(),
                test_names,
            }
        }
        None => {
            tracing::warn!(dir = %directory.display(), "No test list in toolchain output");
            DiscoveredTests::empty(directory)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::{CancelToken, ProcessHandle, ProcessOutput, RunRequest};
    use crate::{Error, Result};
    use async_trait::async_trait;

    const LISTING: &str = "\
Build started, please wait...
Build completed.

Test run for /work/Tests/bin/Debug/net8.0/Tests.dll (.NETCoreApp,Version=v8.0)
The following Tests are available:
    Tests.MathTests.Adds
    Tests.MathTests.Divides(a: 1, b: 2)

    Tests.StringTests.Trims
";

    struct Listing {
        output: Result<ProcessOutput>,
        delay: Duration,
    }

    #[async_trait]
    impl Toolchain for Listing {
        fn name(&self) -> &'static str {
            "listing"
        }

        async fn list_tests(&self, _: &Path, _: &[String]) -> Result<ProcessOutput> {
            tokio::time::sleep(self.delay).await;
            match &self.output {
                Ok(output) => Ok(output.clone()),
                Err(e) => Err(Error::Toolchain(e.to_string())),
            }
        }

        async fn build(&self, _: &Path) -> Result<ProcessOutput> {
            unreachable!()
        }

        async fn run_tests(&self, _: RunRequest<'_>, _: CancelToken) -> Result<ProcessOutput> {
            unreachable!()
        }

        async fn watch_tests(&self, _: &Path, _: &Path, _: &[String]) -> Result<ProcessHandle> {
            unreachable!()
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn listing(output: Result<ProcessOutput>) -> Listing {
        Listing {
            output,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_parse_test_list() {
        let names = parse_test_list(LISTING).unwrap();
        assert_eq!(
            names,
            vec![
                "Tests.MathTests.Adds",
                "Tests.MathTests.Divides(a: 1, b: 2)",
                "Tests.StringTests.Trims",
            ]
        );
    }

    #[test]
    fn test_parse_without_marker() {
        assert_eq!(parse_test_list("error CS1002: ; expected"), None);
        assert_eq!(
            parse_test_list("The following Tests are available:\n"),
            Some(vec![])
        );
    }

    #[tokio::test]
    async fn test_discover_success() {
        let toolchain = listing(Ok(ProcessOutput::exited(0, LISTING)));
        let found = discover(&toolchain, Path::new("/work/Tests"), &[], Duration::from_secs(5)).await;
        assert_eq!(found.directory, PathBuf::from("/work/Tests"));
        assert_eq!(found.test_names.len(), 3);
    }

    #[tokio::test]
    async fn test_discover_nonzero_exit_is_empty() {
        let toolchain = listing(Ok(ProcessOutput::exited(1, LISTING)));
        let found = discover(&toolchain, Path::new("/work/Tests"), &[], Duration::from_secs(5)).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_discover_spawn_error_is_empty() {
        let toolchain = listing(Err(Error::Toolchain("missing".into())));
        let found = discover(&toolchain, Path::new("/work/Tests"), &[], Duration::from_secs(5)).await;
        assert!(found.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_timeout_is_empty() {
        let toolchain = Listing {
            output: Ok(ProcessOutput::exited(0, LISTING)),
            delay: Duration::from_secs(60),
        };
        let found = discover(&toolchain, Path::new("/work/Tests"), &[], Duration::from_secs(1)).await;
        assert!(found.is_empty());
    }
}
