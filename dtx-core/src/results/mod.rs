//! Test results
//!
//! Results come from result files written by the toolchain. Each result is
//! keyed by the test's fully-qualified name; a newer result for the same name
//! replaces the older one.

mod trx;
mod watcher;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use trx::{parse_trx, parse_trx_file};
pub use watcher::ResultFileWatcher;

/// Extension of the result files the toolchain writes
pub const RESULT_FILE_EXTENSION: &str = "trx";

/// Outcome of a single test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestOutcome {
    Passed,
    Failed,
    NotExecuted,
}

impl TestOutcome {
    /// Map a raw outcome string from a result file
    ///
    /// Error-like outcomes count as failures; anything else that did not
    /// pass counts as not executed.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "Passed" => TestOutcome::Passed,
            "Failed" | "Error" | "Timeout" | "Aborted" => TestOutcome::Failed,
            _ => TestOutcome::NotExecuted,
        }
    }

    /// Rank used when aggregating over a folder; higher wins
    pub fn severity(&self) -> u8 {
        match self {
            TestOutcome::Passed => 1,
            TestOutcome::NotExecuted => 2,
            TestOutcome::Failed => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TestOutcome::Passed => "Passed",
            TestOutcome::Failed => "Failed",
            TestOutcome::NotExecuted => "NotExecuted",
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Fully-qualified test name
    pub full_name: String,
    pub outcome: TestOutcome,
    /// Failure message, if the test reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure stack trace, if the test reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl TestResult {
    pub fn new(full_name: impl Into<String>, outcome: TestOutcome) -> Self {
        Self {
            full_name: full_name.into(),
            outcome,
            message: None,
            stack_trace: None,
        }
    }
}

/// Results delivered together once a run batch completes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultBatch {
    pub results: Vec<TestResult>,
    /// Replace all previously known results instead of merging
    pub clear_previous: bool,
}

/// Counts per outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    pub passed: usize,
    pub failed: usize,
    pub not_executed: usize,
}

impl OutcomeSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a TestResult>) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.outcome {
                TestOutcome::Passed => summary.passed += 1,
                TestOutcome::Failed => summary.failed += 1,
                TestOutcome::NotExecuted => summary.not_executed += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.not_executed
    }
}

/// Latest known result for every test that has reported one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownResults {
    by_name: BTreeMap<String, TestResult>,
}

impl KnownResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge results in arrival order; later results win
    pub fn merge<I>(&mut self, results: I)
    where
        I: IntoIterator<Item = TestResult>,
    {
        for result in results {
            self.by_name.insert(result.full_name.clone(), result);
        }
    }

    /// Result for an exact test name
    pub fn get(&self, full_name: &str) -> Option<&TestResult> {
        self.by_name.get(full_name)
    }

    /// Results for `prefix` itself and every name nested below it
    pub fn under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a TestResult> + 'a {
        self.by_name
            .range(prefix.to_string()..)
            .take_while(move |(name, _)| name.starts_with(prefix))
            .filter(move |(name, _)| {
                name.len() == prefix.len() || name[prefix.len()..].starts_with('.')
            })
            .map(|(_, result)| result)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestResult> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn summary(&self) -> OutcomeSummary {
        OutcomeSummary::from_results(self.iter())
    }
}
