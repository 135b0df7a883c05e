//! Events emitted by the orchestrator
//!
//! Consumers subscribe through [`crate::run::OrchestratorHandle::subscribe`].
//! Each event is delivered at most once per subscriber, in emission order.

use serde::Serialize;

use crate::discovery::DiscoveredTests;
use crate::filter::TestFilter;
use crate::results::ResultBatch;

/// Why a run request was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    /// A run is still waiting for result files
    AlreadyRunning,
    /// Discovery is in flight
    Discovering,
    /// No directory owns a test matching the filter
    NoMatchingDirectory,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectReason::AlreadyRunning => "tests already running",
            RejectReason::Discovering => "discovery in progress",
            RejectReason::NoMatchingDirectory => "no matching test directory",
        };
        write!(f, "{}", text)
    }
}

/// Something the explorer, status indicator or an editor should react to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ExplorerEvent {
    DiscoveryStarted,
    /// Directories that reported at least one test
    DiscoveryFinished(Vec<DiscoveredTests>),
    /// Tests matching the filter are now running
    RunStarted(TestFilter),
    NewResults(ResultBatch),
    RunRejected {
        filter: TestFilter,
        reason: RejectReason,
    },
    RunFailed {
        aborted: bool,
        message: String,
    },
}
