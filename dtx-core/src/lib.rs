//! dtx core - test explorer for dotnet test projects
//!
//! This crate discovers tests in a workspace, runs them through the `dotnet`
//! toolchain, and correlates the result files it writes back to a tree of
//! tests.

pub mod config;
pub mod directories;
pub mod discovery;
pub mod error;
pub mod events;
pub mod explorer;
pub mod filter;
pub mod results;
pub mod run;
pub mod status;
pub mod toolchain;
pub mod tree;
pub mod watch;

pub use config::{CliOverrides, Config, ExplorerConfig};
pub use directories::TestDirectories;
pub use discovery::DiscoveredTests;
pub use error::{Error, Result};
pub use events::{ExplorerEvent, RejectReason};
pub use explorer::{ExplorerView, TestExplorer};
pub use filter::TestFilter;
pub use results::{ResultBatch, TestOutcome, TestResult};
pub use run::{Orchestrator, OrchestratorHandle};
pub use status::StatusBar;
pub use toolchain::{DotnetToolchain, Toolchain};
pub use tree::{NodeIcon, TestNode};
