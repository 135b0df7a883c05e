//! Test runs
//!
//! The [`Orchestrator`] owns the run state machine. A [`RunBatch`] counts the
//! result files of the open run and a [`ResultSession`] provides the
//! directory they are written to.

mod batch;
mod orchestrator;
mod session;

pub use batch::RunBatch;
pub use orchestrator::{Message, Orchestrator, OrchestratorHandle};
pub use session::ResultSession;
