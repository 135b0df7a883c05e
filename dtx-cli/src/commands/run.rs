//! Run command - run all or some tests and show the results

use std::path::PathBuf;

use clap::Args;
use dtx_core::results::OutcomeSummary;
use dtx_core::{ExplorerConfig, ExplorerEvent, TestFilter};

use super::render;
use super::ExplorerSession;

/// Run tests
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Test name or namespace to run (defaults to all tests)
    pub test: Option<String>,

    /// Match the test name exactly instead of by prefix
    #[arg(long)]
    pub exact: bool,

    /// Print emitted events as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn filter(&self, session: &ExplorerSession) -> TestFilter {
        match self.test.as_deref() {
            None | Some("") => TestFilter::all(),
            Some(name) if self.exact => TestFilter::exact(name),
            Some(name) => session.explorer.filter_for(name),
        }
    }

    /// Execute the run command
    pub async fn execute(
        &self,
        config: &ExplorerConfig,
        workspaces: &[PathBuf],
    ) -> anyhow::Result<()> {
        let mut session = ExplorerSession::start(config, workspaces)?;
        session.discover().await?;

        let filter = self.filter(&session);
        tracing::info!(filter = %filter, "Running tests");
        session.handle.run(filter)?;

        let outcome = loop {
            let event = tokio::select! {
                event = session.next_event() => event?,
                _ = tokio::signal::ctrl_c() => {
                    println!("Cancelling test run...");
                    session.handle.cancel()?;
                    continue;
                }
            };

            if self.json {
                println!("{}", serde_json::to_string(&event)?);
            }

            match event {
                ExplorerEvent::RunStarted(_) if !self.json => {
                    println!("{}", session.explorer.status());
                }
                ExplorerEvent::NewResults(batch) => {
                    if !self.json {
                        render::print_view(&session.explorer.view(config.use_tree_view));
                        render::print_failures(&batch);
                        println!();
                        println!("{}", session.explorer.status());
                    }
                    break Ok(OutcomeSummary::from_results(&batch.results));
                }
                ExplorerEvent::RunRejected { filter, reason } => {
                    break Err(anyhow::anyhow!("Run of {} rejected: {}", filter, reason));
                }
                ExplorerEvent::RunFailed { aborted: true, .. } => {
                    break Err(anyhow::anyhow!("Test run cancelled"));
                }
                ExplorerEvent::RunFailed { message, .. } => {
                    break Err(anyhow::anyhow!("Test run failed: {}", message));
                }
                _ => {}
            }
        };

        session.shutdown().await;

        let summary = outcome?;
        if summary.failed > 0 {
            anyhow::bail!("{} test(s) failed", summary.failed);
        }
        Ok(())
    }
}
