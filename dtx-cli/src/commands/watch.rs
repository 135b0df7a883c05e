//! Watch command - keep `dotnet watch test` running for every project

use std::path::PathBuf;

use clap::Args;
use dtx_core::{ExplorerConfig, ExplorerEvent};

use super::render;
use super::ExplorerSession;

/// Discover tests, then re-run them whenever sources change
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Print every emitted event as one JSON line
    #[arg(long)]
    pub json: bool,
}

impl WatchArgs {
    /// Execute the watch command
    ///
    /// Runs until interrupted.
    pub async fn execute(
        &self,
        config: &ExplorerConfig,
        workspaces: &[PathBuf],
    ) -> anyhow::Result<()> {
        let config = ExplorerConfig {
            auto_watch: true,
            ..config.clone()
        };
        let mut session = ExplorerSession::start(&config, workspaces)?;
        session.handle.refresh()?;

        loop {
            let event = tokio::select! {
                event = session.next_event() => event?,
                _ = tokio::signal::ctrl_c() => break,
            };

            if self.json {
                println!("{}", serde_json::to_string(&event)?);
                continue;
            }

            match &event {
                ExplorerEvent::DiscoveryFinished(_) => {
                    render::print_view(&session.explorer.view(config.use_tree_view));
                }
                ExplorerEvent::NewResults(batch) => {
                    render::print_view(&session.explorer.view(config.use_tree_view));
                    render::print_failures(batch);
                }
                ExplorerEvent::RunFailed { message, .. } => {
                    eprintln!("Test run failed: {}", message);
                }
                _ => {}
            }
            println!("{}", session.explorer.status());
        }

        session.shutdown().await;
        Ok(())
    }
}
