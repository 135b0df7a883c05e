//! Discover command - list the tests of the workspace

use std::path::PathBuf;

use clap::Args;
use dtx_core::ExplorerConfig;

use super::render;
use super::ExplorerSession;

/// Discover tests without running them
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Print the discovered tests per directory as JSON
    #[arg(long)]
    pub json: bool,
}

impl DiscoverArgs {
    /// Execute the discover command
    pub async fn execute(
        &self,
        config: &ExplorerConfig,
        workspaces: &[PathBuf],
    ) -> anyhow::Result<()> {
        let mut session = ExplorerSession::start(config, workspaces)?;
        let found = session.discover().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&found)?);
        } else {
            for tests in &found {
                tracing::info!(
                    dir = %tests.directory.display(),
                    count = tests.test_names.len(),
                    "Discovered tests"
                );
            }
            render::print_view(&session.explorer.view(config.use_tree_view));
            println!();
            println!("{}", session.explorer.status());
        }

        session.shutdown().await;
        Ok(())
    }
}
