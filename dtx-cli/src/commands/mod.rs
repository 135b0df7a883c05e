//! CLI command implementations

pub mod discover;
pub mod render;
pub mod run;
pub mod watch;

pub use discover::DiscoverArgs;
pub use run::RunArgs;
pub use watch::WatchArgs;

use std::path::PathBuf;
use std::sync::Arc;

use dtx_core::{
    DiscoveredTests, DotnetToolchain, ExplorerConfig, ExplorerEvent, Orchestrator,
    OrchestratorHandle, TestExplorer, Toolchain,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// A running orchestrator plus the explorer model fed by its events
pub struct ExplorerSession {
    pub handle: OrchestratorHandle,
    pub explorer: TestExplorer,
    events: broadcast::Receiver<ExplorerEvent>,
    task: JoinHandle<()>,
}

impl ExplorerSession {
    /// Start an orchestrator over the given workspace roots
    pub fn start(config: &ExplorerConfig, workspaces: &[PathBuf]) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        let roots: Vec<PathBuf> = workspaces
            .iter()
            .map(|w| if w.is_absolute() { w.clone() } else { cwd.join(w) })
            .collect();

        let toolchain = DotnetToolchain::new().with_path(&config.dotnet_path);
        if !toolchain.is_available() {
            tracing::warn!(
                dotnet_path = %config.dotnet_path,
                "dotnet executable not found, discovery will find no tests"
            );
        }

        let (orchestrator, handle) =
            Orchestrator::new(config.clone(), roots, Arc::new(toolchain));
        let events = handle.subscribe();
        let task = tokio::spawn(orchestrator.run());

        Ok(Self {
            handle,
            explorer: TestExplorer::new(),
            events,
            task,
        })
    }

    /// Wait for the next event and apply it to the explorer
    pub async fn next_event(&mut self) -> anyhow::Result<ExplorerEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => {
                    self.explorer.apply(&event);
                    return Ok(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Missed explorer events");
                }
                Err(RecvError::Closed) => anyhow::bail!("Orchestrator stopped unexpectedly"),
            }
        }
    }

    /// Resolve directories and discover tests
    pub async fn discover(&mut self) -> anyhow::Result<Vec<DiscoveredTests>> {
        self.handle.refresh()?;
        loop {
            if let ExplorerEvent::DiscoveryFinished(found) = self.next_event().await? {
                return Ok(found);
            }
        }
    }

    /// Stop the orchestrator and its watch processes
    pub async fn shutdown(self) {
        let _ = self.handle.shutdown();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Orchestrator task failed");
        }
    }
}
