//! Continuous-watch runner
//!
//! Keeps one `dotnet watch test` process per directory. The process writes
//! its own result file into the session directory, so its results arrive
//! through the normal result watch. Its stdout is only inspected for the
//! marker that says a re-run has begun.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::run::Message;
use crate::toolchain::{LineHandler, LineStreamer, Toolchain};

/// Line fragment printed by the watch process when it re-runs tests
pub const WATCH_STARTED_MARKER: &str = "watch : Started";

/// Everything needed to start one watch process
#[derive(Debug, Clone)]
pub struct WatchRequest {
    pub directory: PathBuf,
    /// Namespace reported as running when the watch triggers
    pub namespace: String,
    pub result_file: PathBuf,
    pub extra_args: Vec<String>,
}

/// A running watch task and the start it belongs to
#[derive(Debug)]
struct ActiveWatch {
    generation: u64,
    task: JoinHandle<()>,
}

/// Tracks the active watch process of each directory
#[derive(Debug, Default)]
pub struct WatchRunner {
    active: HashMap<PathBuf, ActiveWatch>,
    next_generation: u64,
}

impl WatchRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching a directory
    ///
    /// Returns `false` without doing anything if the directory is already
    /// watched.
    pub fn start(
        &mut self,
        toolchain: Arc<dyn Toolchain>,
        request: WatchRequest,
        tx: UnboundedSender<Message>,
    ) -> bool {
        if self.is_watching(&request.directory) {
            tracing::info!(
                dir = %request.directory.display(),
                "Skipping adding watch since already watching directory"
            );
            return false;
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        tracing::info!(dir = %request.directory.display(), generation, "Starting watch");
        let directory = request.directory.clone();
        let task = tokio::spawn(run_watch(toolchain, request, generation, tx));
        self.active.insert(directory, ActiveWatch { generation, task });
        true
    }

    pub fn is_watching(&self, directory: &Path) -> bool {
        self.active.contains_key(directory)
    }

    /// Forget a directory whose watch process has closed its output
    ///
    /// Closes reported by an earlier watch of the same directory are ignored.
    pub fn closed(&mut self, directory: &Path, generation: u64) {
        match self.active.get(directory) {
            Some(watch) if watch.generation == generation => {
                self.active.remove(directory);
                tracing::info!(dir = %directory.display(), "Stopping watch");
            }
            Some(_) => {
                tracing::debug!(
                    dir = %directory.display(),
                    generation,
                    "Ignoring close of old watch"
                );
            }
            None => {}
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Stop every watch process
    pub fn stop_all(&mut self) {
        for (directory, watch) in self.active.drain() {
            tracing::debug!(dir = %directory.display(), "Aborting watch");
            watch.task.abort();
        }
    }
}

impl Drop for WatchRunner {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn run_watch(
    toolchain: Arc<dyn Toolchain>,
    request: WatchRequest,
    generation: u64,
    tx: UnboundedSender<Message>,
) {
    let WatchRequest {
        directory,
        namespace,
        result_file,
        extra_args,
    } = request;

    // the process is killed when the handle drops with this task
    let mut process = match toolchain
        .watch_tests(&directory, &result_file, &extra_args)
        .await
    {
        Ok(process) => process,
        Err(e) => {
            tracing::error!(dir = %directory.display(), error = %e, "Failed to start watch");
            let _ = tx.send(Message::WatchClosed {
                directory,
                generation,
            });
            return;
        }
    };

    let mut handler = WatchOutput {
        namespace,
        directory: directory.clone(),
        generation,
        tx,
    };

    match process.take_stdout() {
        Some(stdout) => {
            if let Err(e) = LineStreamer::new(stdout).stream(&mut handler).await {
                tracing::warn!(dir = %directory.display(), error = %e, "Watch output failed");
                handler.on_close();
            }
        }
        None => handler.on_close(),
    }
}

/// Forwards watch process output to the orchestrator
struct WatchOutput {
    namespace: String,
    directory: PathBuf,
    generation: u64,
    tx: UnboundedSender<Message>,
}

impl LineHandler for WatchOutput {
    fn on_line(&mut self, line: &str) {
        tracing::info!(target: "dtx::runner_output", dir = %self.directory.display(), "{}", line);
        if line.contains(WATCH_STARTED_MARKER) {
            let _ = self
                .tx
                .send(Message::WatchTriggered(self.namespace.clone()));
        }
    }

    fn on_close(&mut self) {
        let _ = self.tx.send(Message::WatchClosed {
            directory: self.directory.clone(),
            generation: self.generation,
        });
    }
}
