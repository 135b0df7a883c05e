//! Watch a result directory for finished result files
//!
//! The toolchain creates a result file and then writes to it in several
//! steps. Events for a path are debounced so the callback fires once the
//! file has been quiet for a short while, not on the first create event.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::Result;

/// Quiet period before a result file is considered complete
const DEBOUNCE_MS: u64 = 250;

/// Handle for a running result directory watch
///
/// Dropping the handle stops the watch. The debounce thread ends once the
/// watcher, and with it the event sender, is gone.
pub struct ResultFileWatcher {
    _watcher: RecommendedWatcher,
    directory: PathBuf,
}

impl std::fmt::Debug for ResultFileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultFileWatcher")
            .field("directory", &self.directory)
            .finish()
    }
}

impl ResultFileWatcher {
    /// Start watching `directory` for files with the given extension
    ///
    /// `callback` runs on the watcher thread once per settled file write.
    pub fn start<F>(directory: &Path, extension: &str, callback: F) -> Result<Self>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let (event_tx, event_rx) = mpsc::channel::<notify::Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    let _ = event_tx.send(event);
                }
            },
            Config::default(),
        )?;
        watcher.watch(directory, RecursiveMode::NonRecursive)?;

        let extension = extension.to_string();
        thread::spawn(move || {
            let mut deadlines: HashMap<PathBuf, Instant> = HashMap::new();

            loop {
                // sleep until an event arrives or the earliest file settles
                let received = match deadlines.values().min() {
                    None => event_rx.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected),
                    Some(earliest) => {
                        event_rx.recv_timeout(earliest.saturating_duration_since(Instant::now()))
                    }
                };

                match received {
                    Ok(event) => {
                        if is_write(&event.kind) {
                            for path in event.paths {
                                if has_extension(&path, &extension) {
                                    deadlines.insert(
                                        path,
                                        Instant::now() + Duration::from_millis(DEBOUNCE_MS),
                                    );
                                }
                            }
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }

                let now = Instant::now();
                let settled: Vec<PathBuf> = deadlines
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in settled {
                    deadlines.remove(&path);
                    if path.is_file() {
                        tracing::debug!(path = %path.display(), "Result file settled");
                        callback(path);
                    }
                }
            }
            tracing::debug!("Result file watch stopped");
        });

        Ok(Self {
            _watcher: watcher,
            directory: directory.to_path_buf(),
        })
    }

    /// The watched directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

fn is_write(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}
