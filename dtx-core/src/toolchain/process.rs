//! Child process handling for toolchain invocations

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;

use crate::{Error, Result};

/// Captured result of a finished toolchain process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Output of a process that exited normally with `code`
    pub fn exited(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Output of a process that was killed
    pub fn killed() -> Self {
        Self::default()
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn was_killed(&self) -> bool {
        self.code.is_none()
    }
}

/// Cancellation signal shared with running test processes
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Sending half of a [`CancelToken`]
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal every token handed out so far
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Clear the signal for the next run
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested
    ///
    /// Never resolves if the source is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Spawn a command, mapping a missing executable to a readable error
pub(crate) fn spawn(cmd: &mut Command, program: &str) -> Result<Child> {
    cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::Toolchain(format!(
                "Executable not found at '{}'. Is the .NET SDK installed?",
                program
            ))
        } else {
            Error::Io(e)
        }
    })
}

/// Run a command to completion, killing it if `cancel` fires first
pub(crate) async fn run_to_completion(
    mut cmd: Command,
    program: &str,
    cancel: Option<CancelToken>,
) -> Result<ProcessOutput> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = spawn(&mut cmd, program)?;

    let stdout = child.stdout.take().map(read_all);
    let stderr = child.stderr.take().map(read_all);

    let status = match cancel {
        Some(mut cancel) => {
            tokio::select! {
                status = child.wait() => Some(status?),
                _ = cancel.cancelled() => {
                    child.kill().await?;
                    None
                }
            }
        }
        None => Some(child.wait().await?),
    };

    let stdout = match stdout {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };
    let stderr = match stderr {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    Ok(ProcessOutput {
        code: status.and_then(|s| s.code()),
        stdout,
        stderr,
    })
}

fn read_all<R>(mut reader: R) -> tokio::task::JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Handle to a long-lived toolchain process whose stdout is streamed
pub struct ProcessHandle {
    child: Option<Child>,
    stdout: Option<Box<dyn AsyncRead + Unpin + Send>>,
    workdir: PathBuf,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("workdir", &self.workdir)
            .field("child", &self.child.as_ref().map(|_| "<Child>"))
            .finish()
    }
}

impl ProcessHandle {
    /// Wrap a spawned child that has a piped stdout
    pub fn from_child(mut child: Child, workdir: &Path) -> Self {
        let stdout = child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>);
        Self {
            child: Some(child),
            stdout,
            workdir: workdir.to_path_buf(),
        }
    }

    /// A handle with no process behind it, streaming from `reader`
    pub fn from_reader<R>(reader: R, workdir: &Path) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self {
            child: None,
            stdout: Some(Box::new(reader)),
            workdir: workdir.to_path_buf(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Take the stdout stream, leaving the process running
    pub fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.stdout.take()
    }

    /// Kill the process
    pub async fn kill(&mut self) -> Result<()> {
        match self.child.as_mut() {
            Some(child) => child.kill().await.map_err(Error::Io),
            None => Ok(()),
        }
    }
}
