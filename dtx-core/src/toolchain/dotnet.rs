//! `dotnet` CLI toolchain

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::process::{self, CancelToken, ProcessHandle, ProcessOutput};
use super::{RunRequest, Toolchain};
use crate::{Error, Result};

/// Toolchain backed by the `dotnet` executable
#[derive(Debug, Clone)]
pub struct DotnetToolchain {
    dotnet_path: String,
}

impl DotnetToolchain {
    /// Create a new dotnet toolchain using `dotnet` from PATH
    pub fn new() -> Self {
        Self {
            dotnet_path: "dotnet".to_string(),
        }
    }

    /// Use a custom dotnet executable
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.dotnet_path = path.into();
        self
    }

    /// Build the base command for a directory
    fn build_command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.dotnet_path);
        cmd.current_dir(workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn list_args(extra_args: &[String]) -> Vec<String> {
        let mut args = vec!["test".to_string(), "-t".to_string(), "-v=q".to_string()];
        args.extend(extra_args.iter().cloned());
        args
    }

    fn run_args(request: &RunRequest<'_>) -> Vec<String> {
        let mut args = vec!["test".to_string()];
        args.extend(request.extra_args.iter().cloned());
        args.push("--no-build".to_string());
        args.push("--logger".to_string());
        args.push(format!("trx;LogFileName={}", request.result_file.display()));
        if let Some(filter) = request.filter {
            args.push("--filter".to_string());
            args.push(filter.to_string());
        }
        args
    }

    fn watch_args(result_file: &Path, extra_args: &[String]) -> Vec<String> {
        let mut args = vec!["watch".to_string(), "test".to_string()];
        args.extend(extra_args.iter().cloned());
        args.push("--logger".to_string());
        args.push(format!("trx;LogFileName={}", result_file.display()));
        args
    }

    fn check_workdir(directory: &Path) -> Result<()> {
        if !directory.is_dir() {
            return Err(Error::Toolchain(format!(
                "Working directory does not exist: {}",
                directory.display()
            )));
        }
        Ok(())
    }
}

impl Default for DotnetToolchain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Toolchain for DotnetToolchain {
    fn name(&self) -> &'static str {
        "dotnet"
    }

    async fn list_tests(
        &self,
        directory: &Path,
        extra_args: &[String],
    ) -> Result<ProcessOutput> {
        Self::check_workdir(directory)?;
        let mut cmd = self.build_command(directory);
        cmd.args(Self::list_args(extra_args));
        tracing::info!(dir = %directory.display(), "Executing dotnet test -t");
        process::run_to_completion(cmd, &self.dotnet_path, None).await
    }

    async fn build(&self, directory: &Path) -> Result<ProcessOutput> {
        Self::check_workdir(directory)?;
        let mut cmd = self.build_command(directory);
        cmd.arg("build");
        tracing::info!(dir = %directory.display(), "Executing dotnet build");
        process::run_to_completion(cmd, &self.dotnet_path, None).await
    }

    async fn run_tests(
        &self,
        request: RunRequest<'_>,
        cancel: CancelToken,
    ) -> Result<ProcessOutput> {
        Self::check_workdir(request.directory)?;
        let args = Self::run_args(&request);
        let mut cmd = self.build_command(request.directory);
        cmd.args(&args);
        tracing::info!(
            dir = %request.directory.display(),
            command = %format!("dotnet {}", args.join(" ")),
            "Executing test command"
        );
        process::run_to_completion(cmd, &self.dotnet_path, Some(cancel)).await
    }

    async fn watch_tests(
        &self,
        directory: &Path,
        result_file: &Path,
        extra_args: &[String],
    ) -> Result<ProcessHandle> {
        Self::check_workdir(directory)?;
        let args = Self::watch_args(result_file, extra_args);
        let mut cmd = self.build_command(directory);
        cmd.args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        tracing::info!(
            dir = %directory.display(),
            command = %format!("dotnet {}", args.join(" ")),
            "Executing watch command"
        );
        let child = process::spawn(&mut cmd, &self.dotnet_path)?;
        Ok(ProcessHandle::from_child(child, directory))
    }

    fn is_available(&self) -> bool {
        std::process::Command::new(&self.dotnet_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }
}
