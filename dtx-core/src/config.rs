//! Configuration management for dtx
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (DTX_*)
//! 3. Config file (~/.config/dtx/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Test explorer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Glob, relative to each workspace root, matching test projects
    pub test_project_path: String,

    /// Show tests as a namespace tree instead of a flat list
    pub use_tree_view: bool,

    /// Run discovery and test execution across directories concurrently
    pub run_in_parallel: bool,

    /// Skip `dotnet build` before running tests
    pub skip_build: bool,

    /// Start a continuous watch for every directory after discovery
    pub auto_watch: bool,

    /// Extra arguments appended to every `dotnet test` invocation
    pub additional_args: String,

    /// Where the per-session result directory is created
    pub result_staging_path: Option<PathBuf>,

    /// Path to the dotnet executable
    pub dotnet_path: String,

    /// Give up on listing tests in a directory after this long
    #[serde(with = "humantime_serde")]
    pub discovery_timeout: Duration,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            test_project_path: String::new(),
            use_tree_view: true,
            run_in_parallel: false,
            skip_build: false,
            auto_watch: false,
            additional_args: String::new(),
            result_staging_path: None,
            dotnet_path: "dotnet".to_string(),
            discovery_timeout: Duration::from_secs(300),
        }
    }
}

impl ExplorerConfig {
    /// Extra toolchain arguments, split on whitespace
    pub fn extra_args(&self) -> Vec<String> {
        self.additional_args
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Whether the build step is skipped
    ///
    /// Passing `--no-build` as an additional argument implies it.
    pub fn skips_build(&self) -> bool {
        self.skip_build || self.extra_args().iter().any(|a| a == "--no-build")
    }

    /// Directory that hosts the per-session result directory
    pub fn staging_dir(&self) -> PathBuf {
        self.result_staging_path
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Explorer configuration
    pub explorer: ExplorerConfig,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub dotnet_path: Option<String>,
    pub test_project_path: Option<String>,
    pub additional_args: Option<String>,
    pub flat: bool,
    pub parallel: bool,
    pub skip_build: bool,
    pub auto_watch: bool,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/dtx/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dtx").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - DTX_DOTNET_PATH: Path to dotnet executable
    /// - DTX_TEST_PROJECT_PATH: Glob for test projects
    /// - DTX_ADDITIONAL_ARGS: Extra `dotnet test` arguments
    /// - DTX_RESULT_STAGING_PATH: Where result files are written
    /// - DTX_RUN_IN_PARALLEL: "true"/"1" to run directories concurrently
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("DTX_DOTNET_PATH") {
            self.explorer.dotnet_path = path;
        }

        if let Ok(glob) = std::env::var("DTX_TEST_PROJECT_PATH") {
            self.explorer.test_project_path = glob;
        }

        if let Ok(args) = std::env::var("DTX_ADDITIONAL_ARGS") {
            self.explorer.additional_args = args;
        }

        if let Ok(path) = std::env::var("DTX_RESULT_STAGING_PATH") {
            self.explorer.result_staging_path = Some(PathBuf::from(path));
        }

        if let Ok(value) = std::env::var("DTX_RUN_IN_PARALLEL") {
            self.explorer.run_in_parallel = parse_flag(&value);
        }

        self
    }

    /// Apply CLI flag overrides
    ///
    /// Boolean flags only ever switch a behaviour on.
    pub fn with_cli_overrides(mut self, cli: CliOverrides) -> Self {
        if let Some(path) = cli.dotnet_path {
            self.explorer.dotnet_path = path;
        }

        if let Some(glob) = cli.test_project_path {
            self.explorer.test_project_path = glob;
        }

        if let Some(args) = cli.additional_args {
            self.explorer.additional_args = args;
        }

        if cli.flat {
            self.explorer.use_tree_view = false;
        }
        if cli.parallel {
            self.explorer.run_in_parallel = true;
        }
        if cli.skip_build {
            self.explorer.skip_build = true;
        }
        if cli.auto_watch {
            self.explorer.auto_watch = true;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(config_file: Option<&Path>, cli: CliOverrides) -> Result<Self> {
        let base = match config_file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load()?,
        };
        Ok(base.with_env_overrides().with_cli_overrides(cli))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
