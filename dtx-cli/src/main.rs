//! dtx CLI - test explorer for dotnet test projects
//!
//! Discovers tests in a workspace, runs them with `dotnet test` and shows
//! the results as a tree.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dtx_core::{CliOverrides, Config};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{DiscoverArgs, RunArgs, WatchArgs};

/// dtx: test explorer for dotnet test projects
#[derive(Parser, Debug)]
#[command(name = "dtx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Workspace root to search for test projects (repeatable)
    #[arg(short, long = "workspace", global = true, default_value = ".")]
    workspaces: Vec<PathBuf>,

    /// Path to dotnet executable (overrides config and env)
    #[arg(long, global = true)]
    dotnet_path: Option<String>,

    /// Glob matching test projects, relative to each workspace root
    #[arg(long, global = true)]
    test_project_path: Option<String>,

    /// Extra arguments for `dotnet test`
    #[arg(long, global = true, allow_hyphen_values = true)]
    additional_args: Option<String>,

    /// Show a flat list instead of a namespace tree
    #[arg(long, global = true)]
    flat: bool,

    /// Run directories concurrently
    #[arg(long, global = true)]
    parallel: bool,

    /// Skip `dotnet build` before running tests
    #[arg(long, global = true)]
    skip_build: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Discover tests without running them
    #[command(visible_alias = "d")]
    Discover(DiscoverArgs),

    /// Run all tests or the tests under a name
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Keep re-running tests as sources change
    #[command(visible_alias = "w")]
    Watch(WatchArgs),

    /// Show current configuration
    Config,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            dotnet_path: self.dotnet_path.clone(),
            test_project_path: self.test_project_path.clone(),
            additional_args: self.additional_args.clone(),
            flat: self.flat,
            parallel: self.parallel,
            skip_build: self.skip_build,
            auto_watch: false,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Load configuration with overrides
    let config = Config::load_with_overrides(cli.config.as_deref(), cli.overrides())?;

    if cli.verbose {
        tracing::info!(
            dotnet_path = %config.explorer.dotnet_path,
            test_project_path = %config.explorer.test_project_path,
            "Configuration loaded"
        );
    }

    match &cli.command {
        Some(Commands::Version) => {
            println!("dtx {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Discover(args)) => {
            args.execute(&config.explorer, &cli.workspaces).await?;
        }
        Some(Commands::Run(args)) => {
            args.execute(&config.explorer, &cli.workspaces).await?;
        }
        Some(Commands::Watch(args)) => {
            args.execute(&config.explorer, &cli.workspaces).await?;
        }
        Some(Commands::Config) => {
            let explorer = &config.explorer;
            println!("dtx Configuration");
            println!("=================");
            println!();
            println!("Explorer Settings:");
            println!("  dotnet_path: {}", explorer.dotnet_path);
            println!(
                "  test_project_path: {}",
                if explorer.test_project_path.is_empty() {
                    "(workspace root)"
                } else {
                    explorer.test_project_path.as_str()
                }
            );
            println!("  use_tree_view: {}", explorer.use_tree_view);
            println!("  run_in_parallel: {}", explorer.run_in_parallel);
            println!("  skip_build: {}", explorer.skips_build());
            println!("  auto_watch: {}", explorer.auto_watch);
            println!("  additional_args: {}", explorer.additional_args);
            println!("  result_staging_path: {}", explorer.staging_dir().display());
            println!(
                "  discovery_timeout: {}s",
                explorer.discovery_timeout.as_secs()
            );
            println!();
            match cli.config.clone().or_else(Config::default_config_path) {
                Some(path) => {
                    println!("Config file: {}", path.display());
                    if path.exists() {
                        println!("  (exists)");
                    } else {
                        println!("  (not found - using defaults)");
                    }
                }
                None => println!("Config file: (no config directory)"),
            }
        }
        None => {
            println!("dtx - test explorer for dotnet test projects");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
