//! xcode-tools-mcp: MCP server for AI-assisted Xcode builds
//!
//! This tool lets AI assistants discover Xcode projects, pick a scheme and
//! destination, build, and launch apps on simulators, devices or the Mac.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use xcode_tools_mcp::config;
use xcode_tools_mcp::mcp::McpServer;
use xcode_tools_mcp::tools::{self, ToolContext};

/// MCP server for AI-assisted Xcode builds.
///
/// Speaks JSON-RPC 2.0 over stdin/stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "xcode-tools-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Directory to search for projects (repeatable, replaces configured paths)
    #[arg(long = "search-path", value_name = "DIR")]
    search_paths: Vec<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber. stdout carries protocol traffic only.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the xcode-tools-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nConfig read from: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    if !args.search_paths.is_empty() {
        cfg.search_paths = args.search_paths;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting xcode-tools-mcp server"
    );

    let ctx = ToolContext::new(cfg);
    info!(
        search_paths = ?ctx.search_paths,
        state_path = %ctx.state.path().display(),
        "Tool context configured"
    );

    let server = McpServer::new(tools::dispatcher(ctx));

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(server.run());
    // The stdin reader blocks on a thread that cannot be interrupted.
    runtime.shutdown_background();

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn search_paths_are_repeatable() {
        let args = Args::parse_from([
            "xcode-tools-mcp",
            "--search-path",
            "/a",
            "--search-path",
            "/b",
            "-vv",
        ]);
        assert_eq!(args.search_paths, [PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(args.verbose, 2);
        assert!(args.config.is_none());
    }

    #[test]
    fn log_level_precedence() {
        assert_eq!(get_log_level(3, true, "trace"), Level::ERROR);
        assert_eq!(get_log_level(1, false, "error"), Level::INFO);
        assert_eq!(get_log_level(0, false, "DEBUG"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "bogus"), Level::WARN);
    }
}
