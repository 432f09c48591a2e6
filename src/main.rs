//! toolbridge-mcp: embeddable MCP gateway for host application capabilities
//!
//! Serves one configured server instance over stdio (default) or HTTP,
//! exposing whatever tools, resources, and prompts the host application
//! registered against it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use toolbridge_mcp::config;
use toolbridge_mcp::mcp::gateway;
use toolbridge_mcp::mcp::server::ServerInstance;
use toolbridge_mcp::mcp::{http, StdioServer};

/// Embeddable MCP gateway for host application capabilities.
///
/// Exposes registered tools, resources, and prompts to AI clients over
/// JSON-RPC 2.0, via stdio or HTTP.
#[derive(Parser, Debug)]
#[command(name = "toolbridge-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Serve the HTTP transport instead of stdio
    #[arg(long)]
    http: bool,

    /// HTTP listen address override (implies --http)
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

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
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr: stdout is reserved for the stdio transport.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Configures the default instance from the loaded configuration.
fn configure_instance(cfg: &config::Config) -> Arc<ServerInstance> {
    let instance = gateway::get(&cfg.server.name);
    instance
        .with_description(cfg.server.description.clone())
        .with_cors_origins(cfg.security.allowed_origins.clone())
        .with_body_limit(cfg.security.max_body_bytes)
        .with_strict_transport_security(cfg.security.strict_transport_security);

    if let Some(ref version) = cfg.server.version {
        instance.with_version(version.clone());
    }
    if let Some(ref auth) = cfg.security.basic_auth {
        instance.with_basic_auth(auth.username.clone(), auth.password.clone());
    }

    instance
}

/// Entry point for the toolbridge-mcp gateway.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting toolbridge-mcp gateway"
    );

    let instance = configure_instance(&cfg);
    info!(
        server = instance.name(),
        tools = instance.tool_count(),
        resources = instance.resource_count(),
        prompts = instance.prompt_count(),
        "Server instance configured"
    );

    let serve_http = args.http || args.listen.is_some() || cfg.http.enabled;

    let result = if serve_http {
        let listen = args.listen.unwrap_or_else(|| cfg.http.listen.clone());
        let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "Failed to create Tokio runtime");
                return ExitCode::FAILURE;
            }
        };
        runtime.block_on(http::serve(&listen))
    } else {
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
        info!("stdio transport ready, waiting for client connection...");
        let mut server = StdioServer::new(instance);
        runtime.block_on(server.run())
    };

    match result {
        Ok(()) => {
            info!("Gateway shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Gateway error");
            ExitCode::FAILURE
        }
    }
}
