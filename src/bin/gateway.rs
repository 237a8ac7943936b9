//! Plane MCP Gateway
//!
//! Entry point for the SSE server. Reads configuration from the environment
//! (and `.env`), serves until SIGINT or SIGTERM, then drains every session.

use anyhow::Context;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use plane_mcp_gateway::config::{Config, LogConfig, LogFormat};
use plane_mcp_gateway::gateway::{self, AppState};
use plane_mcp_gateway::mcp::McpEngineFactory;
use plane_mcp_gateway::tools::{ServerInfoTool, ToolRegistry};
use plane_mcp_gateway::transport::{termination_signal, Lifecycle, SessionRegistry};

// ---- CLI ----

#[derive(Parser)]
#[command(name = "plane-mcp-gateway", version, about = "Plane MCP server over SSE")]
struct Args {
    /// Bind address (overrides HOST)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port (overrides PORT)
    #[arg(long, short)]
    port: Option<u16>,

    /// Log output format: pretty or json (overrides LOG_FORMAT)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_new(&log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

// ---- Main ----

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(format) = args.log_format {
        config.log.format = format;
    }

    init_tracing(&config.log);
    info!("Starting {} v{}", plane_mcp_gateway::NAME, plane_mcp_gateway::VERSION);

    // Tools still work without credentials; only upstream calls need them
    if let Err(e) = config.validate() {
        warn!("{}", e);
    }

    let registry = Arc::new(SessionRegistry::new());
    let lifecycle = Arc::new(Lifecycle::new(
        Arc::clone(&registry),
        config.server.drain_timeout,
    ));

    let mut tools = ToolRegistry::new();
    tools.register(ServerInfoTool::new(&config.upstream));
    info!(tools = ?tools.names(), "Tools registered");

    let state = AppState::new(
        registry,
        Arc::new(McpEngineFactory::new(Arc::new(tools))),
        lifecycle,
        config.server.keep_alive,
        config.server.max_message_bytes,
    );

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("SSE server listening on http://{}", addr);
    info!("  SSE endpoint:     http://{}/sse", addr);
    info!("  Message endpoint: http://{}{}", addr, gateway::MESSAGE_PATH);
    info!("  Health check:     http://{}/health", addr);

    let report = gateway::serve(listener, state, termination_signal()).await?;

    info!(
        closed = report.closed,
        failed = report.failed,
        timed_out = report.timed_out,
        "SSE server shutdown complete"
    );
    Ok(())
}
