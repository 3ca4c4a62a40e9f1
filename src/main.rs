use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use graylog_mcp::client::GraylogClient;
use graylog_mcp::config::{Config, LogFormat, ServerMode};
use graylog_mcp::http::serve_http;
use graylog_mcp::mcp::run_stdio;
use graylog_mcp::tools::GraylogTools;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    // stdout carries the stdio transport
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.server.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_ansi(false).init(),
    }
}

fn load_config() -> anyhow::Result<Config> {
    let args: Vec<String> = env::args().collect();
    let base = match args.get(1) {
        Some(path) if path == "-h" || path == "--help" => {
            eprintln!("Usage: {} [config.yaml|config.json]", args[0]);
            eprintln!("Environment: GRAYLOG_ENDPOINT, GRAYLOG_USERNAME, GRAYLOG_PASSWORD, GRAYLOG_VERIFY_SSL, GRAYLOG_TIMEOUT, GRAYLOG_REQUIRE_CREDENTIALS, MCP_SERVER_MODE, MCP_SERVER_HOST, MCP_SERVER_PORT, MCP_SERVER_LOG_LEVEL, MCP_SERVER_LOG_FORMAT");
            std::process::exit(0);
        }
        Some(path) => Config::load_from_path(Path::new(path))?,
        None => Config::default(),
    };
    let config = base.with_overrides(|key| env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.graylog.endpoint,
        mode = ?config.server.mode,
        "graylog-mcp starting"
    );
    for field in config.defaulted_fields() {
        warn!(field, "graylog {field} not configured, falling back to the built-in default");
    }

    let client = GraylogClient::new(&config.graylog)?;
    let tools = Arc::new(GraylogTools::new(client));

    let probe = tools.test_connection().await;
    if probe["connected"].as_bool() == Some(true) {
        info!(version = %probe["version"], "connected to Graylog");
    } else {
        warn!(error = %probe["error"], kind = %probe["kind"], "cannot reach Graylog, tools will report errors until it is available");
    }

    match config.server.mode {
        ServerMode::Stdio => run_stdio(tools).await?,
        ServerMode::Http => serve_http(tools, &config.server).await?,
        ServerMode::Both => {
            let server = config.server.clone();
            let http_tools = tools.clone();
            let mut http_task = tokio::spawn(async move { serve_http(http_tools, &server).await });
            tokio::select! {
                res = &mut http_task => res??,
                res = run_stdio(tools) => {
                    res?;
                    info!("stdio transport finished, HTTP transport keeps serving");
                    http_task.await??;
                }
            }
        }
    }

    Ok(())
}
