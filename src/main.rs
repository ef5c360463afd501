mod agent;
mod config;
mod llm;
mod oracle;
mod sandbox;

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::agent::AgentRuntime;
use crate::config::Config;
use crate::oracle::LlmOracle;
use crate::sandbox::DockerSandbox;

fn print_help() {
    println!(
        "\
sandbox-pilot v{}

Turns plain-language requests into shell commands and runs them inside a
disposable Docker container, recovering from failed steps on the way.

USAGE:
    sandbox-pilot [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: config/agent.toml]
                   Built-in defaults are used if the default file is missing.

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG              Log level filter for tracing
                          (e.g. debug, sandbox_pilot=debug,warn)
    ANTHROPIC_API_KEY     API key when llm.provider = \"anthropic\"
                          (referenced as api_key = \"${{ANTHROPIC_API_KEY}}\")

EXAMPLES:
    sandbox-pilot                          # uses config/agent.toml
    sandbox-pilot ~/pilot.toml             # custom config path
    RUST_LOG=debug sandbox-pilot           # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("sandbox-pilot v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {}
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sandbox_pilot=info")),
        )
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {path}");
            Config::load(&path)?
        }
        None => {
            info!("Loading configuration from config/agent.toml (if present)");
            Config::load_or_default("config/agent.toml")?
        }
    };

    info!("Agent: {}", config.agent.name);
    info!("Image: {}", config.sandbox.image);

    let client = llm::client::from_config(&config.llm)?;
    info!("LLM: {}", client.description());
    let oracle = Arc::new(LlmOracle::new(client, config.agent.history_window));

    info!("Provisioning sandbox...");
    let sandbox = match DockerSandbox::provision(&config.sandbox).await {
        Ok(sandbox) => Arc::new(sandbox),
        Err(e) => {
            error!("Sandbox provisioning failed: {e}");
            return Err(e);
        }
    };
    info!("✓ Sandbox '{}' is ready", sandbox.name());

    let mut runtime = AgentRuntime::new(&config, sandbox.name(), sandbox.clone(), oracle);

    let result = tokio::select! {
        result = runtime.run() => result,
        _ = tokio::signal::ctrl_c() => {
            println!();
            info!("Shutdown signal received, exiting");
            Ok(())
        }
    };

    info!("Final working directory: {}", runtime.working_directory());

    // Always release the container, whatever ended the session
    if let Err(e) = sandbox.stop().await {
        warn!("Failed to stop sandbox '{}': {e}", sandbox.name());
    }

    result
}
