//! Drover server binary
//!
//! Wires the session & capability runtime behind a newline-delimited-JSON
//! call loop on stdin/stdout: one `{"session", "name", "arguments"}` request
//! per line in, one call-result envelope per line out. The real wire
//! protocol lives in front of this process; this loop is the stand-in that
//! delivers named calls and returns structured results.

use anyhow::{Context, bail};
use clap::Parser;
use drover_core::config::RuntimeConfig;
use drover_core::dispatch::{CallResult, Dispatcher};
use drover_core::driver::StubConnector;
use drover_core::handler::{Services, ToolCall};
use drover_core::registry::CapabilityRegistry;
use drover_core::report::FsArtifactSink;
use drover_core::store::SessionStore;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "drover", version, about = "Session & capability runtime for driving applications under automation")]
struct Args {
    /// Capabilities to serve; `core` expands to all of them
    #[arg(long, value_delimiter = ',', default_value = "core")]
    capabilities: Vec<String>,

    /// Idle seconds before a session is swept and torn down
    #[arg(long, default_value_t = 600)]
    session_timeout_secs: u64,

    /// Seconds between TTL sweep passes
    #[arg(long, default_value_t = 60)]
    sweep_interval_secs: u64,

    /// Deadline in seconds per driver call attempt
    #[arg(long, default_value_t = 30)]
    call_timeout_secs: u64,

    /// Directory for session reports and failure artifacts
    #[arg(long, default_value = "drover-out")]
    output_dir: PathBuf,
}

impl Args {
    fn into_config(self) -> RuntimeConfig {
        RuntimeConfig {
            capabilities: self.capabilities,
            session_timeout: Duration::from_secs(self.session_timeout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            output_dir: self.output_dir,
            ..RuntimeConfig::default()
        }
    }
}

/// One request line from the protocol layer
#[derive(Debug, Deserialize)]
struct CallRequest {
    /// Opaque stable session identity, one per logical connection
    session: String,
    /// Tool name
    name: String,
    #[serde(default)]
    arguments: HashMap<String, serde_json::Value>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set RUST_LOG=debug for verbose logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Args::parse().into_config();

    let mut registry = CapabilityRegistry::new();
    drover_tools::load_capabilities(&mut registry, &config.capabilities);
    let validation = registry.validate();
    if !validation.is_valid() {
        bail!("tool registry failed validation: {:?}", validation.errors);
    }
    info!(
        tools = registry.tool_count(),
        capabilities = ?registry.capability_names(),
        "registry ready"
    );

    let artifacts = Arc::new(FsArtifactSink::new(&config.output_dir));
    let store = Arc::new(SessionStore::new(config.session_timeout, artifacts.clone()));
    let sweeper = store.spawn_sweeper(config.sweep_interval);
    let services = Arc::new(Services {
        connector: Box::new(StubConnector),
        artifacts,
    });
    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::new(registry),
        services,
        config.session_config(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let result = match serde_json::from_str::<CallRequest>(&line) {
            Ok(request) => {
                let call = ToolCall::new(request.name, request.arguments);
                dispatcher.dispatch(&request.session, call).await
            }
            Err(error) => CallResult::error(format!("malformed call request: {error}")),
        };

        let mut payload = serde_json::to_string(&result).context("serializing result")?;
        payload.push('\n');
        stdout.write_all(payload.as_bytes()).await?;
        stdout.flush().await?;
    }

    info!("input closed, shutting down");
    sweeper.abort();
    store.dispose().await;
    Ok(())
}
