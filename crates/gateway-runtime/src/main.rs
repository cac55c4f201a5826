//! # Vehicle Gateway
//!
//! ```text
//! gateway-runtime                          run until Ctrl-C
//! gateway-runtime <command> [json-params]  run one command, print the result
//! ```
//!
//! Configuration comes from `GW_*` environment variables; see
//! [`GatewayConfig::from_env`].

use anyhow::{Context, Result};
use gateway_runtime::{command_names, GatewayConfig, GatewayRuntime};
use gateway_telemetry::{init_telemetry, TelemetryConfig};
use serde_json::Value;
use tracing::{error, info};

fn main() -> Result<()> {
    let _telemetry = init_telemetry(&TelemetryConfig::from_env())
        .context("Failed to initialize telemetry")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("gateway")
        .build()
        .context("Failed to build async runtime")?;

    runtime.block_on(run(std::env::args().skip(1).collect()))
}

async fn run(args: Vec<String>) -> Result<()> {
    let config = GatewayConfig::from_env().context("Failed to load configuration")?;
    let gateway = GatewayRuntime::new(config).context("Invalid gateway configuration")?;
    gateway.start().await.context("Gateway failed to start")?;

    let result = match args.split_first() {
        Some((command, rest)) => run_command(&gateway, command, rest).await,
        None => wait_for_shutdown().await,
    };

    gateway.shutdown().await;
    result
}

async fn run_command(gateway: &GatewayRuntime, command: &str, rest: &[String]) -> Result<()> {
    let params: Option<Value> = match rest.first() {
        Some(raw) => Some(
            serde_json::from_str(raw).with_context(|| format!("Params for {command} are not JSON"))?,
        ),
        None => None,
    };
    match gateway.execute(command, params.as_ref()).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            error!(command, code = err.code, "Command failed: {}", err.message);
            if err.code == gateway_runtime::commands::codes::UNKNOWN_COMMAND {
                eprintln!("Available commands: {}", command_names().join(", "));
            }
            Err(err.into())
        }
    }
}

async fn wait_for_shutdown() -> Result<()> {
    info!("Press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown signal received");
    Ok(())
}
