//! # Command Router
//!
//! Maps a command name and its JSON params onto a proxy call and returns
//! the result as JSON.
//!
//! ```text
//! telemetry.*   → TelemetryLinkProxy
//! transfer.*    → FileTransferProxy
//! gateway.*     → container status and metrics
//! ```
//!
//! The [`CommandTable`] is built once and is the single source for both the
//! list of command names and their dispatch. Params are a JSON object (or
//! absent). Every command is counted in the `gw_commands_handled_total`
//! metric by outcome.

use crate::commands::error::CommandError;
use crate::container::ProxyContainer;
use chrono::Utc;
use gateway_telemetry::metric_inc;
use gateway_telemetry::metrics::{encode_metrics, COMMANDS_HANDLED, TRANSFER_OPERATIONS};
use gw_01_telemetry_link::TelemetryLinkProxy;
use gw_02_file_transfer::FileTransferProxy;
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use shared_types::{LinkMessage, ProxyError};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

// =============================================================================
// PARAMS
// =============================================================================

fn default_burst_count() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SendParams {
    msg_id: u32,
    msg_type: String,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
    /// Explicit routing key. Only the generic key is transmitted.
    #[serde(default)]
    key: Option<String>,
    #[serde(default = "default_burst_count")]
    burst_count: u32,
    #[serde(default)]
    burst_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RequestMessageParams {
    message_id: u32,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DrainParams {
    key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListLogsParams {
    #[serde(default)]
    base: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DownloadParams {
    remote_path: String,
    local_path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClearErrorLogsParams {
    #[serde(default)]
    path: Option<String>,
}

fn parse_params<T: DeserializeOwned>(command: &str, params: Option<&Value>) -> Result<T, CommandError> {
    let value = match params {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(value) => value.clone(),
    };
    serde_json::from_value(value).map_err(|e| CommandError::invalid_params(command, e))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(CommandError::from)
}

// =============================================================================
// TABLE
// =============================================================================

/// Future returned by a command handler.
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, CommandError>> + 'a>>;

/// One command: the container plus raw params in, JSON out.
pub type CommandHandler = for<'a> fn(&'a ProxyContainer, Option<&'a Value>) -> CommandFuture<'a>;

/// Command name to handler map.
pub struct CommandTable {
    handlers: BTreeMap<&'static str, CommandHandler>,
}

impl CommandTable {
    /// The gateway's full command set.
    #[must_use]
    pub fn standard() -> Self {
        let entries: [(&'static str, CommandHandler); 13] = [
            ("telemetry.send", telemetry_send),
            ("telemetry.request_message", telemetry_request_message),
            ("telemetry.log_request_list", telemetry_log_request_list),
            ("telemetry.drain", telemetry_drain),
            ("telemetry.stats", telemetry_stats),
            ("transfer.list_logs", transfer_list_logs),
            ("transfer.log_index", transfer_log_index),
            ("transfer.download", transfer_download),
            ("transfer.remote_clock", transfer_remote_clock),
            ("transfer.clear_error_logs", transfer_clear_error_logs),
            ("transfer.stats", transfer_stats),
            ("gateway.status", gateway_status),
            ("gateway.metrics", gateway_metrics),
        ];
        Self {
            handlers: entries.into_iter().collect(),
        }
    }

    /// Command names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    #[must_use]
    pub fn contains(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run `command` and count it by name and outcome.
    pub async fn dispatch(
        &self,
        container: &ProxyContainer,
        command: &str,
        params: Option<&Value>,
    ) -> Result<Value, CommandError> {
        debug!(command, "Routing command");
        let (label, result) = match self.handlers.get_key_value(command) {
            Some((name, handler)) => (*name, handler(container, params).await),
            None => ("unknown", Err(CommandError::unknown_command(command))),
        };
        let outcome = match &result {
            Ok(_) => "ok".to_string(),
            Err(err) => err.outcome(),
        };
        metric_inc!(COMMANDS_HANDLED, &[label, outcome.as_str()]);
        result
    }
}

lazy_static! {
    static ref STANDARD_COMMANDS: CommandTable = CommandTable::standard();
}

/// Names of every command the router understands.
#[must_use]
pub fn command_names() -> Vec<&'static str> {
    STANDARD_COMMANDS.names()
}

/// Run `command` against `container` through the standard table.
pub async fn route_command(
    container: &ProxyContainer,
    command: &str,
    params: Option<&Value>,
) -> Result<Value, CommandError> {
    STANDARD_COMMANDS.dispatch(container, command, params).await
}

fn telemetry<'a>(
    container: &'a ProxyContainer,
    command: &str,
) -> Result<&'a Arc<TelemetryLinkProxy>, CommandError> {
    container
        .telemetry
        .as_ref()
        .ok_or_else(|| CommandError::unavailable(command, "telemetry_link"))
}

fn transfer<'a>(
    container: &'a ProxyContainer,
    command: &str,
) -> Result<&'a Arc<FileTransferProxy>, CommandError> {
    container
        .transfer
        .as_ref()
        .ok_or_else(|| CommandError::unavailable(command, "file_transfer"))
}

/// Count a finished transfer operation by outcome.
fn record_transfer(operation: &str, result: Result<(), &ProxyError>) {
    let outcome = match result {
        Ok(()) => "ok".to_string(),
        Err(err) => err.kind().to_string(),
    };
    metric_inc!(TRANSFER_OPERATIONS, &[operation, outcome.as_str()]);
}

// =============================================================================
// TELEMETRY COMMANDS
// =============================================================================

fn telemetry_send<'a>(container: &'a ProxyContainer, params: Option<&'a Value>) -> CommandFuture<'a> {
    Box::pin(async move {
        let command = "telemetry.send";
        let proxy = telemetry(container, command)?;
        let params: SendParams = parse_params(command, params)?;
        let mut message = LinkMessage::new(params.msg_id, params.msg_type);
        message.fields = params.fields;
        match params.key {
            Some(key) => {
                if params.burst_count != 1 || params.burst_interval_ms.is_some() {
                    return Err(CommandError::invalid_params(
                        command,
                        "bursts are only sent on the generic key",
                    ));
                }
                proxy.send_on(key, message);
            }
            None => proxy.send_burst(
                message,
                params.burst_count,
                params.burst_interval_ms.map(Duration::from_millis),
            )?,
        }
        Ok(json!({ "queued": params.burst_count }))
    })
}

fn telemetry_request_message<'a>(
    container: &'a ProxyContainer,
    params: Option<&'a Value>,
) -> CommandFuture<'a> {
    Box::pin(async move {
        let command = "telemetry.request_message";
        let proxy = telemetry(container, command)?;
        let params: RequestMessageParams = parse_params(command, params)?;
        let timeout = params
            .timeout_ms
            .map_or_else(|| proxy.config().reply_timeout(), Duration::from_millis);
        let reply = proxy.request_and_collect(params.message_id, timeout).await?;
        to_json(&reply)
    })
}

fn telemetry_log_request_list<'a>(
    container: &'a ProxyContainer,
    _params: Option<&'a Value>,
) -> CommandFuture<'a> {
    Box::pin(async move {
        let proxy = telemetry(container, "telemetry.log_request_list")?;
        to_json(&proxy.log_request_list()?)
    })
}

fn telemetry_drain<'a>(container: &'a ProxyContainer, params: Option<&'a Value>) -> CommandFuture<'a> {
    Box::pin(async move {
        let command = "telemetry.drain";
        let proxy = telemetry(container, command)?;
        let params: DrainParams = parse_params(command, params)?;
        to_json(&proxy.drain_inbound(&params.key))
    })
}

fn telemetry_stats<'a>(container: &'a ProxyContainer, _params: Option<&'a Value>) -> CommandFuture<'a> {
    Box::pin(async move { to_json(&telemetry(container, "telemetry.stats")?.stats()) })
}

// =============================================================================
// TRANSFER COMMANDS
// =============================================================================

fn transfer_list_logs<'a>(container: &'a ProxyContainer, params: Option<&'a Value>) -> CommandFuture<'a> {
    Box::pin(async move {
        let command = "transfer.list_logs";
        let proxy = transfer(container, command)?;
        let params: ListLogsParams = parse_params(command, params)?;
        let logs = match params.base {
            Some(base) => proxy.list_logs_in(&base).await,
            None => proxy.list_logs().await,
        };
        record_transfer("list_logs", logs.as_ref().map(|_| ()));
        to_json(&logs?)
    })
}

fn transfer_log_index<'a>(container: &'a ProxyContainer, _params: Option<&'a Value>) -> CommandFuture<'a> {
    Box::pin(async move {
        let proxy = transfer(container, "transfer.log_index")?;
        let index = proxy.log_index().await;
        record_transfer("log_index", index.as_ref().map(|_| ()));
        to_json(&index?)
    })
}

fn transfer_download<'a>(container: &'a ProxyContainer, params: Option<&'a Value>) -> CommandFuture<'a> {
    Box::pin(async move {
        let command = "transfer.download";
        let proxy = transfer(container, command)?;
        let params: DownloadParams = parse_params(command, params)?;
        let remote = params.remote_path.clone();
        let mut next_quarter = 0.25_f32;
        let outcome = proxy
            .download_with_progress(&params.remote_path, &params.local_path, move |fraction| {
                while fraction >= next_quarter {
                    info!(remote = %remote, percent = (next_quarter * 100.0) as u32, "Download progress");
                    next_quarter += 0.25;
                }
            })
            .await;
        record_transfer("download", outcome.as_ref().map(|_| ()));
        to_json(&outcome?)
    })
}

fn transfer_remote_clock<'a>(
    container: &'a ProxyContainer,
    _params: Option<&'a Value>,
) -> CommandFuture<'a> {
    Box::pin(async move {
        let proxy = transfer(container, "transfer.remote_clock")?;
        let clock = proxy.get_remote_clock().await;
        record_transfer("remote_clock", clock.as_ref().map(|_| ()));
        to_json(&clock?)
    })
}

fn transfer_clear_error_logs<'a>(
    container: &'a ProxyContainer,
    params: Option<&'a Value>,
) -> CommandFuture<'a> {
    Box::pin(async move {
        let command = "transfer.clear_error_logs";
        let proxy = transfer(container, command)?;
        let params: ClearErrorLogsParams = parse_params(command, params)?;
        let removed = proxy.clear_error_logs(params.path.as_deref()).await;
        record_transfer("clear_error_logs", removed.as_ref().map(|_| ()));
        removed
            .map(|removed| json!({ "removed": removed }))
            .map_err(CommandError::from)
    })
}

fn transfer_stats<'a>(container: &'a ProxyContainer, _params: Option<&'a Value>) -> CommandFuture<'a> {
    Box::pin(async move { to_json(&transfer(container, "transfer.stats")?.stats()) })
}

// =============================================================================
// GATEWAY COMMANDS
// =============================================================================

fn gateway_status<'a>(container: &'a ProxyContainer, _params: Option<&'a Value>) -> CommandFuture<'a> {
    Box::pin(async move { status_json(container) })
}

fn gateway_metrics<'a>(_container: &'a ProxyContainer, _params: Option<&'a Value>) -> CommandFuture<'a> {
    Box::pin(async move {
        encode_metrics()
            .map(|text| json!({ "text": text }))
            .map_err(|e| CommandError::internal(e.to_string()))
    })
}

fn status_json(container: &ProxyContainer) -> Result<Value, CommandError> {
    let started_at = container.started_at();
    let uptime_s = (Utc::now() - started_at).num_seconds().max(0);
    let mut status = json!({
        "version": crate::VERSION,
        "started_at": started_at.to_rfc3339(),
        "uptime_s": uptime_s,
        "proxies": to_json(&container.infos())?,
    });
    if let Some(telemetry) = &container.telemetry {
        status["telemetry"] = json!({
            "endpoint": telemetry.config().endpoint,
            "target": telemetry.target().map(|t| t.to_string()),
            "stats": to_json(&telemetry.stats())?,
        });
    }
    if let Some(transfer) = &container.transfer {
        status["transfer"] = json!({
            "endpoint": transfer.config().endpoint,
            "stats": to_json(&transfer.stats())?,
        });
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::error::codes;
    use crate::container::GatewayConfig;
    use crate::testing::{started_container, test_config};
    use shared_types::msg_ids;
    use std::time::Instant;

    #[test]
    fn test_table_lists_every_command() {
        let names = command_names();
        assert_eq!(names.len(), CommandTable::standard().len());
        assert_eq!(names.len(), 13);
        for name in ["telemetry.send", "transfer.download", "gateway.metrics"] {
            assert!(names.contains(&name), "{name} missing");
        }
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_every_listed_command_dispatches() {
        let (container, _vehicle) = started_container(test_config()).await;
        for name in command_names() {
            if let Err(err) = route_command(&container, name, None).await {
                assert_ne!(err.code, codes::UNKNOWN_COMMAND, "{name} not routed");
            }
        }
        container.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_oversized_burst_is_invalid() {
        let (container, _vehicle) = started_container(test_config()).await;
        let params = json!({
            "msg_id": 300,
            "msg_type": "STATUSTEXT",
            "burst_count": u32::MAX,
        });
        let err = route_command(&container, "telemetry.send", Some(&params))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
        container.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unknown_command() {
        let (container, _vehicle) = started_container(test_config()).await;
        let err = route_command(&container, "telemetry.fly", None).await.unwrap_err();
        assert_eq!(err.code, codes::UNKNOWN_COMMAND);
        container.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_send_requires_msg_id() {
        let (container, _vehicle) = started_container(test_config()).await;
        let params = json!({ "msg_type": "COMMAND_LONG" });
        let err = route_command(&container, "telemetry.send", Some(&params))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
        container.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_send_burst_reaches_vehicle() {
        let config = GatewayConfig {
            enable_transfer: false,
            ..test_config()
        };
        let (container, vehicle) = started_container(config).await;
        let params = json!({
            "msg_id": 300,
            "msg_type": "STATUSTEXT",
            "fields": { "text": "hello" },
            "burst_count": 3,
        });
        let reply = route_command(&container, "telemetry.send", Some(&params))
            .await
            .unwrap();
        assert_eq!(reply["queued"], 3);

        let link = vehicle.links()[0].clone();
        let deadline = Instant::now() + Duration::from_secs(2);
        let count = loop {
            let count = link.sent().iter().filter(|m| m.msg_id == 300).count();
            if count >= 3 || Instant::now() > deadline {
                break count;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        assert_eq!(count, 3);
        container.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_keyed_burst_is_rejected() {
        let (container, _vehicle) = started_container(test_config()).await;
        let params = json!({
            "msg_id": 300,
            "msg_type": "STATUSTEXT",
            "key": "local",
            "burst_count": 2,
        });
        let err = route_command(&container, "telemetry.send", Some(&params))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
        container.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_request_message_returns_reply() {
        let (container, _vehicle) = started_container(test_config()).await;
        let params = json!({ "message_id": msg_ids::AUTOPILOT_VERSION, "timeout_ms": 1000 });
        let reply = route_command(&container, "telemetry.request_message", Some(&params))
            .await
            .unwrap();
        assert_eq!(reply["msg_id"], msg_ids::AUTOPILOT_VERSION);
        assert_eq!(reply["fields"]["time_boot_ms"], 60_000);
        container.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_list_logs_and_download() {
        let (container, _vehicle) = started_container(test_config()).await;
        let logs = route_command(&container, "transfer.list_logs", None)
            .await
            .unwrap();
        let logs = logs.as_array().unwrap();
        assert_eq!(logs.len(), 3);
        assert!(logs[0]["utc"].as_u64() < logs[2]["utc"].as_u64());

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("first.log");
        let params = json!({
            "remote_path": logs[0]["remote_path"],
            "local_path": local.to_string_lossy(),
        });
        let outcome = route_command(&container, "transfer.download", Some(&params))
            .await
            .unwrap();
        assert_eq!(outcome["size_bytes"], logs[0]["size_bytes"]);
        assert!(local.exists());
        container.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_clear_error_logs_default_path() {
        let (container, vehicle) = started_container(test_config()).await;
        let reply = route_command(&container, "transfer.clear_error_logs", None)
            .await
            .unwrap();
        assert_eq!(reply["removed"], json!(["fs/microsd/fail_001.log"]));
        assert!(!vehicle.has_file("fs/microsd/fail_001.log"));
        container.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_transfer_command_when_disabled() {
        let config = GatewayConfig {
            enable_transfer: false,
            ..test_config()
        };
        let (container, _vehicle) = started_container(config).await;
        let err = route_command(&container, "transfer.remote_clock", None)
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::UNAVAILABLE);
        container.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_gateway_status_lists_proxies() {
        let (container, _vehicle) = started_container(test_config()).await;
        let status = route_command(&container, "gateway.status", None)
            .await
            .unwrap();
        let proxies = status["proxies"].as_array().unwrap();
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0]["status"], "running");
        assert!(status["telemetry"]["stats"]["cycles"].is_u64());
        container.stop_all().await;
    }
}
