//! # Gateway Flows
//!
//! The assembled runtime over the demo vehicle, driven through its command
//! surface the way the binary drives it.

#[cfg(test)]
mod tests {
    use gateway_runtime::commands::codes;
    use gateway_runtime::{GatewayConfig, GatewayRuntime};
    use gw_01_telemetry_link::TelemetryLinkConfig;
    use gw_02_file_transfer::FileTransferConfig;
    use serde_json::json;
    use shared_types::msg_ids;

    fn config() -> GatewayConfig {
        GatewayConfig {
            telemetry: TelemetryLinkConfig::for_testing(),
            transfer: FileTransferConfig::for_testing(),
            stats_interval_ms: 20,
            sim_heartbeat_ms: 20,
            ..GatewayConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_list_then_download_first_log() {
        let runtime = GatewayRuntime::new(config()).unwrap();
        runtime.start().await.unwrap();

        let logs = runtime.execute("transfer.list_logs", None).await.unwrap();
        let logs = logs.as_array().unwrap().clone();
        assert_eq!(logs.len(), 3);

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("log0.log");
        let params = json!({
            "remote_path": logs[0]["remote_path"],
            "local_path": local.to_string_lossy(),
        });
        runtime.execute("transfer.download", Some(&params)).await.unwrap();
        assert_eq!(
            std::fs::metadata(&local).unwrap().len(),
            logs[0]["size_bytes"].as_u64().unwrap()
        );

        let status = runtime.execute("gateway.status", None).await.unwrap();
        assert_eq!(status["transfer"]["stats"]["downloads"], 1);
        runtime.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_telemetry_and_transfer_share_the_vehicle() {
        let runtime = GatewayRuntime::new(config()).unwrap();
        runtime.start().await.unwrap();

        let params = json!({ "message_id": msg_ids::AUTOPILOT_VERSION });
        let reply = runtime
            .execute("telemetry.request_message", Some(&params))
            .await
            .unwrap();
        let clock = runtime.execute("transfer.remote_clock", None).await.unwrap();
        assert_eq!(
            reply["fields"]["time_boot_ms"],
            json!(60_000),
        );
        assert_eq!(clock["source_field"], "time_boot_ms");
        runtime.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_commands_after_shutdown_fail() {
        let runtime = GatewayRuntime::new(config()).unwrap();
        runtime.start().await.unwrap();
        runtime.shutdown().await;

        let err = runtime.execute("transfer.list_logs", None).await.unwrap_err();
        assert_eq!(err.code, codes::NOT_STARTED);
    }
}
