//! # File-Transfer Flows
//!
//! The transfer client and proxy against a simulated vehicle:
//!
//! 1. **Walk**: directory listing, index matching and utc ordering
//! 2. **Retries**: a flaky listing succeeds after reconnects
//! 3. **Downloads**: progress on the caller, staging recovery, open failures
//! 4. **Clock**: boot-relative and absolute readings

#[cfg(test)]
mod tests {
    use gw_02_file_transfer::application::TransferStats;
    use gw_02_file_transfer::{
        FileTransferConfig, FileTransferProxy, SimulatedVehicle, TransferClient,
    };
    use serde_json::Value;
    use shared_types::{ErrorKind, LinkEndpoint, Proxy, ProxyError};
    use std::sync::Arc;

    const BASE: &str = "fs/microsd/log";

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Two date directories: the first holds two logs, the second is empty.
    fn two_day_vehicle() -> SimulatedVehicle {
        let vehicle = SimulatedVehicle::default();
        vehicle.add_log(0, "fs/microsd/log/2024-06-01/10_30_00.log", 40_000, 1_717_237_800);
        vehicle.add_log(1, "fs/microsd/log/2024-06-01/08_00_00.log", 12_288, 1_717_228_800);
        vehicle.add_dir("fs/microsd/log/2024-06-02");
        vehicle
    }

    fn client(vehicle: &SimulatedVehicle) -> Result<TransferClient, ProxyError> {
        TransferClient::connect(
            LinkEndpoint::sim("flow"),
            Arc::new(vehicle.clone()),
            FileTransferConfig::for_testing(),
            Arc::new(TransferStats::default()),
        )
    }

    async fn started(vehicle: &SimulatedVehicle) -> FileTransferProxy {
        let proxy =
            FileTransferProxy::new(FileTransferConfig::for_testing(), Arc::new(vehicle.clone()))
                .unwrap();
        proxy.start().await.unwrap();
        proxy
    }

    // =============================================================================
    // WALK
    // =============================================================================

    #[test]
    fn test_ls_base_lists_both_date_dirs() {
        let vehicle = two_day_vehicle();
        let mut client = client(&vehicle).unwrap();

        let rows = client.ls(BASE).unwrap();
        let dirs: Vec<_> = rows.iter().filter(|r| r.is_dir).map(|r| r.name.as_str()).collect();
        assert_eq!(dirs, vec!["2024-06-01", "2024-06-02"]);
        assert_eq!(client.ls("fs/microsd/log/2024-06-01").unwrap().len(), 2);
        assert!(client.ls("fs/microsd/log/2024-06-02").unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_list_logs_sorted_by_utc() {
        let vehicle = two_day_vehicle();
        let proxy = started(&vehicle).await;

        let logs = proxy.list_logs().await.unwrap();
        let paths: Vec<_> = logs.iter().map(|l| l.remote_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "fs/microsd/log/2024-06-01/08_00_00.log",
                "fs/microsd/log/2024-06-01/10_30_00.log",
            ]
        );
        assert_eq!(logs[0].utc, 1_717_228_800);
        proxy.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_card_lists_nothing() {
        let vehicle = SimulatedVehicle::default();
        vehicle.add_dir(BASE);
        let proxy = started(&vehicle).await;
        assert!(proxy.list_logs().await.unwrap().is_empty());
        proxy.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_index_disagreement_is_count_mismatch() {
        let vehicle = two_day_vehicle();
        vehicle.add_index_entry(7, 99, 1_717_300_000);
        let proxy = started(&vehicle).await;

        let err = proxy.list_logs().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CountMismatch);
        proxy.stop().await.unwrap();
    }

    // =============================================================================
    // RETRIES
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_flaky_listing_recovers() {
        let vehicle = two_day_vehicle();
        let proxy = started(&vehicle).await;
        vehicle.fail_listing(BASE, 2);

        assert_eq!(proxy.list_logs().await.unwrap().len(), 2);
        let stats = proxy.stats();
        assert_eq!(stats.ls_retries, 2);
        assert_eq!(stats.reconnects, 2);
        proxy.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_listing_gives_up_after_retries() {
        let vehicle = two_day_vehicle();
        let proxy = started(&vehicle).await;
        vehicle.fail_listing(BASE, 10);

        let err = proxy.list_logs().await.unwrap_err();
        assert!(matches!(err, ProxyError::ExhaustedRetries { attempts: 3, .. }));
        assert_eq!(vehicle.list_calls(BASE), 3);
        proxy.stop().await.unwrap();
    }

    // =============================================================================
    // DOWNLOADS
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_download_reports_progress_on_caller() {
        let vehicle = two_day_vehicle();
        let proxy = started(&vehicle).await;
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("nested/08_00_00.log");

        let caller = std::thread::current().id();
        let mut seen = Vec::new();
        let outcome = proxy
            .download_with_progress("fs/microsd/log/2024-06-01/08_00_00.log", &local, |f| {
                assert_eq!(std::thread::current().id(), caller);
                seen.push(f);
            })
            .await
            .unwrap();

        assert_eq!(outcome.size_bytes, 12_288);
        assert!(!outcome.recovered_from_staging);
        assert_eq!(std::fs::metadata(&local).unwrap().len(), 12_288);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
        proxy.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_download_recovers_staging_file() {
        let vehicle = two_day_vehicle();
        vehicle.set_staging_only(true);
        let proxy = started(&vehicle).await;
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("10_30_00.log");

        let outcome = proxy
            .download_with_progress("fs/microsd/log/2024-06-01/10_30_00.log", &local, |_| {})
            .await
            .unwrap();
        assert!(outcome.recovered_from_staging);
        assert_eq!(std::fs::metadata(&local).unwrap().len(), 40_000);
        assert_eq!(proxy.stats().staging_recoveries, 1);
        proxy.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_open_failure_is_transport_error() {
        let vehicle = two_day_vehicle();
        vehicle.set_open_failure(Some(3));
        let proxy = started(&vehicle).await;
        let dir = tempfile::tempdir().unwrap();

        let err = proxy
            .download("fs/microsd/log/2024-06-01/10_30_00.log", dir.path().join("x.log"))
            .await
            .unwrap_err();
        assert_eq!(err, ProxyError::Transport("OpenFileRO failed: 3".into()));
        proxy.stop().await.unwrap();
    }

    // =============================================================================
    // CLOCK
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_absolute_clock_reading() {
        let vehicle = two_day_vehicle();
        vehicle.set_clock_fields([("time_utc".to_string(), Value::from(1_700_000_000_u64))]);
        let proxy = started(&vehicle).await;

        let clock = proxy.get_remote_clock().await.unwrap();
        assert_eq!(clock.timestamp_s, 1_700_000_000);
        assert_eq!(clock.utc_human, "2023-11-14 22:13:20");
        assert!(clock.boot_epoch_s.is_none());
        proxy.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_silent_clock_times_out() {
        let vehicle = two_day_vehicle();
        let proxy = started(&vehicle).await;
        let err = proxy.get_remote_clock().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        proxy.stop().await.unwrap();
    }
}
