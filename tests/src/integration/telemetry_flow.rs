//! # Telemetry Link Flows
//!
//! The telemetry proxy against a loopback link:
//!
//! 1. **Fan-out**: one inbound message reaches numeric, symbolic and
//!    generic handlers exactly once each
//! 2. **Bursts**: `k` copies leave the link
//! 3. **Request/reply**: waits clean up their temporary handler whether the
//!    reply arrives or not
//! 4. **Bounded outbound**: a full mailbox keeps only the newest messages

#[cfg(test)]
mod tests {
    use crate::integration::wait_until;
    use gw_01_telemetry_link::{TelemetryLinkConfig, TelemetryLinkProxy, GENERIC_KEY};
    use shared_types::{
        msg_ids, msg_types, requests, ErrorKind, LinkMessage, LinkTarget, LoopbackHandle, Proxy,
        ProxyStatus,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const VEHICLE: LinkTarget = LinkTarget {
        system_id: 1,
        component_id: 1,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn proxy_over(handle: &LoopbackHandle, config: TelemetryLinkConfig) -> TelemetryLinkProxy {
        TelemetryLinkProxy::new(config, Arc::new(handle.connector())).unwrap()
    }

    async fn started(handle: &LoopbackHandle) -> TelemetryLinkProxy {
        handle.inject_heartbeat(VEHICLE);
        let proxy = proxy_over(handle, TelemetryLinkConfig::for_testing());
        proxy.start().await.unwrap();
        proxy
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&count), count)
    }

    // =============================================================================
    // FAN-OUT
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_inbound_message_reaches_every_key_once() {
        let handle = LoopbackHandle::new();
        let proxy = started(&handle).await;
        assert_eq!(proxy.status(), ProxyStatus::Running);
        assert_eq!(proxy.target(), Some(VEHICLE));

        let (numeric_sink, numeric) = counter();
        let (symbolic_sink, symbolic) = counter();
        let (generic_sink, generic) = counter();
        proxy.register_handler(
            "42",
            move |_: &LinkMessage| {
                numeric_sink.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            None,
        );
        proxy.register_handler(
            "MISSION_CURRENT",
            move |_: &LinkMessage| {
                symbolic_sink.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            None,
        );
        proxy.register_handler(
            GENERIC_KEY,
            move |message: &LinkMessage| {
                if message.msg_id == 42 {
                    generic_sink.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            },
            None,
        );

        handle.inject(
            LinkMessage::new(42, "MISSION_CURRENT")
                .with_source(VEHICLE)
                .with_field("seq", 3),
        );

        assert!(wait_until(Duration::from_secs(2), || {
            numeric.load(Ordering::SeqCst) == 1
                && symbolic.load(Ordering::SeqCst) == 1
                && generic.load(Ordering::SeqCst) == 1
        }));
        // Several more I/O cycles must not redeliver.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(numeric.load(Ordering::SeqCst), 1);
        assert_eq!(symbolic.load(Ordering::SeqCst), 1);
        assert_eq!(generic.load(Ordering::SeqCst), 1);

        proxy.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failing_handler_does_not_block_others() {
        let handle = LoopbackHandle::new();
        let proxy = started(&handle).await;

        let (sink, delivered) = counter();
        proxy.register_handler(
            "42",
            |_: &LinkMessage| Err(shared_bus::HandlerError::msg("boom")),
            None,
        );
        proxy.register_handler(
            "42",
            move |_: &LinkMessage| {
                sink.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            None,
        );
        handle.inject(LinkMessage::new(42, "MISSION_CURRENT"));

        assert!(wait_until(Duration::from_secs(2), || {
            delivered.load(Ordering::SeqCst) == 1
        }));
        assert!(wait_until(Duration::from_secs(1), || {
            proxy.stats().handler_failures == 1
        }));
        proxy.stop().await.unwrap();
    }

    // =============================================================================
    // OUTBOUND
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_burst_sends_k_copies() {
        let handle = LoopbackHandle::new();
        let proxy = started(&handle).await;

        let message = LinkMessage::new(msg_ids::COMMAND_LONG, msg_types::COMMAND_LONG)
            .with_field("command", 400);
        proxy.send_burst(message, 5, None).unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            handle
                .sent()
                .iter()
                .filter(|m| m.msg_id == msg_ids::COMMAND_LONG)
                .count()
                == 5
        }));
        proxy.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spaced_burst_completes() {
        let handle = LoopbackHandle::new();
        let proxy = started(&handle).await;

        let message = LinkMessage::new(msg_ids::COMMAND_LONG, msg_types::COMMAND_LONG);
        proxy
            .send_burst(message, 3, Some(Duration::from_millis(20)))
            .unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            handle.sent().iter().filter(|m| m.msg_id == msg_ids::COMMAND_LONG).count() == 3
        }));
        proxy.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_outbound_mailbox_keeps_newest() {
        let handle = LoopbackHandle::new();
        handle.inject_heartbeat(VEHICLE);
        let config = TelemetryLinkConfig {
            maxlen: 3,
            ..TelemetryLinkConfig::for_testing()
        };
        let proxy = proxy_over(&handle, config);

        // Queued before start: nothing is written until the link is open.
        for seq in 0..5_u32 {
            proxy.send(LinkMessage::new(300, "STATUSTEXT").with_field("seq", seq));
        }
        assert_eq!(proxy.stats().outbound_evicted, 2);

        proxy.start().await.unwrap();
        assert!(wait_until(Duration::from_secs(2), || handle.sent_count() == 3));
        let seqs: Vec<u64> = handle
            .sent()
            .iter()
            .filter_map(|m| m.field_u64("seq"))
            .collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        proxy.stop().await.unwrap();
    }

    // =============================================================================
    // REQUEST / REPLY
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_request_and_collect_cleans_up() {
        let handle = LoopbackHandle::new();
        handle.respond_with(|message: &LinkMessage| {
            match requests::requested_message_id(message) {
                Some(msg_ids::AUTOPILOT_VERSION) => vec![LinkMessage::new(
                    msg_ids::AUTOPILOT_VERSION,
                    msg_types::AUTOPILOT_VERSION,
                )
                .with_source(VEHICLE)
                .with_field("flight_sw_version", 0x010E_0000_u64)],
                _ => Vec::new(),
            }
        });
        let proxy = started(&handle).await;

        let reply = proxy
            .request_and_collect(msg_ids::AUTOPILOT_VERSION, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.msg_type, msg_types::AUTOPILOT_VERSION);
        assert!(!proxy.has_handlers("148"));
        proxy.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unanswered_request_times_out_and_cleans_up() {
        let handle = LoopbackHandle::new();
        let proxy = started(&handle).await;

        let err = proxy
            .request_and_collect(msg_ids::SYSTEM_TIME, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(!proxy.has_handlers("2"));
        proxy.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_send_and_wait_from_worker_thread() {
        let handle = LoopbackHandle::new();
        handle.respond_with(|message: &LinkMessage| {
            if message.msg_id == msg_ids::LOG_REQUEST_LIST {
                vec![LinkMessage::new(msg_ids::LOG_ENTRY, msg_types::LOG_ENTRY)
                    .with_field("id", 0)
                    .with_field("num_logs", 0)]
            } else {
                Vec::new()
            }
        });
        let proxy = Arc::new(started(&handle).await);

        let worker = Arc::clone(&proxy);
        let outcome = tokio::task::spawn_blocking(move || {
            let request = requests::log_request_list(VEHICLE);
            worker.send_and_wait(
                msg_types::LOG_ENTRY,
                request,
                |entry| entry.field_u64("num_logs") == Some(0),
                Duration::from_secs(1),
            )
        })
        .await
        .unwrap();
        assert!(outcome.is_ok());
        assert!(!proxy.has_handlers(msg_types::LOG_ENTRY));
        proxy.stop().await.unwrap();
    }

    // =============================================================================
    // LIFECYCLE
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_without_heartbeat_fails() {
        let handle = LoopbackHandle::new();
        let proxy = proxy_over(&handle, TelemetryLinkConfig::for_testing());
        let err = proxy.start().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_ne!(proxy.status(), ProxyStatus::Running);
    }
}
