//! # Remote Clock Extraction
//!
//! A clock reply may carry its time in one of several fields. They are
//! checked in this order and the first one present wins:
//!
//! | Field          | Meaning                         |
//! |----------------|---------------------------------|
//! | `time_utc`     | absolute, seconds               |
//! | `time_boot_ms` | since boot, milliseconds        |
//! | `time_usec`    | since boot, microseconds        |
//! | capture time   | local reception time, seconds   |
//!
//! Boot-relative readings are anchored to the reply's capture time: the
//! reading is the capture time itself, and the boot instant is estimated as
//! capture time minus uptime.

use super::entities::RemoteClock;
use chrono::DateTime;
use shared_types::{LinkMessage, ProxyError};

/// Field name reported when the capture time was used.
pub const CAPTURE_TIME_FIELD: &str = "_timestamp";

const HUMAN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

enum Reading {
    Absolute(f64),
    Uptime(f64),
}

/// Resolve the vehicle's clock from `reply`.
///
/// `local_now_s` stands in for the capture time when the reply has none.
///
/// # Errors
///
/// [`ProxyError::Validation`] when no timestamp-bearing field is present or
/// the value cannot be represented as a calendar time.
pub fn extract_remote_clock(reply: &LinkMessage, local_now_s: f64) -> Result<RemoteClock, ProxyError> {
    let captured_s = reply.captured_at.unwrap_or(local_now_s);

    let (field, reading) = if let Some(v) = reply.field_f64("time_utc") {
        ("time_utc", Reading::Absolute(v))
    } else if let Some(v) = reply.field_f64("time_boot_ms") {
        ("time_boot_ms", Reading::Uptime(v / 1_000.0))
    } else if let Some(v) = reply.field_f64("time_usec") {
        ("time_usec", Reading::Uptime(v / 1_000_000.0))
    } else if let Some(v) = reply.captured_at {
        (CAPTURE_TIME_FIELD, Reading::Absolute(v))
    } else {
        return Err(ProxyError::Validation(format!(
            "{} reply carries no timestamp field",
            reply.msg_type
        )));
    };

    let (timestamp_s, boot_epoch_s) = match reading {
        Reading::Absolute(v) => (to_whole_seconds(v)?, None),
        Reading::Uptime(uptime) => (
            to_whole_seconds(captured_s)?,
            Some(to_whole_seconds(captured_s - uptime)?),
        ),
    };

    let utc_human = DateTime::from_timestamp(timestamp_s, 0)
        .map(|dt| dt.format(HUMAN_FORMAT).to_string())
        .ok_or_else(|| ProxyError::Validation(format!("timestamp {timestamp_s} out of range")))?;

    Ok(RemoteClock {
        timestamp_s,
        utc_human,
        source_field: field.to_string(),
        boot_epoch_s,
    })
}

fn to_whole_seconds(value: f64) -> Result<i64, ProxyError> {
    if !value.is_finite() || value.abs() > 8.0e15 {
        return Err(ProxyError::Validation(format!("timestamp {value} out of range")));
    }
    Ok(value.floor() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ErrorKind;

    const CAPTURE: f64 = 1_700_000_120.75;

    fn reply() -> LinkMessage {
        let mut msg = LinkMessage::new(148, "AUTOPILOT_VERSION");
        msg.captured_at = Some(CAPTURE);
        msg
    }

    #[test]
    fn test_utc_field_wins() {
        let msg = reply()
            .with_field("time_utc", 1_700_000_000)
            .with_field("time_boot_ms", 60_000);
        let clock = extract_remote_clock(&msg, 0.0).unwrap();
        assert_eq!(clock.source_field, "time_utc");
        assert_eq!(clock.timestamp_s, 1_700_000_000);
        assert_eq!(clock.utc_human, "2023-11-14 22:13:20");
        assert_eq!(clock.boot_epoch_s, None);
    }

    #[test]
    fn test_boot_ms_anchored_to_capture() {
        let msg = reply().with_field("time_boot_ms", 60_000);
        let clock = extract_remote_clock(&msg, 0.0).unwrap();
        assert_eq!(clock.source_field, "time_boot_ms");
        assert_eq!(clock.timestamp_s, 1_700_000_120);
        assert_eq!(clock.boot_epoch_s, Some(1_700_000_060));
    }

    #[test]
    fn test_boot_usec() {
        let msg = reply().with_field("time_usec", 120_000_000u64);
        let clock = extract_remote_clock(&msg, 0.0).unwrap();
        assert_eq!(clock.source_field, "time_usec");
        assert_eq!(clock.boot_epoch_s, Some(1_700_000_000));
    }

    #[test]
    fn test_capture_time_fallback() {
        let clock = extract_remote_clock(&reply(), 0.0).unwrap();
        assert_eq!(clock.source_field, CAPTURE_TIME_FIELD);
        assert_eq!(clock.timestamp_s, 1_700_000_120);
    }

    #[test]
    fn test_missing_fields_is_validation_error() {
        let msg = LinkMessage::new(148, "AUTOPILOT_VERSION");
        let err = extract_remote_clock(&msg, CAPTURE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_local_now_used_without_capture_time() {
        let msg = LinkMessage::new(148, "AUTOPILOT_VERSION").with_field("time_boot_ms", 1_000);
        let clock = extract_remote_clock(&msg, 1_000.5).unwrap();
        assert_eq!(clock.timestamp_s, 1_000);
        assert_eq!(clock.boot_epoch_s, Some(999));
    }

    #[test]
    fn test_out_of_range_value() {
        let msg = reply().with_field("time_utc", 1.0e300);
        assert_eq!(
            extract_remote_clock(&msg, 0.0).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }
}
