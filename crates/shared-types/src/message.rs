//! # Link Message Model
//!
//! The decoded form of a telemetry-link frame. Codecs turn bytes into
//! [`LinkMessage`] values at the connection boundary; the bridge, the
//! handler registry and every proxy only ever see this shape.
//!
//! ```text
//! ┌──────────────┐   decode    ┌─────────────┐  fan-out  ┌──────────────┐
//! │ wire frame   │ ──────────→ │ LinkMessage │ ────────→ │ RoutingKey×3 │
//! └──────────────┘             └─────────────┘           └──────────────┘
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

// =============================================================================
// ROUTING KEYS
// =============================================================================

/// Name of a logical channel of traffic.
///
/// Inbound link messages are published under their numeric id, their
/// symbolic type name and the generic key. Outbound traffic is queued per
/// key as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Create a key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key under which messages with this numeric id are published.
    #[must_use]
    pub fn numeric(msg_id: u32) -> Self {
        Self(msg_id.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RoutingKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoutingKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for RoutingKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&RoutingKey> for RoutingKey {
    fn from(key: &RoutingKey) -> Self {
        key.clone()
    }
}

// =============================================================================
// ADDRESSING
// =============================================================================

/// System/component pair identifying one node on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LinkTarget {
    /// Vehicle (system) id.
    pub system_id: u8,
    /// Component id within the system.
    pub component_id: u8,
}

impl LinkTarget {
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
        }
    }
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.system_id, self.component_id)
    }
}

// =============================================================================
// MESSAGE
// =============================================================================

/// A decoded link message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkMessage {
    /// Numeric message id.
    pub msg_id: u32,
    /// Symbolic message type, e.g. `HEARTBEAT`.
    pub msg_type: String,
    /// Node that produced (or should receive) the message.
    #[serde(default)]
    pub source: LinkTarget,
    /// Decoded payload fields.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Local wall-clock capture time in seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<f64>,
}

impl LinkMessage {
    pub fn new(msg_id: u32, msg_type: impl Into<String>) -> Self {
        Self {
            msg_id,
            msg_type: msg_type.into(),
            source: LinkTarget::default(),
            fields: BTreeMap::new(),
            captured_at: None,
        }
    }

    /// Builder: set one payload field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder: set the source node.
    pub fn with_source(mut self, source: LinkTarget) -> Self {
        self.source = source;
        self
    }

    /// Stamp the capture time with the local clock unless already set.
    pub fn captured_now(mut self) -> Self {
        if self.captured_at.is_none() {
            self.captured_at = Some(unix_now_secs());
        }
        self
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Read a field as an unsigned integer. Non-negative floats are
    /// truncated.
    #[must_use]
    pub fn field_u64(&self, name: &str) -> Option<u64> {
        let value = self.fields.get(name)?;
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v as u64)
        })
    }

    #[must_use]
    pub fn field_f64(&self, name: &str) -> Option<f64> {
        self.fields.get(name)?.as_f64()
    }

    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name)?.as_str()
    }

    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.msg_id == msg_ids::HEARTBEAT && self.msg_type == msg_types::HEARTBEAT
    }

    /// Key for this message's numeric id.
    #[must_use]
    pub fn numeric_key(&self) -> RoutingKey {
        RoutingKey::numeric(self.msg_id)
    }

    /// Key for this message's symbolic type name.
    #[must_use]
    pub fn symbolic_key(&self) -> RoutingKey {
        RoutingKey::new(self.msg_type.clone())
    }
}

/// Textual form used by duplicate filtering: the type name and payload.
/// Capture time and header addressing are left out, so two frames with the
/// same content render identically.
impl fmt::Display for LinkMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.msg_type)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name} : {value}")?;
        }
        f.write_str("}")
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
#[must_use]
pub fn unix_now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// =============================================================================
// WELL-KNOWN IDS
// =============================================================================

/// Numeric ids of the messages the gateway itself produces or consumes.
pub mod msg_ids {
    pub const HEARTBEAT: u32 = 0;
    pub const SYSTEM_TIME: u32 = 2;
    pub const COMMAND_LONG: u32 = 76;
    pub const COMMAND_ACK: u32 = 77;
    pub const FILE_TRANSFER_PROTOCOL: u32 = 110;
    pub const LOG_REQUEST_LIST: u32 = 117;
    pub const LOG_ENTRY: u32 = 118;
    pub const AUTOPILOT_VERSION: u32 = 148;
}

/// Symbolic names matching [`msg_ids`].
pub mod msg_types {
    pub const HEARTBEAT: &str = "HEARTBEAT";
    pub const SYSTEM_TIME: &str = "SYSTEM_TIME";
    pub const COMMAND_LONG: &str = "COMMAND_LONG";
    pub const COMMAND_ACK: &str = "COMMAND_ACK";
    pub const FILE_TRANSFER_PROTOCOL: &str = "FILE_TRANSFER_PROTOCOL";
    pub const LOG_REQUEST_LIST: &str = "LOG_REQUEST_LIST";
    pub const LOG_ENTRY: &str = "LOG_ENTRY";
    pub const AUTOPILOT_VERSION: &str = "AUTOPILOT_VERSION";
}

/// Command id asking the vehicle to emit one message by id.
pub const CMD_REQUEST_MESSAGE: u32 = 512;
