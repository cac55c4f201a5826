//! Routing rules of the telemetry link.

use shared_types::{LinkMessage, RoutingKey};

/// Key that carries every message in both directions.
pub const GENERIC_KEY: &str = "mav";

#[must_use]
pub fn generic_key() -> RoutingKey {
    RoutingKey::from(GENERIC_KEY)
}

/// Publish one inbound message under its numeric id, its type name and the
/// generic key, in that order.
pub fn fan_out(message: LinkMessage) -> [(RoutingKey, LinkMessage); 3] {
    let numeric = message.numeric_key();
    let symbolic = message.symbolic_key();
    [
        (numeric, message.clone()),
        (symbolic, message.clone()),
        (generic_key(), message),
    ]
}
