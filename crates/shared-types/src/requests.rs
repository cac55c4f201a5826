//! Builders for the request messages the gateway sends on a vehicle's
//! behalf.

use crate::message::{msg_ids, msg_types, LinkMessage, LinkTarget, CMD_REQUEST_MESSAGE};

/// Highest log id a `LOG_REQUEST_LIST` can ask for.
pub const LOG_LIST_END: u32 = 0xFFFF;

/// `COMMAND_LONG` asking `target` to emit the message with `message_id`
/// once.
pub fn request_message(target: LinkTarget, message_id: u32) -> LinkMessage {
    LinkMessage::new(msg_ids::COMMAND_LONG, msg_types::COMMAND_LONG)
        .with_source(target)
        .with_field("target_system", target.system_id)
        .with_field("target_component", target.component_id)
        .with_field("command", CMD_REQUEST_MESSAGE)
        .with_field("confirmation", 0)
        .with_field("param1", f64::from(message_id))
        .with_field("param2", 0.0)
        .with_field("param3", 0.0)
        .with_field("param4", 0.0)
        .with_field("param5", 0.0)
        .with_field("param6", 0.0)
        .with_field("param7", 0.0)
}

/// `LOG_REQUEST_LIST` covering every log id on `target`.
pub fn log_request_list(target: LinkTarget) -> LinkMessage {
    LinkMessage::new(msg_ids::LOG_REQUEST_LIST, msg_types::LOG_REQUEST_LIST)
        .with_source(target)
        .with_field("target_system", target.system_id)
        .with_field("target_component", target.component_id)
        .with_field("start", 0)
        .with_field("end", LOG_LIST_END)
}

/// Message id a `request_message` command asks for, if `message` is one.
#[must_use]
pub fn requested_message_id(message: &LinkMessage) -> Option<u32> {
    if message.msg_id != msg_ids::COMMAND_LONG
        || message.field_u64("command") != Some(u64::from(CMD_REQUEST_MESSAGE))
    {
        return None;
    }
    message.field_u64("param1").map(|id| id as u32)
}
