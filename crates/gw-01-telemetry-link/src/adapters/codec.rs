//! # Frame Codecs
//!
//! A codec maps one datagram to one [`LinkMessage`]. The bundled
//! [`JsonCodec`] carries the decoded message as a JSON object, which suits
//! simulators and ground-side relays that already decode the binary
//! protocol.

use shared_types::{LinkError, LinkMessage};

/// Encoder/decoder for one datagram per message.
pub trait LinkCodec: Send + Sync + 'static {
    fn encode(&self, message: &LinkMessage) -> Result<Vec<u8>, LinkError>;

    fn decode(&self, frame: &[u8]) -> Result<LinkMessage, LinkError>;
}

/// JSON object per datagram.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl LinkCodec for JsonCodec {
    fn encode(&self, message: &LinkMessage) -> Result<Vec<u8>, LinkError> {
        serde_json::to_vec(message).map_err(|e| LinkError::Codec(e.to_string()))
    }

    fn decode(&self, frame: &[u8]) -> Result<LinkMessage, LinkError> {
        serde_json::from_slice(frame).map_err(|e| LinkError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::LinkTarget;

    #[test]
    fn test_decode_minimal_frame() {
        let msg = JsonCodec
            .decode(br#"{"msg_id":0,"msg_type":"HEARTBEAT"}"#)
            .unwrap();
        assert!(msg.is_heartbeat());
        assert_eq!(msg.source, LinkTarget::default());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            JsonCodec.decode(b"\xfe\x01"),
            Err(LinkError::Codec(_))
        ));
    }

    #[test]
    fn test_encode_carries_fields() {
        let msg = LinkMessage::new(76, "COMMAND_LONG").with_field("command", 512);
        let bytes = JsonCodec.encode(&msg).unwrap();
        assert_eq!(JsonCodec.decode(&bytes).unwrap(), msg);
    }
}
