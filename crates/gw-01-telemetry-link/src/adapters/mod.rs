//! Link adapters: frame codecs and the UDP connector.

pub mod codec;
pub mod udp;

pub use codec::{JsonCodec, LinkCodec};
pub use udp::UdpLinkConnector;
