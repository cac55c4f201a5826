//! # Link Endpoints
//!
//! ```text
//! udp:0.0.0.0:14550      listen for a vehicle (alias of udpin)
//! udpin:0.0.0.0:14550    listen for a vehicle
//! udpout:10.0.0.2:14550  send to a vehicle
//! tcp:127.0.0.1:5760     stream connection
//! serial:/dev/ttyUSB0    serial device (baud from config)
//! /dev/ttyACM0           bare device path, same as serial:
//! sim:demo               in-process simulated vehicle
//! ```

use crate::errors::ProxyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Baud rate used for serial endpoints when none is configured.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Transport family of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    UdpIn,
    UdpOut,
    Tcp,
    Serial,
    Sim,
}

impl EndpointKind {
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::UdpIn => "udpin",
            Self::UdpOut => "udpout",
            Self::Tcp => "tcp",
            Self::Serial => "serial",
            Self::Sim => "sim",
        }
    }
}

/// A parsed link endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEndpoint {
    pub kind: EndpointKind,
    /// `host:port` for network kinds, a device path for serial, a free-form
    /// name for simulated links.
    pub address: String,
    /// Serial line speed. Ignored by other kinds.
    pub baud: u32,
}

impl LinkEndpoint {
    /// Parse an endpoint string.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Validation`] for unknown schemes, empty
    /// addresses, or network addresses that are not `host:port`.
    pub fn parse(raw: &str, baud: u32) -> Result<Self, ProxyError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ProxyError::Validation("endpoint is empty".into()));
        }

        let (kind, address) = if raw.starts_with('/') {
            (EndpointKind::Serial, raw)
        } else {
            let (scheme, rest) = raw.split_once(':').ok_or_else(|| {
                ProxyError::Validation(format!("endpoint '{raw}' has no scheme"))
            })?;
            let kind = match scheme.to_ascii_lowercase().as_str() {
                "udp" | "udpin" => EndpointKind::UdpIn,
                "udpout" => EndpointKind::UdpOut,
                "tcp" => EndpointKind::Tcp,
                "serial" => EndpointKind::Serial,
                "sim" => EndpointKind::Sim,
                other => {
                    return Err(ProxyError::Validation(format!(
                        "unknown endpoint scheme '{other}'"
                    )))
                }
            };
            (kind, rest)
        };

        if address.is_empty() {
            return Err(ProxyError::Validation(format!(
                "endpoint '{raw}' has no address"
            )));
        }
        if matches!(
            kind,
            EndpointKind::UdpIn | EndpointKind::UdpOut | EndpointKind::Tcp
        ) {
            let (host, port) = address.rsplit_once(':').ok_or_else(|| {
                ProxyError::Validation(format!("endpoint '{raw}' is not host:port"))
            })?;
            if host.is_empty() || port.parse::<u16>().is_err() {
                return Err(ProxyError::Validation(format!(
                    "endpoint '{raw}' is not host:port"
                )));
            }
        }
        if kind == EndpointKind::Serial && baud == 0 {
            return Err(ProxyError::Validation("serial baud must be > 0".into()));
        }

        Ok(Self {
            kind,
            address: address.to_string(),
            baud,
        })
    }

    /// Simulated endpoint with the given name.
    pub fn sim(name: impl Into<String>) -> Self {
        Self {
            kind: EndpointKind::Sim,
            address: name.into(),
            baud: DEFAULT_BAUD,
        }
    }

    /// Resolve a network endpoint to a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Validation`] when the address does not parse as
    /// a literal socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ProxyError> {
        self.address
            .parse()
            .map_err(|e| ProxyError::Validation(format!("{}: {e}", self.address)))
    }
}

impl fmt::Display for LinkEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.scheme(), self.address)
    }
}
