//! Network address resolution for the Infinity endpoint
//!
//! Configured URIs come in many shapes (`infinity:23817`,
//! `http://10.0.0.5:23817/`, a bare host name). Resolution never fails:
//! anything that cannot be parsed collapses to the local fallback address.

use std::fmt;
use tracing::{error, warn};

/// Port Infinity's client API listens on by default
pub const DEFAULT_PORT: u16 = 23817;

/// Host used when the configured URI cannot be parsed
pub const FALLBACK_HOST: &str = "127.0.0.1";

/// Errors produced by strict URI parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("URI has an empty host")]
    EmptyHost,

    #[error("Invalid port '{port}': {reason}")]
    InvalidPort { port: String, reason: String },
}

/// Host and port of an Infinity node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkAddress {
    pub host: String,
    pub port: u16,
}

impl NetworkAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The address used when nothing better is known
    pub fn fallback() -> Self {
        Self::new(FALLBACK_HOST, DEFAULT_PORT)
    }

    /// Resolve a configured URI, falling back to `127.0.0.1:23817` on error
    pub fn resolve(uri: &str) -> Self {
        match parse_uri(uri) {
            Ok(address) => address,
            Err(e) => {
                error!(
                    uri = %uri,
                    error = %e,
                    "Failed to parse Infinity URI. Using default {}",
                    Self::fallback()
                );
                Self::fallback()
            }
        }
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Strictly parse `[scheme://]host[:port][/...]`
///
/// More than one colon after the scheme is tolerated: the last segment is
/// taken as the port and the one before it as the host, with a warning.
pub fn parse_uri(uri: &str) -> Result<NetworkAddress, AddressError> {
    let remainder = match uri.split_once("://") {
        Some((_, rest)) => rest,
        None => uri,
    };
    let remainder = remainder.trim_end_matches('/');

    let parts: Vec<&str> = remainder.split(':').collect();
    let (host, port) = match parts.as_slice() {
        [host, port] => (*host, Some(*port)),
        [.., host, port] => {
            warn!(
                uri = %uri,
                "Unexpected Infinity URI format. Trying to parse anyway."
            );
            (*host, Some(*port))
        }
        // No colon at all: host only
        _ => (remainder, None),
    };

    if host.is_empty() {
        return Err(AddressError::EmptyHost);
    }

    let port = match port {
        Some(port) => parse_port(port)?,
        None => DEFAULT_PORT,
    };

    Ok(NetworkAddress::new(host, port))
}

fn parse_port(port: &str) -> Result<u16, AddressError> {
    port.trim()
        .parse::<u16>()
        .map_err(|e| AddressError::InvalidPort {
            port: port.to_string(),
            reason: e.to_string(),
        })
}
