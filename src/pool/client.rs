//! Client seam for the Infinity connection pool
//!
//! Connection multiplexing and the wire protocol live in the client
//! library. This crate only needs a handful of operations from it, which are
//! captured here as traits:
//!
//! - [`PoolConnector`]: builds a pool for an address with a bounded size
//! - [`ConnectionPool`]: lends and takes back connections, and can be destroyed
//! - [`Connection`]: answers the "show current node" health probe
//!
//! [`probe`] runs that health probe against a pool and always hands the
//! borrowed connection back.

use std::fmt;

use super::address::NetworkAddress;

/// Server states that count as healthy
pub const HEALTHY_SERVER_STATES: [&str; 2] = ["started", "alive"];

/// Status code returned by Infinity for every request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i64);

impl ErrorCode {
    pub const OK: ErrorCode = ErrorCode(0);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Response to the "show current node" request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub error_code: ErrorCode,
    pub server_status: String,
}

impl NodeStatus {
    pub fn new(error_code: ErrorCode, server_status: impl Into<String>) -> Self {
        Self {
            error_code,
            server_status: server_status.into(),
        }
    }

    /// OK status code and a server state of `started` or `alive`
    pub fn is_healthy(&self) -> bool {
        self.error_code.is_ok() && HEALTHY_SERVER_STATES.contains(&self.server_status.as_str())
    }
}

/// Errors raised by the client library
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to connect to Infinity at {address}: {reason}")]
    ConnectionFailed {
        address: NetworkAddress,
        reason: String,
    },

    #[error("Connection pool is exhausted")]
    PoolExhausted,

    #[error("Connection pool has been destroyed")]
    PoolDestroyed,

    #[error("Request failed with code {code}: {message}")]
    Request { code: ErrorCode, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single borrowed connection to an Infinity node
pub trait Connection: Send {
    /// Ask the node to report its own status
    fn show_current_node(&mut self) -> Result<NodeStatus, ClientError>;
}

/// A bounded set of reusable connections to one Infinity node
///
/// Implementations must be safe to borrow from and release to concurrently.
pub trait ConnectionPool: Send + Sync {
    type Conn: Connection;

    /// Borrow a connection
    fn get_conn(&self) -> Result<Self::Conn, ClientError>;

    /// Hand a borrowed connection back
    fn release_conn(&self, conn: Self::Conn);

    /// Close every connection held by the pool
    fn destroy(&self);
}

/// Builds connection pools against an address
pub trait PoolConnector: Send + Sync {
    type Pool: ConnectionPool;

    fn connect(&self, address: &NetworkAddress, max_size: usize) -> Result<Self::Pool, ClientError>;
}

/// Why a health probe did not report a healthy node
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{error_code}: {server_status}")]
    Unhealthy {
        error_code: ErrorCode,
        server_status: String,
    },

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Borrow one connection, run "show current node", give the connection back
pub fn probe<P: ConnectionPool>(pool: &P) -> Result<NodeStatus, ProbeError> {
    let mut conn = pool.get_conn()?;
    let result = conn.show_current_node();
    pool.release_conn(conn);

    let status = result?;
    if status.is_healthy() {
        Ok(status)
    } else {
        Err(ProbeError::Unhealthy {
            error_code: status.error_code,
            server_status: status.server_status,
        })
    }
}
