//! Infinity connection pool management
//!
//! This module provides:
//! - Tolerant resolution of the configured Infinity URI
//! - The client seam the pool manager drives (connector, pool, connection)
//! - A manager that waits for the node at startup and rebuilds the pool on failure
//! - A once-only cell for the process-wide manager

pub mod address;
pub mod client;
pub mod global;
pub mod manager;

pub use address::{parse_uri, AddressError, NetworkAddress, DEFAULT_PORT, FALLBACK_HOST};
pub use client::{
    probe, ClientError, Connection, ConnectionPool, ErrorCode, NodeStatus, PoolConnector,
    ProbeError, HEALTHY_SERVER_STATES,
};
pub use global::ManagerCell;
pub use manager::{InfinityConnectionPool, ManagerError, ManagerState, Sleeper, ThreadSleeper};
