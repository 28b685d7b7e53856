//! infinity-pool - Process-wide, self-healing connection pool manager for Infinity

pub mod config;
pub mod pool;

pub use config::{InfinityConfig, PoolOptions, Settings};
pub use pool::{InfinityConnectionPool, ManagerCell, ManagerError, NetworkAddress};
