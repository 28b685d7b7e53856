//! Self-healing manager for the Infinity connection pool
//!
//! The manager owns exactly one pool handle at a time. It is built by
//! connecting and probing the node in bounded rounds until the node reports
//! itself healthy, hands out shared handles to callers, and replaces the
//! pool wholesale when a later liveness check fails.
//!
//! Startup and rebuild deliberately differ: startup retries with a fixed
//! backoff and fails hard once the budget is spent, while a rebuild is a
//! single attempt whose failure is returned to the caller.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::address::NetworkAddress;
use super::client::{probe, ClientError, ConnectionPool, PoolConnector, ProbeError};
use crate::config::{InfinityConfig, PoolOptions, Settings};

/// Error types for pool manager operations
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Infinity {uri} is unhealthy in {}s", .waited.as_secs())]
    Unhealthy { uri: String, waited: Duration },

    #[error("Failed to rebuild Infinity connection pool: {0}")]
    Rebuild(#[source] ClientError),

    #[error("Infinity connection pool is unavailable after a failed rebuild")]
    Unavailable,

    #[error("Infinity connection pool has been shut down")]
    ShutDown,
}

/// Blocking pause between startup rounds
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Observable manager state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// A pool handle is stored
    Healthy,

    /// The last rebuild failed; the next refresh rebuilds directly
    Unavailable,

    /// Torn down, terminal
    ShutDown,
}

enum Slot<P> {
    Ready(Arc<P>),
    Unavailable,
    ShutDown,
}

/// Owner of the process's Infinity connection pool
pub struct InfinityConnectionPool<C: PoolConnector> {
    connector: C,
    uri: String,
    address: NetworkAddress,
    options: PoolOptions,
    slot: RwLock<Slot<C::Pool>>,
    /// Serializes refresh and shutdown so a handle is never destroyed twice
    refresh_lock: Mutex<()>,
}

impl<C: PoolConnector> InfinityConnectionPool<C> {
    /// Connect to the configured node, blocking until it is healthy or the
    /// retry budget is spent
    pub fn new(connector: C, config: &InfinityConfig) -> Result<Self, ManagerError> {
        Self::with_sleeper(connector, config, &ThreadSleeper)
    }

    /// Build from service settings (structured section or `infinity` file section)
    pub fn from_settings(connector: C, settings: &Settings) -> anyhow::Result<Self> {
        let config = settings.infinity_config()?;
        Ok(Self::new(connector, &config)?)
    }

    /// Like [`new`](Self::new), pausing between rounds through `sleeper`
    pub fn with_sleeper(
        connector: C,
        config: &InfinityConfig,
        sleeper: &dyn Sleeper,
    ) -> Result<Self, ManagerError> {
        let address = NetworkAddress::resolve(&config.uri);
        let options = config.pool.clone();

        let pool = connect_until_healthy(&connector, &config.uri, &address, &options, sleeper)?;
        info!(uri = %config.uri, address = %address, "Infinity {} is healthy.", config.uri);

        Ok(Self {
            connector,
            uri: config.uri.clone(),
            address,
            options,
            slot: RwLock::new(Slot::Ready(Arc::new(pool))),
            refresh_lock: Mutex::new(()),
        })
    }

    /// The current pool handle
    pub fn get_conn_pool(&self) -> Result<Arc<C::Pool>, ManagerError> {
        match &*self.read_slot() {
            Slot::Ready(pool) => Ok(Arc::clone(pool)),
            Slot::Unavailable => Err(ManagerError::Unavailable),
            Slot::ShutDown => Err(ManagerError::ShutDown),
        }
    }

    /// Re-check liveness, rebuilding the pool if the node does not answer healthy
    ///
    /// A healthy probe returns the very same handle. Otherwise the current
    /// pool is destroyed and one new pool of `refresh_max_size` is built in a
    /// single attempt; if that attempt fails the error is returned and the
    /// manager stays [`ManagerState::Unavailable`] until a later refresh
    /// succeeds.
    pub fn refresh_conn_pool(&self) -> Result<Arc<C::Pool>, ManagerError> {
        let _guard = self.lock_refresh();

        let current = match &*self.read_slot() {
            Slot::Ready(pool) => Some(Arc::clone(pool)),
            Slot::Unavailable => None,
            Slot::ShutDown => return Err(ManagerError::ShutDown),
        };

        match current {
            Some(pool) => match probe(&*pool) {
                Ok(_) => {
                    debug!(uri = %self.uri, "Infinity liveness check passed");
                    return Ok(pool);
                }
                Err(e) => {
                    error!(uri = %self.uri, error = %e, "{}", e);
                    // Unpublish before destroying so readers never get a dead handle
                    *self.write_slot() = Slot::Unavailable;
                    pool.destroy();
                }
            },
            None => {
                warn!(uri = %self.uri, "No Infinity connection pool stored, rebuilding");
            }
        }

        self.rebuild()
    }

    /// Destroy the stored pool; later calls return [`ManagerError::ShutDown`]
    pub fn shutdown(&self) {
        let _guard = self.lock_refresh();
        let previous = std::mem::replace(&mut *self.write_slot(), Slot::ShutDown);
        if let Slot::Ready(pool) = previous {
            pool.destroy();
            info!(uri = %self.uri, "Infinity connection pool destroyed");
        }
    }

    pub fn state(&self) -> ManagerState {
        match &*self.read_slot() {
            Slot::Ready(_) => ManagerState::Healthy,
            Slot::Unavailable => ManagerState::Unavailable,
            Slot::ShutDown => ManagerState::ShutDown,
        }
    }

    /// The configured URI, as written
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The address the URI resolved to
    pub fn address(&self) -> &NetworkAddress {
        &self.address
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    fn rebuild(&self) -> Result<Arc<C::Pool>, ManagerError> {
        let max_size = self.options.refresh_max_size;
        match self.connector.connect(&self.address, max_size) {
            Ok(pool) => {
                let pool = Arc::new(pool);
                *self.write_slot() = Slot::Ready(Arc::clone(&pool));
                info!(uri = %self.uri, max_size, "Rebuilt Infinity connection pool");
                Ok(pool)
            }
            Err(e) => {
                error!(uri = %self.uri, max_size, error = %e, "Failed to rebuild Infinity connection pool");
                Err(ManagerError::Rebuild(e))
            }
        }
    }

    fn read_slot(&self) -> RwLockReadGuard<'_, Slot<C::Pool>> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Slot<C::Pool>> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: PoolConnector> fmt::Debug for InfinityConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfinityConnectionPool")
            .field("uri", &self.uri)
            .field("address", &self.address)
            .field("options", &self.options)
            .field("state", &self.state())
            .finish()
    }
}

impl<C: PoolConnector> Drop for InfinityConnectionPool<C> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Slot::Ready(pool) = std::mem::replace(slot, Slot::ShutDown) {
            pool.destroy();
            debug!(uri = %self.uri, "Infinity connection pool destroyed on drop");
        }
    }
}

/// Connect and probe in rounds until the node is healthy
fn connect_until_healthy<C: PoolConnector>(
    connector: &C,
    uri: &str,
    address: &NetworkAddress,
    options: &PoolOptions,
    sleeper: &dyn Sleeper,
) -> Result<C::Pool, ManagerError> {
    for attempt in 1..=options.retry_rounds {
        match connect_and_probe(connector, address, options.max_size) {
            Ok(pool) => {
                debug!(uri = %uri, attempt, "Infinity answered healthy");
                return Ok(pool);
            }
            Err(e) => {
                warn!(
                    uri = %uri,
                    attempt,
                    rounds = options.retry_rounds,
                    "{}. Waiting Infinity {} to be healthy.",
                    e,
                    uri
                );
                sleeper.sleep(options.retry_interval());
            }
        }
    }

    let err = ManagerError::Unhealthy {
        uri: uri.to_string(),
        waited: options.startup_budget(),
    };
    error!(uri = %uri, rounds = options.retry_rounds, "{}", err);
    Err(err)
}

fn connect_and_probe<C: PoolConnector>(
    connector: &C,
    address: &NetworkAddress,
    max_size: usize,
) -> Result<C::Pool, ProbeError> {
    let pool = connector.connect(address, max_size)?;
    match probe(&pool) {
        Ok(_) => Ok(pool),
        Err(e) => {
            pool.destroy();
            Err(e)
        }
    }
}
