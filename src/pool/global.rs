//! Once-only home for the process-wide pool manager
//!
//! ```rust,ignore
//! static INFINITY_CONN: ManagerCell<MyConnector> = ManagerCell::new();
//!
//! let manager = INFINITY_CONN.get_or_try_init(|| {
//!     let settings = infinity_pool::config::load_config(None)?;
//!     InfinityConnectionPool::from_settings(MyConnector::default(), &settings)
//! })?;
//! let pool = manager.get_conn_pool()?;
//!
//! // at process teardown
//! INFINITY_CONN.shutdown();
//! ```
//!
//! Statics are never dropped, so teardown has to be explicit.

use once_cell::sync::OnceCell;
use std::sync::Arc;

use super::client::PoolConnector;
use super::manager::InfinityConnectionPool;

pub struct ManagerCell<C: PoolConnector> {
    manager: OnceCell<Arc<InfinityConnectionPool<C>>>,
}

impl<C: PoolConnector> ManagerCell<C> {
    pub const fn new() -> Self {
        Self {
            manager: OnceCell::new(),
        }
    }

    /// The manager, if initialization already succeeded
    pub fn get(&self) -> Option<Arc<InfinityConnectionPool<C>>> {
        self.manager.get().cloned()
    }

    /// Return the manager, running `init` if this is the first successful access
    ///
    /// Concurrent first callers wait for the one running `init`. A failed
    /// `init` stores nothing, so the next caller tries again.
    pub fn get_or_try_init<F, E>(&self, init: F) -> Result<Arc<InfinityConnectionPool<C>>, E>
    where
        F: FnOnce() -> Result<InfinityConnectionPool<C>, E>,
    {
        self.manager
            .get_or_try_init(|| init().map(Arc::new))
            .map(Arc::clone)
    }

    /// Destroy the managed pool, if one was ever built
    pub fn shutdown(&self) {
        if let Some(manager) = self.manager.get() {
            manager.shutdown();
        }
    }
}

impl<C: PoolConnector> Default for ManagerCell<C> {
    fn default() -> Self {
        Self::new()
    }
}
