//! Test doubles shared by the integration tests
//!
//! - [`MockConnector`]: builds in-memory pools following a scripted plan
//! - [`RecordingSleeper`]: records backoff pauses instead of sleeping
//! - [`capture_logs`]: runs a closure under a subscriber that keeps every event

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use infinity_pool::pool::{
    ClientError, Connection, ConnectionPool, ErrorCode, NetworkAddress, NodeStatus,
    PoolConnector, Sleeper,
};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// What a pool's "show current node" answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Healthy,
    Status(&'static str),
    Fails,
    /// `get_conn` itself fails
    NoConnections,
}

/// What the next `connect` call does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Refuse,
    Pool(Behavior),
}

/// Shared view of one pool built by the connector
#[derive(Debug)]
pub struct PoolState {
    pub id: usize,
    pub address: NetworkAddress,
    pub max_size: usize,
    behavior: Mutex<Behavior>,
    pub borrowed: AtomicUsize,
    pub released: AtomicUsize,
    pub destroyed: AtomicUsize,
}

impl PoolState {
    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

pub struct MockConnection {
    state: Arc<PoolState>,
}

impl Connection for MockConnection {
    fn show_current_node(&mut self) -> Result<NodeStatus, ClientError> {
        match *self.state.behavior.lock().unwrap() {
            Behavior::Healthy => Ok(NodeStatus::new(ErrorCode::OK, "alive")),
            Behavior::Status(status) => Ok(NodeStatus::new(ErrorCode::OK, status)),
            Behavior::Fails | Behavior::NoConnections => Err(ClientError::Request {
                code: ErrorCode(2005),
                message: "connection reset by peer".to_string(),
            }),
        }
    }
}

#[derive(Debug)]
pub struct MockPool {
    pub state: Arc<PoolState>,
}

impl ConnectionPool for MockPool {
    type Conn = MockConnection;

    fn get_conn(&self) -> Result<MockConnection, ClientError> {
        if self.state.destroy_count() > 0 {
            return Err(ClientError::PoolDestroyed);
        }
        if *self.state.behavior.lock().unwrap() == Behavior::NoConnections {
            return Err(ClientError::PoolExhausted);
        }
        self.state.borrowed.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            state: Arc::clone(&self.state),
        })
    }

    fn release_conn(&self, _conn: MockConnection) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.state.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ConnectorState {
    plan: Mutex<VecDeque<Plan>>,
    pools: Mutex<Vec<Arc<PoolState>>>,
    connect_calls: AtomicUsize,
    connect_delay: Mutex<Option<Duration>>,
}

/// Connector whose `connect` results follow a queue of [`Plan`]s
///
/// Once the queue is empty every connect yields a healthy pool. Clones share
/// the same plan and history.
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<ConnectorState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(plan: impl IntoIterator<Item = Plan>) -> Self {
        let connector = Self::new();
        connector.push_plan(plan);
        connector
    }

    pub fn push_plan(&self, plan: impl IntoIterator<Item = Plan>) {
        self.inner.plan.lock().unwrap().extend(plan);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.inner.connect_delay.lock().unwrap() = Some(delay);
    }

    pub fn connect_calls(&self) -> usize {
        self.inner.connect_calls.load(Ordering::SeqCst)
    }

    /// Every pool built so far, oldest first
    pub fn pools(&self) -> Vec<Arc<PoolState>> {
        self.inner.pools.lock().unwrap().clone()
    }

    pub fn last_pool(&self) -> Arc<PoolState> {
        self.pools().last().cloned().expect("no pool built yet")
    }
}

impl PoolConnector for MockConnector {
    type Pool = MockPool;

    fn connect(&self, address: &NetworkAddress, max_size: usize) -> Result<MockPool, ClientError> {
        self.inner.connect_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.inner.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let plan = self
            .inner
            .plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Plan::Pool(Behavior::Healthy));

        let behavior = match plan {
            Plan::Refuse => {
                return Err(ClientError::ConnectionFailed {
                    address: address.clone(),
                    reason: "connection refused".to_string(),
                })
            }
            Plan::Pool(behavior) => behavior,
        };

        let mut pools = self.inner.pools.lock().unwrap();
        let state = Arc::new(PoolState {
            id: pools.len(),
            address: address.clone(),
            max_size,
            behavior: Mutex::new(behavior),
            borrowed: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
        });
        pools.push(Arc::clone(&state));

        Ok(MockPool { state })
    }
}

/// Records each requested pause
#[derive(Default)]
pub struct RecordingSleeper {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

/// A captured log event: level and rendered message
#[derive(Debug, Clone)]
pub struct LogLine {
    pub level: Level,
    pub message: String,
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

struct CaptureLayer {
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.lines.lock().unwrap().push(LogLine {
            level: *event.metadata().level(),
            message: visitor.0,
        });
    }
}

/// Run `f` with every tracing event on this thread captured
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, Vec<LogLine>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(CaptureLayer {
        lines: Arc::clone(&lines),
    });

    let result = tracing::subscriber::with_default(subscriber, f);
    let lines = lines.lock().unwrap().clone();
    (result, lines)
}

pub fn count_at(lines: &[LogLine], level: Level) -> usize {
    lines.iter().filter(|line| line.level == level).count()
}
