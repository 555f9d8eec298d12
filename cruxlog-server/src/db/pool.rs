//! Database connection pool
//!
//! A bounded set of connections with an explicit FIFO wait queue.
//!
//! - Connections are opened lazily, up to `max_size`
//! - A released connection goes straight to the longest waiting caller,
//!   never through the idle set
//! - Waiting is bounded by `acquire_timeout` and is cancel-safe
//! - State lives behind one mutex that is never held across an `.await`

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;

use super::DbError;

/// Default maximum connections for the pool.
const DEFAULT_MAX_SIZE: usize = 10;

/// Default time a caller may wait for a connection.
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle connections older than this are closed instead of reused.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Limit on opening or pinging a single connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens, checks and closes backend connections for a [`Pool`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(&self) -> Result<Self::Connection, DbError>;

    /// Round-trip check on an idle connection before it is reused.
    async fn ping(&self, conn: &mut Self::Connection) -> Result<(), DbError> {
        let _ = conn;
        Ok(())
    }

    async fn close(&self, conn: Self::Connection) {
        drop(conn);
    }
}

/// Pool sizing and validation settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: usize,
    pub acquire_timeout: Duration,
    /// Bounds each connect and ping; expiry counts as a lost connection.
    pub connect_timeout: Duration,
    /// `None` keeps idle connections forever.
    pub idle_timeout: Option<Duration>,
    /// Ping idle connections before handing them out.
    pub test_on_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            test_on_acquire: true,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// At least one connection is always allowed.
    pub fn max_size(mut self, size: usize) -> Self {
        self.max_size = size.max(1);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn test_on_acquire(mut self, enabled: bool) -> Self {
        self.test_on_acquire = enabled;
        self
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max_size: usize,
    /// Checked out, or reserved while being opened.
    pub active: usize,
    pub idle: usize,
    pub waiting: usize,
    pub closed: bool,
}

/// What a waiting caller receives.
enum Grant<T> {
    /// A live connection, passed hand to hand.
    Ready(T),
    /// A free slot; the receiver opens the connection itself.
    Slot,
}

struct IdleConn<T> {
    conn: T,
    last_used: Instant,
}

struct Waiter<T> {
    id: u64,
    tx: oneshot::Sender<Grant<T>>,
}

struct State<T> {
    idle: VecDeque<IdleConn<T>>,
    waiters: VecDeque<Waiter<T>>,
    active: usize,
    closed: bool,
    next_waiter: u64,
}

impl<T> State<T> {
    /// Give `grant` to the longest waiting caller that is still listening.
    fn hand_off(&mut self, mut grant: Grant<T>) -> Result<(), Grant<T>> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(grant) {
                Ok(()) => return Ok(()),
                Err(returned) => grant = returned,
            }
        }
        Err(grant)
    }
}

struct Shared<C: Connector> {
    connector: C,
    config: PoolConfig,
    state: Mutex<State<C::Connection>>,
    drained: Notify,
}

impl<C: Connector> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, State<C::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect(&self) -> Result<C::Connection, DbError> {
        let limit = self.config.connect_timeout;
        tokio::time::timeout(limit, self.connector.connect())
            .await
            .unwrap_or_else(|_| {
                Err(DbError::ConnectionLost(format!(
                    "timed out opening connection after {limit:?}"
                )))
            })
    }

    async fn ping(&self, conn: &mut C::Connection) -> Result<(), DbError> {
        let limit = self.config.connect_timeout;
        tokio::time::timeout(limit, self.connector.ping(conn))
            .await
            .unwrap_or_else(|_| {
                Err(DbError::ConnectionLost(format!(
                    "ping timed out after {limit:?}"
                )))
            })
    }

    /// Return a healthy connection: to a waiter if any, else to the idle set.
    fn check_in(&self, conn: C::Connection) {
        let mut state = self.lock();
        if state.closed {
            drop(conn);
            self.release_slot(&mut state);
            return;
        }

        if let Err(Grant::Ready(conn)) = state.hand_off(Grant::Ready(conn)) {
            state.active -= 1;
            state.idle.push_back(IdleConn {
                conn,
                last_used: Instant::now(),
            });
        }
    }

    /// A slot lost its connection (invalidated, failed to open, dropped
    /// mid-open). Pass it to a waiter or give it up.
    fn free_slot(&self) {
        let mut state = self.lock();
        if !state.closed && state.hand_off(Grant::Slot).is_ok() {
            return;
        }
        self.release_slot(&mut state);
    }

    fn release_slot(&self, state: &mut State<C::Connection>) {
        state.active -= 1;
        if state.closed && state.active == 0 {
            self.drained.notify_waiters();
        }
    }
}

/// Bounded connection pool.
///
/// Cheap to clone; clones share the same connections.
pub struct Pool<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.shared.config)
            .field("status", &self.status())
            .finish()
    }
}

enum Step<T> {
    Reuse(IdleConn<T>),
    Open,
    Wait(u64, oneshot::Receiver<Grant<T>>),
}

impl<C: Connector> Pool<C> {
    pub fn new(connector: C, config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                config,
                state: Mutex::new(State {
                    idle: VecDeque::new(),
                    waiters: VecDeque::new(),
                    active: 0,
                    closed: false,
                    next_waiter: 0,
                }),
                drained: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Check out a connection.
    ///
    /// # Errors
    ///
    /// - [`DbError::PoolClosed`] after [`Pool::shutdown`]
    /// - [`DbError::PoolExhausted`] when nothing frees up within the acquire timeout
    /// - [`DbError::ConnectionLost`] when a new connection cannot be opened
    pub async fn acquire(&self) -> Result<PooledConnection<C>, DbError> {
        let started = Instant::now();

        let step = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(DbError::PoolClosed);
            }

            if !state.waiters.is_empty() {
                Self::enqueue(&mut state)
            } else if let Some(idle) = state.idle.pop_front() {
                state.active += 1;
                Step::Reuse(idle)
            } else if state.active + state.idle.len() < self.shared.config.max_size {
                state.active += 1;
                Step::Open
            } else {
                Self::enqueue(&mut state)
            }
        };

        match step {
            Step::Reuse(idle) => self.reuse(idle, Reservation::new(&self.shared)).await,
            Step::Open => self.open(Reservation::new(&self.shared)).await,
            Step::Wait(id, rx) => self.wait(id, rx, started).await,
        }
    }

    fn enqueue(state: &mut State<C::Connection>) -> Step<C::Connection> {
        let id = state.next_waiter;
        state.next_waiter += 1;

        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(Waiter { id, tx });
        tracing::debug!(waiting = state.waiters.len(), "pool full, queueing caller");
        Step::Wait(id, rx)
    }

    async fn wait(
        &self,
        id: u64,
        rx: oneshot::Receiver<Grant<C::Connection>>,
        started: Instant,
    ) -> Result<PooledConnection<C>, DbError> {
        let mut ticket = Ticket {
            shared: &self.shared,
            id,
            rx,
            settled: false,
        };

        match tokio::time::timeout(self.shared.config.acquire_timeout, &mut ticket.rx).await {
            Ok(Ok(Grant::Ready(conn))) => {
                ticket.settled = true;
                Ok(self.checked_out(conn))
            }
            Ok(Ok(Grant::Slot)) => {
                ticket.settled = true;
                self.open(Reservation::new(&self.shared)).await
            }
            Ok(Err(_)) => {
                // Sender dropped without a grant: the queue was cleared by shutdown.
                ticket.settled = true;
                Err(DbError::PoolClosed)
            }
            Err(_) => {
                drop(ticket);
                let waited = started.elapsed();
                tracing::warn!(?waited, "timed out waiting for a database connection");
                Err(DbError::PoolExhausted { waited })
            }
        }
    }

    /// Validate an idle connection, replacing it in the same slot if stale.
    async fn reuse(
        &self,
        idle: IdleConn<C::Connection>,
        reservation: Reservation<'_, C>,
    ) -> Result<PooledConnection<C>, DbError> {
        let IdleConn { mut conn, last_used } = idle;

        let expired = self
            .shared
            .config
            .idle_timeout
            .is_some_and(|limit| last_used.elapsed() > limit);
        if expired {
            tracing::debug!("closing expired idle connection");
            self.shared.connector.close(conn).await;
            return self.open(reservation).await;
        }

        if self.shared.config.test_on_acquire {
            if let Err(e) = self.shared.ping(&mut conn).await {
                tracing::debug!(error = %e, "idle connection failed validation, replacing");
                drop(conn);
                return self.open(reservation).await;
            }
        }

        reservation.commit();
        Ok(self.checked_out(conn))
    }

    /// Open a new connection in an already reserved slot.
    async fn open(&self, reservation: Reservation<'_, C>) -> Result<PooledConnection<C>, DbError> {
        match self.shared.connect().await {
            Ok(conn) => {
                reservation.commit();
                tracing::debug!("opened database connection");
                Ok(self.checked_out(conn))
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to open database connection");
                Err(e)
            }
        }
    }

    fn checked_out(&self, conn: C::Connection) -> PooledConnection<C> {
        PooledConnection {
            conn: Some(conn),
            shared: Arc::clone(&self.shared),
            valid: true,
        }
    }

    /// Acquire a connection and ping it.
    ///
    /// Used as a startup probe; a failed ping invalidates the connection.
    pub async fn ping(&self) -> Result<(), DbError> {
        let mut conn = self.acquire().await?;
        let result = self.shared.ping(&mut conn).await;
        if result.is_err() {
            conn.invalidate();
        }
        result
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.shared.lock();
        PoolStatus {
            max_size: self.shared.config.max_size,
            active: state.active,
            idle: state.idle.len(),
            waiting: state.waiters.len(),
            closed: state.closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Close the pool.
    ///
    /// New and queued `acquire` calls fail with [`DbError::PoolClosed`].
    /// Idle connections are closed at once; checked-out connections are
    /// awaited and discarded as they come back. Safe to call more than once.
    pub async fn shutdown(&self) {
        let (idle, waiters) = {
            let mut state = self.shared.lock();
            if !state.closed {
                tracing::info!(
                    active = state.active,
                    idle = state.idle.len(),
                    "closing connection pool"
                );
            }
            state.closed = true;
            (
                std::mem::take(&mut state.idle),
                std::mem::take(&mut state.waiters),
            )
        };

        // Dropping the senders wakes every waiter with PoolClosed.
        drop(waiters);

        for entry in idle {
            self.shared.connector.close(entry.conn).await;
        }

        loop {
            let drained = self.shared.drained.notified();
            let active = self.shared.lock().active;
            if active == 0 {
                break;
            }
            tracing::debug!(active, "waiting for in-flight connections");
            drained.await;
        }

        tracing::info!("connection pool closed");
    }
}

/// A slot counted in `active` that has no connection yet. Dropping it
/// without [`Reservation::commit`] frees the slot.
struct Reservation<'a, C: Connector> {
    shared: &'a Shared<C>,
    armed: bool,
}

impl<'a, C: Connector> Reservation<'a, C> {
    fn new(shared: &'a Shared<C>) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl<C: Connector> Drop for Reservation<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.free_slot();
        }
    }
}

/// A caller's place in the wait queue. If the caller goes away before
/// settling, the entry is removed and any grant already sent is passed on.
struct Ticket<'a, C: Connector> {
    shared: &'a Shared<C>,
    id: u64,
    rx: oneshot::Receiver<Grant<C::Connection>>,
    settled: bool,
}

impl<C: Connector> Drop for Ticket<'_, C> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        {
            let mut state = self.shared.lock();
            if let Some(pos) = state.waiters.iter().position(|w| w.id == self.id) {
                state.waiters.remove(pos);
                return;
            }
        }

        // Already popped from the queue, so the grant (if any) is in the channel.
        self.rx.close();
        match self.rx.try_recv() {
            Ok(Grant::Ready(conn)) => self.shared.check_in(conn),
            Ok(Grant::Slot) => self.shared.free_slot(),
            Err(_) => {}
        }
    }
}

/// A checked-out connection. Dropping it releases it to the pool.
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Connection>,
    shared: Arc<Shared<C>>,
    valid: bool,
}

impl<C: Connector> PooledConnection<C> {
    /// Mark the connection broken. It is destroyed on release, never reused.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Return the connection to the pool now.
    pub fn release(self) {
        drop(self);
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.valid {
                self.shared.check_in(conn);
            } else {
                tracing::debug!("discarding invalidated connection");
                drop(conn);
                self.shared.free_slot();
            }
        }
    }
}

impl<C: Connector> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("valid", &self.valid)
            .finish()
    }
}
