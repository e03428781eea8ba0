//! Connection pooling for a single MongoDB server.
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::connection::{Connection, StreamDescription};
use crate::connstring::Host;
use crate::error::Error::{self, ArgumentError, PoolClosed, PoolWaitTimeout};
use crate::error::Result;
use crate::stream::StreamConnector;
use crate::timeout::TimeoutContext;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 100;

/// Sizing and timing knobs for a connection pool.
#[derive(Clone, Debug)]
pub struct PoolOptions {
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub wait_queue_timeout: Option<Duration>,
    pub max_idle_time: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub connector: StreamConnector,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            min_pool_size: 0,
            wait_queue_timeout: None,
            max_idle_time: None,
            connect_timeout: None,
            connector: StreamConnector::Tcp,
        }
    }
}

/// Handles concurrent checkouts of connections to a MongoDB server.
#[derive(Clone)]
pub struct ConnectionPool {
    /// The connection host.
    pub host: Host,
    inner: Arc<PoolInner>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("host", &self.host)
            .finish()
    }
}

struct PoolInner {
    options: PoolOptions,
    state: Mutex<PoolState>,
    next_connection_id: AtomicU32,
}

struct PoolState {
    // Idle connections, most recently used last.
    available: Vec<Connection>,
    // Idle, checked-out, and in-creation connections. Never exceeds max_pool_size.
    total: u32,
    // Bumped on clear; connections from older generations are discarded.
    generation: u32,
    wait_queue: VecDeque<Waiter>,
    next_waiter_id: u64,
    // Limits from the most recent handshake.
    description: Option<StreamDescription>,
    closed: bool,
}

struct Waiter {
    id: u64,
    sender: oneshot::Sender<Handoff>,
}

// What a waiter receives when it reaches the head of the queue.
enum Handoff {
    Connection(Connection),
    // A reserved slot: the waiter may create a connection itself.
    CreateSlot,
}

enum Next {
    Ready(Connection),
    Create(u32),
    Wait(u64, oneshot::Receiver<Handoff>),
}

/// A checked-out connection. Dropping it returns the connection to the pool, or discards it
/// if it faulted or belongs to a stale generation.
pub struct PooledConnection {
    // Always Some(connection) until it is returned to the pool on drop.
    conn: Option<Connection>,
    pool: ConnectionPool,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.check_in(conn);
        }
    }
}

// Releases a reserved creation slot unless the connection was created.
struct SlotGuard<'a> {
    pool: &'a ConnectionPool,
    armed: bool,
}

impl<'a> Drop for SlotGuard<'a> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release_slot();
        }
    }
}

// A place in the wait queue. If the waiting future is dropped or times out, the entry is removed
// and anything already handed over is given back.
struct Waiting<'a> {
    pool: &'a ConnectionPool,
    id: u64,
    receiver: oneshot::Receiver<Handoff>,
    done: bool,
}

impl<'a> Drop for Waiting<'a> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if self.pool.remove_waiter(self.id) {
            return;
        }
        match self.receiver.try_recv() {
            Ok(Handoff::Connection(conn)) => self.pool.check_in(conn),
            Ok(Handoff::CreateSlot) => self.pool.release_slot(),
            Err(_) => (),
        }
    }
}

impl ConnectionPool {
    /// Returns a connection pool with default options.
    pub fn new(host: Host) -> ConnectionPool {
        ConnectionPool::with_options(host, PoolOptions::default())
    }

    pub fn with_options(host: Host, options: PoolOptions) -> ConnectionPool {
        ConnectionPool {
            host,
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    available: Vec::new(),
                    total: 0,
                    generation: 0,
                    wait_queue: VecDeque::new(),
                    next_waiter_id: 0,
                    description: None,
                    closed: false,
                }),
                options,
                next_connection_id: AtomicU32::new(1),
            }),
        }
    }

    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    fn lock(&self) -> Result<MutexGuard<PoolState>> {
        Ok(self.inner.state.lock()?)
    }

    pub fn generation(&self) -> u32 {
        self.lock().map(|s| s.generation).unwrap_or_default()
    }

    /// The number of open connections: idle, checked out, or being established.
    pub fn total_connections(&self) -> u32 {
        self.lock().map(|s| s.total).unwrap_or_default()
    }

    pub fn available_connections(&self) -> usize {
        self.lock().map(|s| s.available.len()).unwrap_or_default()
    }

    pub fn waiting(&self) -> usize {
        self.lock().map(|s| s.wait_queue.len()).unwrap_or_default()
    }

    /// Server limits from the latest handshake, if any connection has been established.
    pub fn description(&self) -> Option<StreamDescription> {
        self.lock().ok().and_then(|s| s.description)
    }

    /// Marks every existing connection stale. Idle connections are discarded lazily on the next
    /// checkout; checked-out ones are discarded when they are returned.
    pub fn clear(&self) {
        if let Ok(mut locked) = self.lock() {
            locked.generation += 1;
            debug!(host = %self.host, generation = locked.generation, "connection pool cleared");
        }
    }

    /// Closes the pool: idle connections are dropped and all waiters fail.
    pub fn close(&self) {
        if let Ok(mut locked) = self.lock() {
            locked.closed = true;
            let idle = locked.available.len() as u32;
            locked.available.clear();
            locked.total -= idle;
            locked.wait_queue.clear();
        }
    }

    /// Checks out a connection. If none are idle and the pool has not reached its maximum size a
    /// new one is created; otherwise the caller waits in FIFO order for a connection to be
    /// checked in, for at most the smaller of the wait queue timeout and the remaining budget.
    pub async fn check_out(&self, ctx: &TimeoutContext) -> Result<PooledConnection> {
        ctx.check("connection checkout")?;

        if self.inner.options.max_pool_size == 0 {
            return Err(ArgumentError(String::from(
                "The connection pool does not allow connections; increase the size of the pool.",
            )));
        }

        let next = {
            let mut locked = self.lock()?;
            if locked.closed {
                return Err(PoolClosed);
            }
            self.next_step(&mut locked)
        };

        match next {
            Next::Ready(conn) => Ok(self.wrap(conn)),
            Next::Create(generation) => self.create(generation, ctx).await,
            Next::Wait(id, receiver) => self.wait(id, receiver, ctx).await,
        }
    }

    fn next_step(&self, state: &mut PoolState) -> Next {
        let max_idle_time = self.inner.options.max_idle_time;

        // Later arrivals never overtake queued waiters.
        if state.wait_queue.is_empty() {
            while let Some(conn) = state.available.pop() {
                if conn.generation != state.generation || conn.is_idle_expired(max_idle_time) {
                    trace!(connection_id = conn.id, "discarding stale idle connection");
                    state.total -= 1;
                    continue;
                }
                return Next::Ready(conn);
            }

            if state.total < self.inner.options.max_pool_size {
                state.total += 1;
                return Next::Create(state.generation);
            }
        }

        let (sender, receiver) = oneshot::channel();
        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        state.wait_queue.push_back(Waiter { id, sender });
        trace!(
            host = %self.host,
            waiter = id,
            queued = state.wait_queue.len(),
            "waiting for a connection"
        );
        Next::Wait(id, receiver)
    }

    async fn create(&self, generation: u32, ctx: &TimeoutContext) -> Result<PooledConnection> {
        let mut slot = SlotGuard { pool: self, armed: true };

        let id = self.inner.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let bound = ctx.bounded(self.inner.options.connect_timeout);
        let conn = Connection::connect(
            id,
            &self.host,
            generation,
            &self.inner.options.connector,
            bound,
            ctx,
        )
        .await?;

        slot.armed = false;
        if let Ok(mut locked) = self.lock() {
            locked.description = Some(*conn.description());
        }
        Ok(self.wrap(conn))
    }

    async fn wait(
        &self,
        id: u64,
        receiver: oneshot::Receiver<Handoff>,
        ctx: &TimeoutContext,
    ) -> Result<PooledConnection> {
        let wait_queue_timeout = self.inner.options.wait_queue_timeout;
        let mut waiting = Waiting {
            pool: self,
            id,
            receiver,
            done: false,
        };

        let received = match ctx.bounded(wait_queue_timeout) {
            Some(bound) => tokio::time::timeout(bound, &mut waiting.receiver).await.ok(),
            None => Some((&mut waiting.receiver).await),
        };

        match received {
            Some(Ok(handoff)) => {
                waiting.done = true;
                match handoff {
                    Handoff::Connection(conn) => Ok(self.wrap(conn)),
                    Handoff::CreateSlot => {
                        let generation = self.generation();
                        self.create(generation, ctx).await
                    }
                }
            }
            Some(Err(_)) => {
                waiting.done = true;
                Err(PoolClosed)
            }
            // Dropping `waiting` leaves the queue and returns anything handed over meanwhile.
            None => {
                drop(waiting);
                if ctx.is_expired() {
                    Err(Error::timeout("connection checkout"))
                } else {
                    Err(PoolWaitTimeout(format!(
                        "no connection to {} became available within {:?}",
                        self.host,
                        wait_queue_timeout.unwrap_or_default()
                    )))
                }
            }
        }
    }

    fn wrap(&self, mut conn: Connection) -> PooledConnection {
        conn.touch();
        PooledConnection {
            conn: Some(conn),
            pool: self.clone(),
        }
    }

    /// Returns a connection to the pool. Healthy current-generation connections go to the
    /// oldest waiter, or back to the idle set; anything else is discarded.
    fn check_in(&self, mut conn: Connection) {
        let mut locked = match self.lock() {
            Ok(locked) => locked,
            Err(_) => return,
        };

        if locked.closed || conn.is_faulted() || conn.generation != locked.generation {
            trace!(
                connection_id = conn.id,
                faulted = conn.is_faulted(),
                "connection discarded on check-in"
            );
            locked.total -= 1;
            drop(conn);
            self.grant_slot(&mut locked);
            return;
        }

        conn.touch();
        let mut handoff = Handoff::Connection(conn);
        while let Some(waiter) = locked.wait_queue.pop_front() {
            match waiter.sender.send(handoff) {
                Ok(()) => return,
                Err(returned) => handoff = returned,
            }
        }

        if let Handoff::Connection(conn) = handoff {
            locked.available.push(conn);
        }
    }

    // Offers a free slot to the oldest live waiter.
    fn grant_slot(&self, state: &mut PoolState) {
        if state.total >= self.inner.options.max_pool_size {
            return;
        }
        while let Some(waiter) = state.wait_queue.pop_front() {
            if waiter.sender.send(Handoff::CreateSlot).is_ok() {
                state.total += 1;
                return;
            }
        }
    }

    fn release_slot(&self) {
        if let Ok(mut locked) = self.lock() {
            locked.total -= 1;
            self.grant_slot(&mut locked);
        }
    }

    // Returns whether the waiter was still queued.
    fn remove_waiter(&self, id: u64) -> bool {
        match self.lock() {
            Ok(mut locked) => match locked.wait_queue.iter().position(|w| w.id == id) {
                Some(pos) => {
                    locked.wait_queue.remove(pos);
                    true
                }
                None => false,
            },
            Err(_) => true,
        }
    }

    /// Establishes connections until the pool holds at least `min_pool_size`.
    pub async fn populate(&self, ctx: &TimeoutContext) -> Result<()> {
        loop {
            let generation = {
                let mut locked = self.lock()?;
                if locked.closed
                    || locked.total >= self.inner.options.min_pool_size
                    || locked.total >= self.inner.options.max_pool_size
                    || !locked.wait_queue.is_empty()
                {
                    return Ok(());
                }
                locked.total += 1;
                locked.generation
            };

            // Dropping the guard hands the connection to a waiter or the idle set.
            drop(self.create(generation, ctx).await?);
        }
    }
}
