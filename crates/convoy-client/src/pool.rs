//! The connection pool.
//!
//! A [`Pool`] owns the idle cache and the active-connection counter for one
//! logical backend cluster. Callers acquire a [`PooledClient`] with
//! [`Pool::get`], issue calls through it, and give it back with
//! [`PooledClient::release`].
//!
//! # Concurrency
//!
//! The idle deque and the active counter are the only shared mutable state
//! and are always touched under the pool's mutex. Dialing a new connection
//! and issuing calls are blocking I/O performed outside the lock, so one
//! slow dial never stalls other pool operations. Waiters at capacity park
//! on a [`Notify`] and are woken whenever a release or eviction frees a
//! slot; wakeup order across waiters is unspecified.
//!
//! # Idle discipline
//!
//! Releases push to the front of the deque and acquires pop from the back,
//! so the oldest idle connection is served first. This rotates use across
//! all idle connections instead of hammering the most recently used one,
//! which keeps backend-side keep-alives evenly exercised. Eviction beyond
//! `max_idle` also takes the back, keeping the newest connections.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use convoy_common::{ConvoyError, Result, RpcArgs};

use crate::client::{ClientFactory, RpcClient};
use crate::config::PoolConfig;
use crate::connect;

/// Snapshot of the pool's bookkeeping counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently allocated, idle or borrowed.
    pub active: usize,
    /// Connections cached in the idle deque.
    pub idle: usize,
}

struct IdleConn {
    client: Box<dyn RpcClient>,
    borrows: u32,
}

struct PoolState {
    active: usize,
    // front = most recently released, back = oldest
    idle: VecDeque<IdleConn>,
}

/// Connection pool for one logical backend cluster.
///
/// Created once at startup (directly or through
/// [`PoolRegistry`](crate::registry::PoolRegistry)) and shared behind an
/// `Arc` for the process lifetime.
pub struct Pool {
    name: String,
    config: PoolConfig,
    factory: ClientFactory,
    state: Mutex<PoolState>,
    slot_freed: Notify,
}

impl Pool {
    pub fn new(name: impl Into<String>, config: PoolConfig, factory: ClientFactory) -> Arc<Self> {
        Arc::new(Pool {
            name: name.into(),
            config,
            factory,
            state: Mutex::new(PoolState {
                active: 0,
                idle: VecDeque::new(),
            }),
            slot_freed: Notify::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        PoolStats {
            active: state.active,
            idle: state.idle.len(),
        }
    }

    /// Acquires a connection wrapper.
    ///
    /// Returns `Err` only when the pool is exhausted and configured to fail
    /// fast, or when `acquire_timeout_ms` expires. A failed dial still
    /// yields `Ok`: the wrapper carries the dial error as its sticky error,
    /// so call sites keep a uniform "call it and see" shape. Check
    /// [`PooledClient::error`] before calling if you need to distinguish.
    pub async fn get(self: &Arc<Self>) -> Result<PooledClient> {
        match self.config.acquire_timeout() {
            Some(limit) => match tokio::time::timeout(limit, self.acquire()).await {
                Ok(res) => res,
                Err(_) => Err(ConvoyError::AcquireTimeout(limit.as_millis() as u64)),
            },
            None => self.acquire().await,
        }
    }

    async fn acquire(self: &Arc<Self>) -> Result<PooledClient> {
        loop {
            let mut state = self.state.lock().await;

            // Oldest idle connection first.
            while let Some(entry) = state.idle.pop_back() {
                if entry.borrows >= self.config.recycle_threshold {
                    state.active -= 1;
                    self.slot_freed.notify_one();
                    debug!(
                        pool = %self.name,
                        borrows = entry.borrows,
                        "recycling worn-out connection"
                    );
                    continue;
                }
                let borrows = entry.borrows + 1;
                return Ok(PooledClient::new(
                    self.clone(),
                    Some(entry.client),
                    None,
                    borrows,
                ));
            }

            if self.config.max_active == 0 || state.active < self.config.max_active {
                state.active += 1;
                // Dial happens outside the critical section. The guard gives
                // the slot back if this future is dropped mid-dial, e.g. by
                // the acquire deadline firing.
                drop(state);
                let slot = SlotGuard::new(self.clone());
                let client = self.dial().await;
                slot.disarm();
                return Ok(client);
            }

            if !self.config.wait {
                return Err(ConvoyError::Exhausted(self.name.clone()));
            }

            // Register as a waiter before releasing the lock so a release
            // landing in between is not missed.
            let notified = self.slot_freed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(state);
            notified.await;
        }
    }

    async fn dial(self: &Arc<Self>) -> PooledClient {
        match connect::open_client(&self.name, &self.config, &self.factory).await {
            Ok(client) => PooledClient::new(self.clone(), Some(client), None, 0),
            Err(err) => {
                warn!(pool = %self.name, error = %err, "dial failed, handing out poisoned wrapper");
                PooledClient::new(self.clone(), None, Some(err), 0)
            }
        }
    }

    /// Acquires a connection, runs one retrying call, releases it.
    pub async fn call_with_retry(self: &Arc<Self>, method: &str, args: RpcArgs) -> Result<Value> {
        let client = self.get().await?;
        client.call_with_retry(method, args).await
    }

    /// Drains the idle deque, closing every cached transport and freeing
    /// its capacity. Connections currently borrowed are unaffected; they
    /// are invalidated lazily when their next call fails or when released.
    pub async fn invalidate_all(&self) {
        let drained = {
            let mut state = self.state.lock().await;
            let drained: Vec<IdleConn> = state.idle.drain(..).collect();
            state.active -= drained.len();
            for _ in 0..drained.len() {
                self.slot_freed.notify_one();
            }
            drained
        };
        if !drained.is_empty() {
            warn!(pool = %self.name, closed = drained.len(), "invalidated all idle connections");
        }
        // Transports close here, outside the critical section.
        drop(drained);
    }

    /// Release path behind [`PooledClient::release`].
    async fn put(&self, client: Option<Box<dyn RpcClient>>, poisoned: bool, borrows: u32) {
        let mut state = self.state.lock().await;
        let discard = match client {
            Some(client) if !poisoned => {
                state.idle.push_front(IdleConn { client, borrows });
                if state.idle.len() > self.config.max_idle {
                    state.active -= 1;
                    debug!(pool = %self.name, "idle cache full, evicting oldest connection");
                    state.idle.pop_back()
                } else {
                    None
                }
            }
            discarded => {
                state.active -= 1;
                if poisoned {
                    debug!(pool = %self.name, "discarding poisoned connection");
                }
                discarded.map(|client| IdleConn { client, borrows })
            }
        };
        self.slot_freed.notify_one();
        drop(state);
        drop(discard);
    }

    /// Returns one capacity slot without going through [`put`](Self::put).
    /// Used when a wrapper is dropped unreleased and when an in-flight dial
    /// is cancelled. When the state lock is contended the bookkeeping moves
    /// to a spawned task so the slot is never lost.
    fn release_slot(self: &Arc<Self>) {
        if let Ok(mut state) = self.state.try_lock() {
            state.active -= 1;
            self.slot_freed.notify_one();
            return;
        }
        let pool = self.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let mut state = pool.state.lock().await;
                state.active -= 1;
                pool.slot_freed.notify_one();
            });
        }
    }
}

/// Owns one capacity slot across the dial await. Disarmed once the slot's
/// ownership passes to the wrapper; dropped armed, it gives the slot back.
struct SlotGuard {
    pool: Arc<Pool>,
    armed: bool,
}

impl SlotGuard {
    fn new(pool: Arc<Pool>) -> Self {
        SlotGuard { pool, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release_slot();
        }
    }
}

/// One borrowed connection.
///
/// Holds the client handle (absent when the dial failed), the sticky
/// transport error and the lifetime borrow count. No two callers may use
/// the same wrapper concurrently; the pool hands out exclusive ownership
/// and takes it back on [`release`](Self::release).
pub struct PooledClient {
    pool: Arc<Pool>,
    client: Option<Box<dyn RpcClient>>,
    err: Option<ConvoyError>,
    borrows: u32,
    released: bool,
}

impl std::fmt::Debug for PooledClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledClient")
            .field("client", &self.client.is_some())
            .field("err", &self.err)
            .field("borrows", &self.borrows)
            .field("released", &self.released)
            .finish()
    }
}

impl PooledClient {
    fn new(
        pool: Arc<Pool>,
        client: Option<Box<dyn RpcClient>>,
        err: Option<ConvoyError>,
        borrows: u32,
    ) -> Self {
        PooledClient {
            pool,
            client,
            err,
            borrows,
            released: false,
        }
    }

    /// The sticky error, if any. Once set it is never cleared; the wrapper
    /// is discarded on release.
    pub fn error(&self) -> Option<&ConvoyError> {
        self.err.as_ref()
    }

    pub fn is_usable(&self) -> bool {
        self.err.is_none() && self.client.is_some()
    }

    /// Times this connection has been checked out of the idle cache.
    pub fn borrow_count(&self) -> u32 {
        self.borrows
    }

    /// Invokes a named remote method.
    ///
    /// Fails immediately with [`ConvoyError::Unusable`] if the wrapper is
    /// already poisoned. A non-application error from the call poisons the
    /// wrapper; application errors pass through without side effects.
    pub async fn call(&mut self, method: &str, args: RpcArgs) -> Result<Value> {
        if let Some(err) = &self.err {
            return Err(ConvoyError::Unusable(err.to_string()));
        }
        let client = match self.client.as_mut() {
            Some(client) => client,
            None => return Err(ConvoyError::Unusable("no connection".to_string())),
        };
        match client.invoke(method, args).await {
            Ok(value) => Ok(value),
            Err(err) => {
                if !err.is_application() {
                    self.err = Some(err.clone());
                }
                Err(err)
            }
        }
    }

    /// Like [`call`](Self::call), but retries transport failures up to the
    /// pool's `max_retry` budget, consuming the wrapper.
    ///
    /// Each failed attempt discards its connection, sleeps for
    /// `min(2^attempt, backoff_cap_secs)` seconds and acquires a fresh
    /// wrapper. After the second consecutive failure every idle connection
    /// in the pool is invalidated: repeated transport failures usually mean
    /// the whole backend bounced, so the other cached connections are dead
    /// weight. Returns the first success or the last failure observed.
    /// Application errors are returned immediately and never retried.
    pub async fn call_with_retry(mut self, method: &str, args: RpcArgs) -> Result<Value> {
        let mut result = self.call(method, args.clone()).await;
        if self.err.is_none() {
            self.release().await;
            return result;
        }

        let pool = self.pool.clone();
        self.release().await;

        for attempt in 0..pool.config.max_retry {
            if attempt == 1 {
                pool.invalidate_all().await;
            }
            let delay = backoff_delay(attempt, pool.config.backoff_cap_secs);
            debug!(
                pool = %pool.name,
                attempt = attempt + 1,
                delay_secs = delay.as_secs(),
                "retrying call after transport failure"
            );
            tokio::time::sleep(delay).await;

            let mut fresh = match pool.get().await {
                Ok(fresh) => fresh,
                Err(err) => {
                    result = Err(err);
                    continue;
                }
            };
            result = fresh.call(method, args.clone()).await;
            let failed = fresh.err.is_some();
            fresh.release().await;
            if !failed {
                return result;
            }
        }
        result
    }

    /// Gives the connection back to the pool.
    ///
    /// Poisoned wrappers are discarded and their capacity freed; healthy
    /// ones go to the front of the idle deque, evicting the oldest entry
    /// when `max_idle` is exceeded.
    pub async fn release(mut self) {
        self.released = true;
        let client = self.client.take();
        let poisoned = self.err.is_some();
        let pool = self.pool.clone();
        pool.put(client, poisoned, self.borrows).await;
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Dropping without release() discards the connection but always
        // frees the capacity slot.
        self.pool.release_slot();
    }
}

/// `min(2^attempt, cap)` seconds.
fn backoff_delay(attempt: u32, cap_secs: u64) -> Duration {
    let secs = 1u64
        .checked_shl(attempt)
        .unwrap_or(u64::MAX)
        .min(cap_secs.max(1));
    Duration::from_secs(secs)
}
