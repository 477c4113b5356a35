//! Bounded connection pool.
//!
//! Capacity is enforced with a fair semaphore: each live permit backs at
//! most one connection in a caller's hand, so `total <= max` holds and
//! waiters are served in FIFO order. Idle connections carry no permit; they
//! wait in the free list until an acquirer claims them.

use crate::irods::account::Account;
use crate::irods::connection::{Connection, ConnectionConfig};
use crate::irods::session::SessionConfig;
use rods_platform::{RodsError, RodsResult};
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::sync::MutexGuard;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Pool occupancy counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections alive (idle + in use).
    pub total: usize,
    /// Connections currently in a caller's hand.
    pub in_use: usize,
    /// Connections waiting in the free list.
    pub idle: usize,
}

struct PoolState {
    idle: VecDeque<Arc<Connection>>,
    total: usize,
    in_use: usize,
}

pub(crate) struct PoolShared {
    account: Arc<Account>,
    config: SessionConfig,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
    closed: AtomicBool,
}

/// Bounded set of authenticated connections.
pub struct Pool {
    shared: Arc<PoolShared>,
}

impl Pool {
    /// Creates an empty pool; connections are opened on demand.
    pub fn new(account: Arc<Account>, config: SessionConfig) -> Self {
        let max = config.max_connections.max(1);
        Self {
            shared: Arc::new(PoolShared {
                account,
                config,
                semaphore: Arc::new(Semaphore::new(max)),
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    total: 0,
                    in_use: 0,
                }),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Opens the configured number of initial connections.
    pub async fn warm_up(&self) -> RodsResult<()> {
        let initial = self
            .shared
            .config
            .initial_connections
            .min(self.shared.config.max_connections);
        let mut warmed = Vec::with_capacity(initial);
        for _ in 0..initial {
            warmed.push(self.acquire().await?);
        }
        // Dropping the handles files the fresh connections into the free
        // list.
        drop(warmed);
        Ok(())
    }

    /// Returns a healthy connection, opening one when the pool is below its
    /// cap. Blocks (bounded by the operation timeout) when the cap is
    /// reached; waiters are unblocked in FIFO order as handles are dropped.
    ///
    /// # Errors
    ///
    /// [`RodsError::PoolExhausted`] when the wait deadline elapses, or the
    /// connect error when a fresh connection cannot be established.
    pub async fn acquire(&self) -> RodsResult<PooledConnection> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(RodsError::PoolExhausted("pool is released".to_string()));
        }

        let permit = tokio::time::timeout(
            self.shared.config.operation_timeout,
            Arc::clone(&self.shared.semaphore).acquire_owned(),
        )
        .await
        .map_err(|_| {
            RodsError::PoolExhausted(format!(
                "no connection available within {:?}",
                self.shared.config.operation_timeout
            ))
        })?
        .map_err(|_| RodsError::PoolExhausted("pool is released".to_string()))?;

        // Claim the oldest healthy idle connection; discard stale ones.
        loop {
            let candidate = {
                let mut state = self.shared.state();
                match state.idle.pop_front() {
                    Some(conn) => {
                        if self.shared.healthy(&conn) {
                            state.in_use += 1;
                            Some(conn)
                        } else {
                            state.total -= 1;
                            drop(state);
                            debug!("discarding stale idle connection");
                            self.shared.close_later(conn);
                            continue;
                        }
                    }
                    None => None,
                }
            };

            match candidate {
                Some(conn) => {
                    return Ok(PooledConnection {
                        conn: Some(conn),
                        shared: Arc::clone(&self.shared),
                        _permit: permit,
                        faulted: false,
                    })
                }
                None => break,
            }
        }

        // Below the cap by construction: the permit guarantees a slot.
        let conn = Arc::new(Connection::new(
            Arc::clone(&self.shared.account),
            ConnectionConfig::new()
                .with_application_name(&self.shared.config.application_name)
                .with_operation_timeout(self.shared.config.operation_timeout),
        ));
        conn.connect().await?;

        let mut state = self.shared.state();
        state.total += 1;
        state.in_use += 1;
        debug!(total = state.total, "opened pooled connection");
        drop(state);

        Ok(PooledConnection {
            conn: Some(conn),
            shared: Arc::clone(&self.shared),
            _permit: permit,
            faulted: false,
        })
    }

    /// Closes every idle connection and rejects further acquires. Handles
    /// still in callers' hands close on drop.
    pub async fn release(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let drained: Vec<Arc<Connection>> = {
            let mut state = self.shared.state();
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total -= drained.len();
            drained
        };
        for conn in drained {
            conn.disconnect().await;
        }
        info!("pool released");
    }

    /// Returns current occupancy.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state();
        PoolStats {
            total: state.total,
            in_use: state.in_use,
            idle: state.idle.len(),
        }
    }
}

impl PoolShared {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        // A panic while holding this lock leaves only counters behind;
        // recover the guard rather than poisoning every later caller.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Health probe applied on acquire and return: the connected flag plus
    /// idle-age and lifespan thresholds.
    fn healthy(&self, conn: &Connection) -> bool {
        conn.is_connected()
            && conn.idle_time() < self.config.connection_idle_timeout
            && conn.age() < self.config.connection_lifespan
    }

    fn close_later(&self, conn: Arc<Connection>) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                conn.disconnect().await;
            });
        }
    }

    fn give_back(&self, conn: Arc<Connection>, faulted: bool) {
        let keep = !faulted && !self.closed.load(Ordering::SeqCst) && self.healthy(&conn);
        let mut state = self.state();
        state.in_use -= 1;
        if keep {
            state.idle.push_back(conn);
        } else {
            state.total -= 1;
            drop(state);
            if faulted {
                warn!("closing faulted connection instead of pooling it");
            }
            self.close_later(conn);
        }
    }
}

/// A pooled connection in the caller's hand.
///
/// Dropping the handle returns the connection: healthy connections go back
/// to the free list, faulted or aged ones are closed. The handle is the only
/// back-channel to the pool, so the connection itself carries no pool
/// reference.
pub struct PooledConnection {
    conn: Option<Arc<Connection>>,
    shared: Arc<PoolShared>,
    _permit: OwnedSemaphorePermit,
    faulted: bool,
}

impl PooledConnection {
    /// Marks the connection so it is closed instead of pooled on return.
    ///
    /// Errors that already tore the connection down (transport faults,
    /// malformed frames) are detected via the connected flag; this is for
    /// callers that want to force a recycle.
    pub fn mark_faulted(&mut self) {
        self.faulted = true;
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection accessed after return")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.give_back(conn, self.faulted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irods::session::SessionConfig;

    fn pool() -> Pool {
        let account = Arc::new(Account::new("localhost", 1247, "tempZone", "rods", "rods"));
        Pool::new(account, SessionConfig::default())
    }

    #[test]
    fn test_new_pool_is_empty() {
        let pool = pool();
        assert_eq!(
            pool.stats(),
            PoolStats {
                total: 0,
                in_use: 0,
                idle: 0
            }
        );
    }

    #[tokio::test]
    async fn test_release_rejects_acquire() {
        let pool = pool();
        pool.release().await;
        let result = pool.acquire().await;
        assert!(matches!(result, Err(RodsError::PoolExhausted(_))));
    }

    #[tokio::test]
    async fn test_acquire_against_unreachable_server_fails() {
        let account = Arc::new(Account::new("127.0.0.1", 1, "tempZone", "rods", "rods"));
        let config = SessionConfig::default()
            .with_operation_timeout(std::time::Duration::from_millis(200));
        let pool = Pool::new(account, config);
        assert!(pool.acquire().await.is_err());
        // The failed attempt must not leak a slot.
        assert_eq!(pool.stats().total, 0);
    }
}
