//! Session: a pool of authenticated connections plus its policy.

pub mod pool;

pub use pool::{Pool, PoolStats, PooledConnection};

use crate::irods::account::Account;
use rods_platform::RodsResult;
use std::sync::Arc;
use std::time::Duration;

/// Session policy: everything the pool needs beyond the account.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Application name embedded in every startup pack.
    pub application_name: String,
    /// Deadline for socket operations and for waiting on the pool.
    pub operation_timeout: Duration,
    /// Idle connections older than this are closed instead of reused.
    pub connection_idle_timeout: Duration,
    /// Absolute maximum age of a connection before forced recycle.
    pub connection_lifespan: Duration,
    /// Pool capacity.
    pub max_connections: usize,
    /// Connections opened eagerly by [`Session::connect`].
    pub initial_connections: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            application_name: "rods-proto".to_string(),
            operation_timeout: Duration::from_secs(60),
            connection_idle_timeout: Duration::from_secs(300),
            connection_lifespan: Duration::from_secs(3600),
            max_connections: 10,
            initial_connections: 1,
        }
    }
}

impl SessionConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application name.
    pub fn with_application_name(mut self, name: &str) -> Self {
        self.application_name = name.to_string();
        self
    }

    /// Sets the operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.connection_idle_timeout = timeout;
        self
    }

    /// Sets the connection lifespan.
    pub fn with_lifespan(mut self, lifespan: Duration) -> Self {
        self.connection_lifespan = lifespan;
        self
    }

    /// Sets the pool capacity.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the eager connection count.
    pub fn with_initial_connections(mut self, initial: usize) -> Self {
        self.initial_connections = initial;
        self
    }
}

/// A pooled session against one iRODS server.
///
/// # Example
///
/// ```rust,no_run
/// use rods_proto::irods::account::Account;
/// use rods_proto::irods::session::{Session, SessionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let account = Account::new("data.example.org", 1247, "tempZone", "rods", "secret");
/// let session = Session::new(account, SessionConfig::new().with_max_connections(4));
/// session.connect().await?;
///
/// let conn = session.acquire().await?;
/// let version = conn.server_version().await;
/// println!("server: {:?}", version);
/// drop(conn); // returns the connection to the pool
///
/// session.release().await;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    account: Arc<Account>,
    pool: Pool,
}

impl Session {
    /// Creates a session without any network activity.
    pub fn new(account: Account, config: SessionConfig) -> Self {
        let account = Arc::new(account);
        let pool = Pool::new(Arc::clone(&account), config);
        Self { account, pool }
    }

    /// Returns the account the session authenticates as.
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Opens the configured initial connections, verifying the account.
    pub async fn connect(&self) -> RodsResult<()> {
        self.pool.warm_up().await
    }

    /// Borrows a connection from the pool; see [`Pool::acquire`].
    pub async fn acquire(&self) -> RodsResult<PooledConnection> {
        self.pool.acquire().await
    }

    /// Closes every pooled connection and rejects further acquires.
    pub async fn release(&self) {
        self.pool.release().await;
    }

    /// Returns pool occupancy.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
