use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tokio::task;
use crate::error::{Result, FamilyTreeError};

pub mod migrate;
pub mod people;
pub mod relationships;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct Db {
    path: std::path::PathBuf,
    busy_timeout: Duration,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// How long a writer waits on a locked database before failing
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        task::spawn_blocking(move || {
            let mut conn = open(&path, busy_timeout)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| FamilyTreeError::TaskJoin(e.to_string()))?
    }

    /// Execute a closure inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken before the closure runs, so every read inside it
    /// and the writes that follow are serialized against other writers. The
    /// transaction commits only if the closure returns `Ok`.
    pub async fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_connection(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
        .await
    }
}

fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path).map_err(FamilyTreeError::Database)?;
    conn.busy_timeout(busy_timeout)?;

    // WAL mode for better concurrency, NORMAL sync for speed, foreign keys for integrity
    conn.execute_batch(
        "PRAGMA journal_mode = WAL; \
         PRAGMA synchronous = NORMAL; \
         PRAGMA foreign_keys = ON; \
         PRAGMA temp_store = MEMORY;"
    )?;

    Ok(conn)
}
