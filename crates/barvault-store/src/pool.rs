//! Connection reuse for the cache database.
//!
//! One root connection owns the database instance; handles given to callers
//! are `try_clone`d from it, so every handle shares the same instance and the
//! file is never double-locked. Dropped handles go back to an idle list,
//! capped at `capacity`.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use duckdb::Connection;

struct PoolState {
    root: Connection,
    idle: Vec<Connection>,
}

struct PoolInner {
    db_path: PathBuf,
    capacity: usize,
    state: Mutex<PoolState>,
}

/// Hands out connections to the cache database file.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn open(db_path: impl Into<PathBuf>, capacity: usize) -> Result<Self, duckdb::Error> {
        let db_path = db_path.into();
        let root = Connection::open(&db_path)?;
        root.execute_batch("PRAGMA disable_progress_bar;")?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                db_path,
                capacity: capacity.max(1),
                state: Mutex::new(PoolState {
                    root,
                    idle: Vec::new(),
                }),
            }),
        })
    }

    /// Reuses an idle handle or clones a fresh one off the root connection.
    ///
    /// # Panics
    /// Panics if the pool mutex is poisoned.
    pub fn acquire(&self) -> Result<PooledConnection, duckdb::Error> {
        let mut state = self
            .inner
            .state
            .lock()
            .expect("connection pool mutex poisoned");
        let connection = match state.idle.pop() {
            Some(connection) => connection,
            None => state.root.try_clone()?,
        };
        drop(state);

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }

    #[cfg(test)]
    fn idle_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("connection pool mutex poisoned")
            .idle
            .len()
    }
}

/// Connection handle that returns to the idle list when dropped, unless the
/// list is already at capacity.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("pooled connection unexpectedly missing")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("pooled connection unexpectedly missing")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut state = self
            .pool
            .state
            .lock()
            .expect("connection pool mutex poisoned");
        if state.idle.len() < self.pool.capacity {
            state.idle.push(connection);
        }
    }
}
