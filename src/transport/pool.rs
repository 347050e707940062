//! Connection pools
//!
//! A pool caps the number of requests in flight. A permit is taken before
//! the request is sent and lives inside the row cursor, so it is held until
//! the response is fully read or the cursor is dropped.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{OrmError, OrmResult};

fn exhausted(timeout: Duration) -> OrmError {
    OrmError::transport(format!(
        "no connection available after {}ms",
        timeout.as_millis()
    ))
}

/// Blocking pool: a counter guarded by a mutex, waited on with a condvar
#[derive(Debug)]
pub struct ConnectionPool {
    in_use: Mutex<usize>,
    released: Condvar,
    max: usize,
    timeout: Duration,
}

impl ConnectionPool {
    pub fn new(max: usize, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            in_use: Mutex::new(0),
            released: Condvar::new(),
            max,
            timeout,
        })
    }

    /// Wait up to the pool timeout for a free slot
    pub fn acquire(self: &Arc<Self>) -> OrmResult<PoolPermit> {
        let guard = self
            .in_use
            .lock()
            .map_err(|_| OrmError::transport("connection pool lock poisoned"))?;
        let (mut in_use, _) = self
            .released
            .wait_timeout_while(guard, self.timeout, |in_use| *in_use >= self.max)
            .map_err(|_| OrmError::transport("connection pool lock poisoned"))?;
        if *in_use >= self.max {
            return Err(exhausted(self.timeout));
        }
        *in_use += 1;
        Ok(PoolPermit {
            pool: Arc::clone(self),
        })
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.in_use
            .lock()
            .map(|in_use| self.max.saturating_sub(*in_use))
            .unwrap_or(0)
    }
}

/// A slot in a [`ConnectionPool`], returned on drop
#[derive(Debug)]
pub struct PoolPermit {
    pool: Arc<ConnectionPool>,
}

impl Drop for PoolPermit {
    fn drop(&mut self) {
        if let Ok(mut in_use) = self.pool.in_use.lock() {
            *in_use = in_use.saturating_sub(1);
        }
        self.pool.released.notify_one();
    }
}

/// Async pool backed by a tokio semaphore
#[derive(Debug, Clone)]
pub struct AsyncConnectionPool {
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl AsyncConnectionPool {
    pub fn new(max: usize, timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            timeout,
        }
    }

    /// Wait up to the pool timeout for a free slot
    ///
    /// Dropping the returned future while it waits gives nothing up.
    pub async fn acquire(&self) -> OrmResult<AsyncPoolPermit> {
        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        match tokio::time::timeout(self.timeout, acquire).await {
            Ok(Ok(permit)) => Ok(AsyncPoolPermit { _permit: permit }),
            Ok(Err(_)) => Err(OrmError::transport("connection pool closed")),
            Err(_) => Err(exhausted(self.timeout)),
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// A slot in an [`AsyncConnectionPool`], returned on drop
#[derive(Debug)]
pub struct AsyncPoolPermit {
    _permit: OwnedSemaphorePermit,
}
