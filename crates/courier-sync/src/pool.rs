//! Bound on concurrent sessions.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Result, SyncError};

/// A fixed number of session slots shared by every listener of a process.
#[derive(Debug, Clone)]
pub struct SessionPool {
    slots: Arc<Semaphore>,
    max: usize,
}

/// Held for the lifetime of one session; frees its slot on drop.
#[derive(Debug)]
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
}

impl SessionPool {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Take a slot if one is free.
    pub fn try_admit(&self) -> Result<SessionPermit> {
        self.slots
            .clone()
            .try_acquire_owned()
            .map(|permit| SessionPermit { _permit: permit })
            .map_err(|_| SyncError::PoolFull)
    }

    /// Wait for a free slot.
    pub async fn admit(&self) -> Result<SessionPermit> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .map(|permit| SessionPermit { _permit: permit })
            .map_err(|_| SyncError::PoolFull)
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_try_admit_bounded() {
        let pool = SessionPool::new(2);
        let a = pool.try_admit().unwrap();
        let _b = pool.try_admit().unwrap();
        assert!(matches!(pool.try_admit(), Err(SyncError::PoolFull)));
        assert_eq!(pool.available(), 0);

        drop(a);
        assert_eq!(pool.available(), 1);
        assert!(pool.try_admit().is_ok());
    }

    #[tokio::test]
    async fn test_admit_waits_for_release() {
        let pool = SessionPool::new(1);
        let held = pool.admit().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.admit().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
        assert_eq!(pool.available(), pool.max());
    }
}
