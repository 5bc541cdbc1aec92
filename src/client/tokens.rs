//! Flow-control token pool.
//!
//! A counting semaphore that bounds how many requests a connection has in
//! flight. The sender takes a token per request and the receiver gives it
//! back once the matching response has been read. Taking blocks when the
//! pool is empty; giving back never blocks.

use std::sync::Arc;
use tokio::sync::{Semaphore, TryAcquireError};

/// Requests a single connection may have outstanding.
pub const DEFAULT_TOKENS: usize = 10;

/// The pool was closed while waiting for, or instead of, a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolClosed;

impl std::fmt::Display for PoolClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "token pool closed")
    }
}

impl std::error::Error for PoolClosed {}

/// Shared token pool. Clones refer to the same pool.
#[derive(Debug, Clone)]
pub struct TokenPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl TokenPool {
    /// Create a full pool holding `capacity` tokens.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take one token, waiting until one is available.
    pub async fn acquire(&self) -> Result<(), PoolClosed> {
        let permit = self.permits.acquire().await.map_err(|_| PoolClosed)?;
        // Returned explicitly through `release`
        permit.forget();
        Ok(())
    }

    /// Take one token if available. `Ok(false)` means the pool is empty.
    pub fn try_acquire(&self) -> Result<bool, PoolClosed> {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                Ok(true)
            }
            Err(TryAcquireError::NoPermits) => Ok(false),
            Err(TryAcquireError::Closed) => Err(PoolClosed),
        }
    }

    /// Give one token back.
    pub fn release(&self) {
        debug_assert!(
            self.permits.available_permits() < self.capacity,
            "token released more often than acquired"
        );
        self.permits.add_permits(1);
    }

    /// Wake all waiters with [`PoolClosed`] and refuse further acquires.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Tokens currently taken.
    #[allow(dead_code)]
    pub fn outstanding(&self) -> usize {
        self.capacity
            .saturating_sub(self.permits.available_permits())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TokenPool {
    fn default() -> Self {
        Self::new(DEFAULT_TOKENS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_until_empty() {
        let pool = TokenPool::default();
        assert_eq!(pool.capacity(), 10);

        for _ in 0..10 {
            pool.acquire().await.unwrap();
        }
        assert_eq!(pool.outstanding(), 10);
        assert_eq!(pool.try_acquire(), Ok(false));

        pool.release();
        assert_eq!(pool.outstanding(), 9);
        assert_eq!(pool.try_acquire(), Ok(true));
    }

    #[tokio::test]
    async fn test_acquire_blocks_until_release() {
        let pool = TokenPool::new(1);
        pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        pool.release();
        assert_eq!(waiter.await.unwrap(), Ok(()));
        assert_eq!(pool.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_close_wakes_waiter() {
        let pool = TokenPool::new(1);
        pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.close();
        assert_eq!(waiter.await.unwrap(), Err(PoolClosed));
        assert_eq!(pool.try_acquire(), Err(PoolClosed));
    }
}
