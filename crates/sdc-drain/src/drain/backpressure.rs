//! Admission control between the page reader and the decode workers
//!
//! At most `ceiling` rows may be read from staging but not yet handed to the
//! batcher. The reader waits in [`Backpressure::admit`] once the ceiling is
//! reached and resumes as soon as a row is released.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Proof that one row was admitted. Dropping it releases the slot.
#[derive(Debug)]
pub struct AdmitToken {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Clone)]
pub struct Backpressure {
    permits: Arc<Semaphore>,
    ceiling: usize,
}

impl Backpressure {
    /// A ceiling of zero is treated as one.
    pub fn new(ceiling: usize) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            permits: Arc::new(Semaphore::new(ceiling)),
            ceiling,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Wait for a free slot.
    ///
    /// Returns `None` once [`close`](Self::close) was called, including for
    /// callers already waiting.
    pub async fn admit(&self) -> Option<AdmitToken> {
        let permit = Arc::clone(&self.permits).acquire_owned().await.ok()?;
        Some(AdmitToken { _permit: permit })
    }

    /// Give the slot back. Dropping the token does the same.
    pub fn release(&self, token: AdmitToken) {
        drop(token);
    }

    /// Wake every waiter and refuse further admissions
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn in_flight(&self) -> usize {
        self.ceiling - self.permits.available_permits()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_admits_up_to_ceiling() {
        let bp = Backpressure::new(3);
        let a = bp.admit().await.unwrap();
        let _b = bp.admit().await.unwrap();
        let _c = bp.admit().await.unwrap();
        assert_eq!(bp.in_flight(), 3);

        // Fourth admission must wait
        assert!(bp.admit().now_or_never().is_none());

        bp.release(a);
        assert_eq!(bp.in_flight(), 2);
        assert!(bp.admit().now_or_never().flatten().is_some());
    }

    #[tokio::test]
    async fn test_zero_ceiling_is_one() {
        let bp = Backpressure::new(0);
        assert_eq!(bp.ceiling(), 1);
        let _a = bp.admit().await.unwrap();
        assert!(bp.admit().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_release_unblocks_waiter() {
        let bp = Backpressure::new(1);
        let token = bp.admit().await.unwrap();

        let waiter = {
            let bp = bp.clone();
            tokio::spawn(async move { bp.admit().await.is_some() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        bp.release(token);
        assert!(tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap());
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let bp = Backpressure::new(1);
        let _token = bp.admit().await.unwrap();

        let waiter = {
            let bp = bp.clone();
            tokio::spawn(async move { bp.admit().await.is_none() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        bp.close();
        assert!(tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap());
        assert!(bp.admit().await.is_none());
    }
}
