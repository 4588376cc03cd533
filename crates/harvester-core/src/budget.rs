//! Shared concurrency budget and cancellation-aware queue operations.
//!
//! Every blocking point in the pipeline (permit acquisition, queue push,
//! queue pull) goes through this module so that it also returns as soon as
//! the run is cancelled.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

/// Process-wide permit pool bounding outbound HTTP requests and subprocesses.
#[derive(Clone, Debug)]
pub struct Budget {
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Budget {
    pub fn new(workers: usize, cancel: CancellationToken) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            cancel,
        }
    }

    /// Waits for a permit; `None` once the run is cancelled.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        }
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Pushes onto a bounded queue; `false` if cancelled or the consumer is gone.
pub async fn send<T>(tx: &mpsc::Sender<T>, value: T, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(value) => sent.is_ok(),
    }
}

/// Pulls from a bounded queue; `None` if cancelled or every producer has finished.
pub async fn recv<T>(rx: &mut mpsc::Receiver<T>, cancel: &CancellationToken) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        value = rx.recv() => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn acquire_returns_none_after_cancel() {
        let cancel = CancellationToken::new();
        let budget = Budget::new(1, cancel.clone());
        let held = budget.acquire().await;
        assert!(held.is_some());
        assert_eq!(budget.available(), 0);

        let waiter = {
            let budget = budget.clone();
            tokio::spawn(async move { budget.acquire().await.is_none() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn dropping_a_permit_returns_it() {
        let budget = Budget::new(2, CancellationToken::new());
        let permit = budget.acquire().await.unwrap();
        assert_eq!(budget.available(), 1);
        drop(permit);
        assert_eq!(budget.available(), 2);
    }

    #[tokio::test]
    async fn zero_workers_still_yields_one_permit() {
        let budget = Budget::new(0, CancellationToken::new());
        assert_eq!(budget.available(), 1);
    }

    #[tokio::test]
    async fn send_on_full_queue_unblocks_on_cancel() {
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel::<u32>(1);
        assert!(send(&tx, 1, &cancel).await);

        let pending = {
            let cancel = cancel.clone();
            tokio::spawn(async move { send(&tx, 2, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert!(!pending.await.unwrap());
    }

    #[tokio::test]
    async fn recv_sees_close_and_cancel() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<u32>(2);
        tx.send(5).await.unwrap();
        drop(tx);
        assert_eq!(recv(&mut rx, &cancel).await, Some(5));
        assert_eq!(recv(&mut rx, &cancel).await, None);

        let (_tx, mut rx) = mpsc::channel::<u32>(2);
        cancel.cancel();
        assert_eq!(recv(&mut rx, &cancel).await, None);
    }
}
