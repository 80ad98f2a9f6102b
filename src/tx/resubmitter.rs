//! Resubmission policy layered over a raw sender

use crate::chain::Sender;
use crate::error::SendError;

use alloy::consensus::TxEnvelope;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Blocks to wait before resubmitting a transaction the node already holds
const KEEPALIVE_BLOCKS: u32 = 3;

/// Sees the outcome of every individual submission
pub trait ResubmitterObserver: Send + Sync {
    /// `None` means the node accepted the submission.
    fn submission_result(&self, err: Option<&SendError>);
}

/// Observer that ignores everything
pub struct NoopObserver;

impl ResubmitterObserver for NoopObserver {
    fn submission_result(&self, _err: Option<&SendError>) {}
}

/// Keeps a transaction in the node's pool until cancelled or rejected for good.
///
/// Accepted and already-known submissions are repeated every few blocks so the
/// transaction is not evicted. Anything else outside the fatal set is retried
/// every block.
pub struct Resubmitter<S> {
    inner: S,
    block_time: Duration,
    observer: Arc<dyn ResubmitterObserver>,
}

impl<S: Sender> Resubmitter<S> {
    pub fn new(inner: S, block_time: Duration) -> Self {
        Self {
            inner,
            block_time,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResubmitterObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn delay_after(&self, result: &Result<(), SendError>) -> Duration {
        match result {
            Ok(()) | Err(SendError::AlreadyKnown) => self.block_time * KEEPALIVE_BLOCKS,
            Err(_) => self.block_time,
        }
    }
}

#[async_trait]
impl<S: Sender> Sender for Resubmitter<S> {
    /// Only returns with a fatal error or on cancellation.
    async fn send_transaction(
        &self,
        tx: &TxEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), SendError> {
        let hash = tx.tx_hash();
        loop {
            if cancel.is_cancelled() {
                return Err(SendError::Cancelled);
            }

            let result = self.inner.send_transaction(tx, cancel).await;
            self.observer.submission_result(result.as_ref().err());

            match &result {
                Ok(()) => debug!("Submitted tx {}", hash),
                Err(e) if e.is_fatal() => return result,
                Err(e) => warn!("Resubmitting tx {} after: {}", hash, e),
            }

            let delay = self.delay_after(&result);
            tokio::select! {
                _ = cancel.cancelled() => return Err(SendError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
