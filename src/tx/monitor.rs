//! Receipt polling that hides temporary unavailability

use crate::chain::{Receipt, ReceiptGetter};
use crate::error::ReceiptError;

use alloy::primitives::B256;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Polls once per block while the receipt is missing or still being indexed.
pub struct Monitor<R> {
    inner: R,
    block_time: Duration,
}

impl<R: ReceiptGetter> Monitor<R> {
    pub fn new(inner: R, block_time: Duration) -> Self {
        Self { inner, block_time }
    }
}

#[async_trait]
impl<R: ReceiptGetter> ReceiptGetter for Monitor<R> {
    async fn transaction_receipt(
        &self,
        hash: B256,
        cancel: &CancellationToken,
    ) -> Result<Receipt, ReceiptError> {
        loop {
            if cancel.is_cancelled() {
                return Err(ReceiptError::Cancelled);
            }

            match self.inner.transaction_receipt(hash, cancel).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_transient() => debug!("Receipt for {} not ready: {}", hash, e),
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ReceiptError::Cancelled),
                _ = tokio::time::sleep(self.block_time) => {}
            }
        }
    }
}
