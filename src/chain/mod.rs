//! Chain module - the execution-layer surface the inclusion engine drives
//!
//! This module provides:
//! - The raw `Sender` / `ReceiptGetter` operations as traits
//! - `ReliableEl`, which layers resubmission and receipt polling over a raw client
//! - `RpcEl`, a JSON-RPC client backed by alloy

pub mod provider;

pub use provider::RpcEl;

use crate::error::{ReceiptError, SendError};
use crate::tx::{Monitor, Resubmitter, ResubmitterObserver};

use alloy::consensus::TxEnvelope;
use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Settlement record of an included transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: B256,
    pub block_hash: B256,
    pub block_number: u64,
    /// Execution succeeded
    pub status: bool,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub blob_gas_used: Option<u64>,
    pub blob_gas_price: Option<u128>,
    /// L1 data fee charged by OP Stack chains
    pub l1_fee: Option<U256>,
    /// Operator fee charged by OP Stack chains since Isthmus
    pub operator_fee: Option<U256>,
}

impl Receipt {
    /// Total wei the sender paid for this transaction
    pub fn settled_cost(&self) -> U256 {
        let gas = U256::from(self.gas_used).saturating_mul(U256::from(self.effective_gas_price));
        let blob = match (self.blob_gas_used, self.blob_gas_price) {
            (Some(used), Some(price)) => U256::from(used).saturating_mul(U256::from(price)),
            _ => U256::ZERO,
        };
        gas.saturating_add(blob)
            .saturating_add(self.l1_fee.unwrap_or_default())
            .saturating_add(self.operator_fee.unwrap_or_default())
    }
}

/// Submits a signed transaction
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send_transaction(
        &self,
        tx: &TxEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), SendError>;
}

/// Looks up the receipt of a transaction by hash
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReceiptGetter: Send + Sync {
    async fn transaction_receipt(
        &self,
        hash: B256,
        cancel: &CancellationToken,
    ) -> Result<Receipt, ReceiptError>;
}

/// An execution-layer client able to both submit and report inclusion
pub trait El: Sender + ReceiptGetter {}

impl<T: Sender + ReceiptGetter + ?Sized> El for T {}

#[async_trait]
impl<T: Sender + ?Sized> Sender for Arc<T> {
    async fn send_transaction(
        &self,
        tx: &TxEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), SendError> {
        (**self).send_transaction(tx, cancel).await
    }
}

#[async_trait]
impl<T: ReceiptGetter + ?Sized> ReceiptGetter for Arc<T> {
    async fn transaction_receipt(
        &self,
        hash: B256,
        cancel: &CancellationToken,
    ) -> Result<Receipt, ReceiptError> {
        (**self).transaction_receipt(hash, cancel).await
    }
}

/// Raw client wrapped with resubmission and receipt polling
pub struct ReliableEl<E> {
    resubmitter: Resubmitter<Arc<E>>,
    monitor: Monitor<Arc<E>>,
}

impl<E: El> ReliableEl<E> {
    pub fn new(el: Arc<E>, block_time: Duration) -> Self {
        Self {
            resubmitter: Resubmitter::new(el.clone(), block_time),
            monitor: Monitor::new(el, block_time),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResubmitterObserver>) -> Self {
        self.resubmitter = self.resubmitter.with_observer(observer);
        self
    }
}

#[async_trait]
impl<E: El> Sender for ReliableEl<E> {
    async fn send_transaction(
        &self,
        tx: &TxEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), SendError> {
        self.resubmitter.send_transaction(tx, cancel).await
    }
}

#[async_trait]
impl<E: El> ReceiptGetter for ReliableEl<E> {
    async fn transaction_receipt(
        &self,
        hash: B256,
        cancel: &CancellationToken,
    ) -> Result<Receipt, ReceiptError> {
        self.monitor.transaction_receipt(hash, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt() -> Receipt {
        Receipt {
            transaction_hash: B256::ZERO,
            block_hash: B256::ZERO,
            block_number: 1,
            status: true,
            gas_used: 21_000,
            effective_gas_price: 2,
            blob_gas_used: None,
            blob_gas_price: None,
            l1_fee: None,
            operator_fee: None,
        }
    }

    #[test]
    fn test_settled_cost_sums_all_components() {
        let mut r = receipt();
        assert_eq!(r.settled_cost(), U256::from(42_000u64));

        r.blob_gas_used = Some(131_072);
        r.blob_gas_price = Some(3);
        r.l1_fee = Some(U256::from(100u64));
        r.operator_fee = Some(U256::from(7u64));
        assert_eq!(
            r.settled_cost(),
            U256::from(42_000u64 + 393_216 + 100 + 7)
        );
    }
}
