//! JSON-RPC execution-layer client backed by alloy

use super::{Receipt, ReceiptGetter, Sender};
use crate::error::{OracleError, ReceiptError, SendError};
use crate::tx::{CostParams, CostParamsSource};

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{address, Address, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::sol;
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// OP Stack predeploy holding the L1 fee parameters
const L1_BLOCK: Address = address!("4200000000000000000000000000000000000015");

const INDEXING_IN_PROGRESS: &str = "transaction indexing is in progress";

sol! {
    #[sol(rpc)]
    interface IL1Block {
        function basefee() external view returns (uint256);
        function blobBaseFee() external view returns (uint256);
        function baseFeeScalar() external view returns (uint32);
        function blobBaseFeeScalar() external view returns (uint32);
        function operatorFeeScalar() external view returns (uint32);
        function operatorFeeConstant() external view returns (uint64);
    }
}

/// Receipt as served by geth and op-geth, keeping only what we settle on
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    block_hash: B256,
    block_number: U256,
    status: U256,
    gas_used: U256,
    effective_gas_price: U256,
    #[serde(default)]
    blob_gas_used: Option<U256>,
    #[serde(default)]
    blob_gas_price: Option<U256>,
    #[serde(default)]
    l1_fee: Option<U256>,
    #[serde(default)]
    operator_fee_scalar: Option<U256>,
    #[serde(default)]
    operator_fee_constant: Option<U256>,
}

impl From<RpcReceipt> for Receipt {
    fn from(r: RpcReceipt) -> Self {
        let gas_used = r.gas_used.saturating_to::<u64>();
        let operator_fee = match (r.operator_fee_scalar, r.operator_fee_constant) {
            (None, None) => None,
            (scalar, constant) => Some(
                CostParams {
                    operator_fee_scalar: scalar.unwrap_or_default(),
                    operator_fee_constant: constant.unwrap_or_default(),
                    ..Default::default()
                }
                .operator_fee(gas_used),
            ),
        };

        Receipt {
            transaction_hash: r.transaction_hash,
            block_hash: r.block_hash,
            block_number: r.block_number.saturating_to(),
            status: r.status == U256::from(1u64),
            gas_used,
            effective_gas_price: r.effective_gas_price.saturating_to(),
            blob_gas_used: r.blob_gas_used.map(|v| v.saturating_to()),
            blob_gas_price: r.blob_gas_price.map(|v| v.saturating_to()),
            l1_fee: r.l1_fee,
            operator_fee,
        }
    }
}

/// Message carried by a node error response, or the transport error text
fn error_message(err: &RpcError<TransportErrorKind>) -> String {
    match err.as_error_resp() {
        Some(payload) => payload.message.to_string(),
        None => err.to_string(),
    }
}

/// Execution-layer client talking to one HTTP endpoint
#[derive(Clone)]
pub struct RpcEl {
    provider: RootProvider,
    request_timeout: Duration,
}

impl RpcEl {
    pub fn new(url: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        let url = url.parse()?;
        info!("Connecting to execution client at {}", url);
        Ok(Self {
            provider: RootProvider::new_http(url),
            request_timeout,
        })
    }

    pub async fn chain_id(&self) -> anyhow::Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }

    /// Next nonce for `address`, counting transactions still in the pool
    pub async fn pending_nonce(&self, address: Address) -> anyhow::Result<u64> {
        Ok(self.provider.get_transaction_count(address).pending().await?)
    }

    /// Run `request` under the request timeout, giving up early on cancellation.
    /// `None` means `cancel` fired first.
    async fn bounded<T>(
        &self,
        request: impl Future<Output = T>,
        cancel: &CancellationToken,
    ) -> Option<Result<T, Elapsed>> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(self.request_timeout, request) => Some(result),
        }
    }
}

#[async_trait]
impl Sender for RpcEl {
    async fn send_transaction(
        &self,
        tx: &TxEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), SendError> {
        let raw = tx.encoded_2718();
        match self.bounded(self.provider.send_raw_transaction(&raw), cancel).await {
            None => Err(SendError::Cancelled),
            Some(Err(_)) => Err(SendError::Unrecognized("request timed out".into())),
            Some(Ok(Ok(_))) => Ok(()),
            Some(Ok(Err(e))) => {
                let message = error_message(&e);
                debug!("Node rejected tx {}: {}", tx.tx_hash(), message);
                Err(SendError::from_message(&message))
            }
        }
    }
}

#[async_trait]
impl ReceiptGetter for RpcEl {
    async fn transaction_receipt(
        &self,
        hash: B256,
        cancel: &CancellationToken,
    ) -> Result<Receipt, ReceiptError> {
        let request = self
            .provider
            .raw_request::<_, Option<RpcReceipt>>("eth_getTransactionReceipt".into(), (hash,));
        match self.bounded(request, cancel).await {
            None => Err(ReceiptError::Cancelled),
            Some(Err(_)) => Err(ReceiptError::Other("request timed out".into())),
            Some(Ok(Ok(Some(receipt)))) => Ok(receipt.into()),
            Some(Ok(Ok(None))) => Err(ReceiptError::NotFound),
            Some(Ok(Err(e))) => {
                let message = error_message(&e);
                if message.contains(INDEXING_IN_PROGRESS) {
                    Err(ReceiptError::IndexingInProgress)
                } else {
                    Err(ReceiptError::Other(message))
                }
            }
        }
    }
}

#[async_trait]
impl CostParamsSource for RpcEl {
    async fn cost_params(&self) -> Result<CostParams, OracleError> {
        let l1_block = IL1Block::new(L1_BLOCK, self.provider.clone());
        let fetch = |e: alloy::contract::Error| OracleError::Fetch(e.to_string());

        let (basefee, blob_base_fee, base_fee_scalar, blob_scalar, op_scalar, op_constant) =
            tokio::try_join!(
                async { l1_block.basefee().call().await.map_err(fetch) },
                async { l1_block.blobBaseFee().call().await.map_err(fetch) },
                async { l1_block.baseFeeScalar().call().await.map_err(fetch) },
                async { l1_block.blobBaseFeeScalar().call().await.map_err(fetch) },
                async { l1_block.operatorFeeScalar().call().await.map_err(fetch) },
                async { l1_block.operatorFeeConstant().call().await.map_err(fetch) },
            )?;

        Ok(CostParams {
            l1_base_fee: basefee,
            l1_blob_base_fee: blob_base_fee,
            base_fee_scalar: U256::from(base_fee_scalar),
            blob_base_fee_scalar: U256::from(blob_scalar),
            operator_fee_scalar: U256::from(op_scalar),
            operator_fee_constant: U256::from(op_constant),
        })
    }
}
