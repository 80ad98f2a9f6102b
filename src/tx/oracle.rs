//! L1 data and operator fee estimation for OP Stack chains
//!
//! Fee model (Fjord data fee plus Isthmus operator fee):
//! - Data size is estimated from the FastLZ-compressed signed transaction
//! - Data fee scales with the L1 base fee and L1 blob base fee
//! - Operator fee is linear in gas

use super::cost::OpCostOracle;
use crate::error::OracleError;

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::U256;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fixed overhead added to the compressed size (signature and framing)
const FASTLZ_SIZE_OVERHEAD: u64 = 68;
/// Linear regression intercept, scaled by 1e6
const L1_COST_INTERCEPT: u64 = 42_585_600;
/// Linear regression slope on the FastLZ size, scaled by 1e6
const L1_COST_FASTLZ_COEF: u64 = 836_500;
/// Smallest estimated transaction size, scaled by 1e6
const MIN_TRANSACTION_SIZE_SCALED: u64 = 100 * 1_000_000;
const FJORD_DIVISOR: u64 = 1_000_000_000_000;
const OPERATOR_FEE_DIVISOR: u64 = 1_000_000;

/// Pricing parameters published by the L1Block predeploy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CostParams {
    pub l1_base_fee: U256,
    pub l1_blob_base_fee: U256,
    pub base_fee_scalar: U256,
    pub blob_base_fee_scalar: U256,
    pub operator_fee_scalar: U256,
    pub operator_fee_constant: U256,
}

impl CostParams {
    /// L1 data fee for a transaction whose FastLZ-compressed size is `fastlz_size`
    pub fn l1_cost(&self, fastlz_size: u64) -> U256 {
        let estimated = U256::from(L1_COST_FASTLZ_COEF)
            .saturating_mul(U256::from(fastlz_size.saturating_add(FASTLZ_SIZE_OVERHEAD)))
            .saturating_sub(U256::from(L1_COST_INTERCEPT))
            .max(U256::from(MIN_TRANSACTION_SIZE_SCALED));

        let fee_scaled = self
            .base_fee_scalar
            .saturating_mul(self.l1_base_fee)
            .saturating_mul(U256::from(16u64))
            .saturating_add(self.blob_base_fee_scalar.saturating_mul(self.l1_blob_base_fee));

        estimated.saturating_mul(fee_scaled) / U256::from(FJORD_DIVISOR)
    }

    /// Operator fee charged for `gas` units
    pub fn operator_fee(&self, gas: u64) -> U256 {
        U256::from(gas).saturating_mul(self.operator_fee_scalar) / U256::from(OPERATOR_FEE_DIVISOR)
            + self.operator_fee_constant
    }
}

/// Where fresh [`CostParams`] come from
#[async_trait]
pub trait CostParamsSource: Send + Sync {
    async fn cost_params(&self) -> Result<CostParams, OracleError>;
}

/// Cached OP Stack cost estimator, refreshed once per block
pub struct IsthmusCostOracle<P> {
    source: P,
    block_time: Duration,
    params: RwLock<Option<CostParams>>,
}

impl<P: CostParamsSource> IsthmusCostOracle<P> {
    pub fn new(source: P, block_time: Duration) -> Self {
        Self {
            source,
            block_time,
            params: RwLock::new(None),
        }
    }

    /// Fetch and cache the current parameters
    pub async fn refresh(&self) -> Result<CostParams, OracleError> {
        let params = self.source.cost_params().await?;
        *self.params.write() = Some(params);
        debug!("Refreshed cost params: {:?}", params);
        Ok(params)
    }

    /// Keep the cache fresh until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.block_time) => {}
            }
            if let Err(e) = self.refresh().await {
                warn!("Keeping stale cost params: {}", e);
            }
        }
    }

    pub fn params(&self) -> Option<CostParams> {
        *self.params.read()
    }
}

impl<P: CostParamsSource> OpCostOracle for IsthmusCostOracle<P> {
    fn cost(&self, tx: &TxEnvelope) -> U256 {
        let Some(params) = self.params() else {
            return U256::ZERO;
        };
        let size = flz_compress_len(&tx.encoded_2718()) as u64;
        params.l1_cost(size) + params.operator_fee(tx.gas_limit())
    }
}

/// Length of the FastLZ (level 1) compression of `input`, without producing it.
pub fn flz_compress_len(input: &[u8]) -> u32 {
    let len = input.len() as u32;
    let mut n: u32 = 0;
    let mut table = vec![0u32; 8192];

    let u24 = |i: u32| -> u32 {
        let i = i as usize;
        input[i] as u32 | (input[i + 1] as u32) << 8 | (input[i + 2] as u32) << 16
    };
    let hash = |v: u32| -> usize { ((2_654_435_769u32.wrapping_mul(v) >> 19) & 0x1fff) as usize };
    let literals = |n: &mut u32, r: u32| {
        *n += 0x21 * (r / 0x20);
        let r = r % 0x20;
        if r != 0 {
            *n += r + 1;
        }
    };

    let mut anchor: u32 = 0;
    let ip_limit = len.saturating_sub(13);
    let mut ip = anchor + 2;
    while ip < ip_limit {
        let mut reference;
        loop {
            let seq = u24(ip);
            let h = hash(seq);
            reference = table[h];
            table[h] = ip;
            let distance = ip - reference;
            if ip >= ip_limit {
                break;
            }
            ip += 1;
            if distance <= 0x1fff && seq == u24(reference) {
                break;
            }
        }
        if ip >= ip_limit {
            break;
        }
        ip -= 1;
        if ip > anchor {
            literals(&mut n, ip - anchor);
        }

        // Match length, scanning from the bytes after the 3-byte seed.
        let (p, q) = (reference + 3, ip + 3);
        let end = ip_limit + 9 - q;
        let mut l = 0;
        while l < end {
            if input[(p + l) as usize] != input[(q + l) as usize] {
                l += 1;
                break;
            }
            l += 1;
        }

        let m = l - 1;
        n += 3 * (m / 262);
        n += if m % 262 >= 6 { 3 } else { 2 };

        ip += l;
        for _ in 0..2 {
            table[hash(u24(ip))] = ip;
            ip += 1;
        }
        anchor = ip;
    }
    literals(&mut n, len - anchor);
    n
}
