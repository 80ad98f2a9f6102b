//! Transaction cost estimation and reconciliation against a shared budget

use super::persistent::IncludedTx;
use crate::accounting::Budget;
use crate::error::BudgetError;

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip4844::DATA_GAS_PER_BLOB;
use alloy::primitives::U256;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Protocol surcharges on top of execution gas, e.g. the OP Stack L1 data fee.
///
/// Implementations read cached pricing parameters and must not block.
pub trait OpCostOracle: Send + Sync {
    fn cost(&self, tx: &TxEnvelope) -> U256;
}

/// Charges a [`Budget`] for a transaction across its whole lifecycle.
///
/// Holds no running total: callers pass back the amount charged so far and get
/// the new authoritative charge.
#[derive(Clone)]
pub struct TxBudget {
    budget: Arc<Budget>,
    oracle: Option<Arc<dyn OpCostOracle>>,
}

impl TxBudget {
    pub fn new(budget: Arc<Budget>) -> Self {
        Self {
            budget,
            oracle: None,
        }
    }

    pub fn with_op_cost_oracle(mut self, oracle: Arc<dyn OpCostOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn budget(&self) -> &Arc<Budget> {
        &self.budget
    }

    /// Upper bound of what `tx` can spend: gas, blob gas and protocol surcharges
    pub fn cost(&self, tx: &TxEnvelope) -> U256 {
        let gas = U256::from(tx.gas_limit()).saturating_mul(U256::from(tx.max_fee_per_gas()));

        let blobs = tx.blob_versioned_hashes().map_or(0, |hashes| hashes.len()) as u64;
        let blob_gas = U256::from(blobs * DATA_GAS_PER_BLOB)
            .saturating_mul(U256::from(tx.max_fee_per_blob_gas().unwrap_or_default()));

        let external = self
            .oracle
            .as_ref()
            .map(|oracle| oracle.cost(tx))
            .unwrap_or_default();

        gas.saturating_add(blob_gas).saturating_add(external)
    }

    /// Re-charge for the current shape of `tx`, given `old_cost` already charged.
    ///
    /// On overdraft nothing is charged and `old_cost` remains the charge.
    pub fn before_resubmit(&self, old_cost: U256, tx: &TxEnvelope) -> Result<U256, BudgetError> {
        let new_cost = self.cost(tx);
        match new_cost.cmp(&old_cost) {
            Ordering::Greater => {
                self.budget.debit(new_cost - old_cost)?;
            }
            Ordering::Less => {
                self.budget.credit(old_cost - new_cost);
            }
            Ordering::Equal => {}
        }
        debug!(
            "Charged {} wei for tx {} (previously {} wei)",
            new_cost,
            tx.tx_hash(),
            old_cost
        );
        Ok(new_cost)
    }

    /// The attempt never spent anything: return the whole charge.
    pub fn after_cancel(&self, charged: U256) {
        self.budget.credit(charged);
    }

    /// Settle against the receipt, returning the unspent part of the charge.
    ///
    /// Assumes `charged` is an upper bound of the settled cost. If it is not,
    /// the difference is debited down to zero and any uncovered part is logged.
    pub fn after_included(&self, charged: U256, included: &IncludedTx) {
        let actual = included.receipt.settled_cost();
        if charged >= actual {
            self.budget.credit(charged - actual);
            return;
        }
        warn!(
            "Tx {} settled at {} wei, above the {} wei charged",
            included.receipt.transaction_hash, actual, charged
        );
        let shortfall = self.budget.drain(actual - charged);
        if !shortfall.is_zero() {
            warn!(
                "Budget exhausted settling tx {}: {} wei not covered",
                included.receipt.transaction_hash, shortfall
            );
        }
    }
}
