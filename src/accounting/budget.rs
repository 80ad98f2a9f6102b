//! Thread-safe wei balance with overdraft signaling

use crate::error::BudgetError;

use alloy::primitives::U256;
use parking_lot::Mutex;
use tracing::debug;

/// A spendable balance that never goes negative.
///
/// One ledger may back several signing keys, so every operation takes the lock.
#[derive(Debug)]
pub struct Budget {
    balance: Mutex<U256>,
}

impl Budget {
    pub fn new(initial: U256) -> Self {
        Self {
            balance: Mutex::new(initial),
        }
    }

    /// Remove `amount` from the balance, returning what is left.
    ///
    /// On overdraft the balance is left untouched.
    pub fn debit(&self, amount: U256) -> Result<U256, BudgetError> {
        let mut balance = self.balance.lock();
        if amount > *balance {
            return Err(BudgetError::Overdraft {
                requested: amount,
                remaining: *balance,
            });
        }
        *balance -= amount;
        debug!("Debited {} wei, {} wei remaining", amount, *balance);
        Ok(*balance)
    }

    /// Remove as much of `amount` as the balance covers, down to zero.
    ///
    /// Returns the part left uncovered.
    pub fn drain(&self, amount: U256) -> U256 {
        let mut balance = self.balance.lock();
        let covered = amount.min(*balance);
        *balance -= covered;
        debug!("Drained {} of {} wei, {} wei remaining", covered, amount, *balance);
        amount - covered
    }

    /// Add `amount` to the balance, saturating at `U256::MAX`.
    pub fn credit(&self, amount: U256) -> U256 {
        let mut balance = self.balance.lock();
        *balance = balance.saturating_add(amount);
        debug!("Credited {} wei, {} wei remaining", amount, *balance);
        *balance
    }

    pub fn balance(&self) -> U256 {
        *self.balance.lock()
    }
}
