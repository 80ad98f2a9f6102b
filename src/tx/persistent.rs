//! Persistent inclusion: sign, charge, submit and watch until the transaction
//! lands or fails for good

use super::cost::TxBudget;
use super::nonce::NonceManager;
use super::payload::UnincludedTx;
use super::signer::Signer;
use crate::chain::{El, Receipt};
use crate::error::{IncludeError, IncludeResult, SendError};

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A transaction together with the receipt that settled it
#[derive(Debug, Clone, PartialEq)]
pub struct IncludedTx {
    pub transaction: TxEnvelope,
    pub receipt: Receipt,
}

/// Per-call attempt state, threaded from one attempt to the next
struct TryState {
    tx: UnincludedTx,
    /// Amount currently charged against the budget for this call
    cost: U256,
}

enum Attempt {
    Included(IncludedTx),
    Retry(TryState),
}

/// Whichever of submission and monitoring finished first
enum Outcome {
    Included(Receipt),
    Failed(IncludeError),
    Cancelled,
}

/// Drives transactions from one signing key to inclusion.
///
/// Safe to share between concurrent callers for the same key.
pub struct Persistent<S, E> {
    signer: S,
    el: Arc<E>,
    nonces: NonceManager,
    budget: Option<TxBudget>,
}

impl<S, E> Persistent<S, E>
where
    S: Signer,
    E: El + 'static,
{
    /// `start_nonce` is the first nonce the key has not used yet.
    pub fn new(signer: S, el: Arc<E>, start_nonce: u64) -> Self {
        Self {
            signer,
            el,
            nonces: NonceManager::new(start_nonce),
            budget: None,
        }
    }

    pub fn with_budget(mut self, budget: TxBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    /// Include `tx`, overwriting its nonce.
    ///
    /// On error the charged budget has been returned and the nonce released.
    pub async fn include(
        &self,
        tx: UnincludedTx,
        cancel: &CancellationToken,
    ) -> IncludeResult<IncludedTx> {
        let started = Instant::now();
        let kind = tx.kind();
        let mut state = TryState {
            tx: tx.with_nonce(self.nonces.next()),
            cost: U256::ZERO,
        };

        let result = loop {
            match self.try_include(state, cancel).await {
                Ok(Attempt::Included(included)) => break Ok(included),
                Ok(Attempt::Retry(next)) => state = next,
                Err(e) => break Err(e),
            }
        };

        match &result {
            Ok(included) => {
                info!(
                    "Included {} tx {} with nonce {} in block {}",
                    kind,
                    included.receipt.transaction_hash,
                    included.transaction.nonce(),
                    included.receipt.block_number
                );
                crate::metrics::record_included(started.elapsed().as_secs_f64());
            }
            Err(e) if e.is_cancelled() => {
                warn!("Inclusion cancelled");
                crate::metrics::record_failed(e);
            }
            Err(e) if e.should_alert() => {
                error!("Inclusion of {} tx failed, needs attention: {}", kind, e);
                crate::metrics::record_failed(e);
            }
            Err(e) => {
                warn!("Inclusion of {} tx failed: {}", kind, e);
                crate::metrics::record_failed(e);
            }
        }
        if let Some(budget) = &self.budget {
            crate::metrics::record_budget_balance(budget.budget().balance());
        }
        result
    }

    /// One sign-charge-race round.
    async fn try_include(
        &self,
        mut state: TryState,
        cancel: &CancellationToken,
    ) -> IncludeResult<Attempt> {
        if cancel.is_cancelled() {
            self.abandon(&state);
            return Err(IncludeError::Cancelled);
        }

        let tx = match self.signer.sign(state.tx.clone()).await {
            Ok(tx) => tx,
            Err(e) => {
                self.abandon(&state);
                return Err(e.into());
            }
        };

        if let Some(budget) = &self.budget {
            match budget.before_resubmit(state.cost, &tx) {
                Ok(cost) => state.cost = cost,
                Err(e) => {
                    self.abandon(&state);
                    return Err(e.into());
                }
            }
        }

        match self.race(&tx, cancel).await {
            Outcome::Included(receipt) => {
                let included = IncludedTx {
                    transaction: tx,
                    receipt,
                };
                if let Some(budget) = &self.budget {
                    budget.after_included(state.cost, &included);
                }
                Ok(Attempt::Included(included))
            }
            Outcome::Failed(IncludeError::Send(SendError::NonceTooLow)) => {
                let nonce = self.nonces.next();
                warn!(
                    "Nonce {} too low for tx {}, retrying with {}",
                    state.tx.nonce(),
                    tx.tx_hash(),
                    nonce
                );
                state.tx.set_nonce(nonce);
                Ok(Attempt::Retry(state))
            }
            Outcome::Failed(IncludeError::Send(e)) if e.is_underpriced() => {
                // TODO: bump fees instead of retrying the same offer.
                warn!("Tx {} {}, retrying", tx.tx_hash(), e);
                Ok(Attempt::Retry(state))
            }
            Outcome::Failed(e) => {
                self.abandon(&state);
                Err(e)
            }
            Outcome::Cancelled => {
                self.abandon(&state);
                Err(IncludeError::Cancelled)
            }
        }
    }

    /// Submit and watch `tx` concurrently; the first result wins.
    async fn race(&self, tx: &TxEnvelope, cancel: &CancellationToken) -> Outcome {
        let attempt = cancel.child_token();
        let (included_tx, mut included_rx) = mpsc::channel::<Receipt>(1);
        let (error_tx, mut error_rx) = mpsc::channel::<IncludeError>(1);

        let submit = tokio::spawn({
            let el = self.el.clone();
            let tx = tx.clone();
            let attempt = attempt.clone();
            let error_tx = error_tx.clone();
            async move {
                if let Err(e) = el.send_transaction(&tx, &attempt).await {
                    let _ = error_tx.try_send(e.into());
                }
            }
        });

        let monitor = tokio::spawn({
            let el = self.el.clone();
            let hash = *tx.tx_hash();
            let attempt = attempt.clone();
            async move {
                match el.transaction_receipt(hash, &attempt).await {
                    Ok(receipt) => {
                        let _ = included_tx.try_send(receipt);
                    }
                    Err(e) => {
                        let _ = error_tx.try_send(e.into());
                    }
                }
            }
        });

        let outcome = tokio::select! {
            Some(receipt) = included_rx.recv() => Outcome::Included(receipt),
            Some(e) = error_rx.recv() => Outcome::Failed(e),
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        attempt.cancel();
        let (submitted, monitored) = futures::future::join(submit, monitor).await;
        for joined in [submitted, monitored] {
            if let Err(e) = joined {
                warn!("Inclusion task for {} panicked: {}", tx.tx_hash(), e);
            }
        }
        outcome
    }

    /// Return the charge and release the nonce of an abandoned call.
    fn abandon(&self, state: &TryState) {
        if let Some(budget) = &self.budget {
            budget.after_cancel(state.cost);
        }
        self.nonces.insert_gap(state.tx.nonce());
        debug!(
            "Released nonce {} and {} wei",
            state.tx.nonce(),
            state.cost
        );
    }
}
