//! End-to-end inclusion scenarios against a scripted execution client

use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction, TxEip1559, TxEnvelope};
use alloy::primitives::utils::parse_ether;
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use txinclude::error::{ReceiptError, SendError};
use txinclude::tx::{OpCostOracle, Signer};
use txinclude::{
    Budget, El, IncludeError, Persistent, PkSigner, Receipt, ReceiptGetter, ReliableEl, Sender,
    TxBudget, UnincludedTx,
};

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const START_NONCE: u64 = 7;
const GWEI: u128 = 1_000_000_000;
const BLOCK_TIME: Duration = Duration::from_secs(2);

fn mined_receipt(tx: &TxEnvelope, effective_gas_price: u128) -> Receipt {
    Receipt {
        transaction_hash: *tx.tx_hash(),
        block_hash: B256::repeat_byte(0xbb),
        block_number: 1,
        status: true,
        gas_used: tx.gas_limit(),
        effective_gas_price,
        blob_gas_used: None,
        blob_gas_price: None,
        l1_fee: None,
        operator_fee: None,
    }
}

/// Answers submissions from a script, then accepts and mines everything.
struct ScriptedEl {
    script: Mutex<VecDeque<SendError>>,
    effective_gas_price: u128,
    sent_nonces: Mutex<Vec<u64>>,
    mined: Mutex<HashMap<B256, Receipt>>,
}

impl ScriptedEl {
    fn new(script: Vec<SendError>, effective_gas_price: u128) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            effective_gas_price,
            sent_nonces: Mutex::new(Vec::new()),
            mined: Mutex::new(HashMap::new()),
        })
    }

    fn sent_nonces(&self) -> Vec<u64> {
        self.sent_nonces.lock().clone()
    }
}

#[async_trait]
impl Sender for ScriptedEl {
    async fn send_transaction(
        &self,
        tx: &TxEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), SendError> {
        if cancel.is_cancelled() {
            return Err(SendError::Cancelled);
        }
        self.sent_nonces.lock().push(tx.nonce());
        let scripted = self.script.lock().pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }

        self.mined
            .lock()
            .insert(*tx.tx_hash(), mined_receipt(tx, self.effective_gas_price));
        Ok(())
    }
}

#[async_trait]
impl ReceiptGetter for ScriptedEl {
    async fn transaction_receipt(
        &self,
        hash: B256,
        cancel: &CancellationToken,
    ) -> Result<Receipt, ReceiptError> {
        loop {
            let mined = self.mined.lock().get(&hash).cloned();
            if let Some(receipt) = mined {
                return Ok(receipt);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(ReceiptError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            }
        }
    }
}

/// A bare node: answers each submission once and reports receipts for what it
/// has mined, leaving retries and polling to the caller.
struct NodeEl {
    script: Mutex<VecDeque<SendError>>,
    mines: bool,
    holds_accepted: bool,
    lookup_error: Option<ReceiptError>,
    sent_nonces: Mutex<Vec<u64>>,
    mined: Mutex<HashMap<B256, Receipt>>,
}

impl NodeEl {
    fn new(script: Vec<SendError>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            mines: true,
            holds_accepted: false,
            lookup_error: None,
            sent_nonces: Mutex::new(Vec::new()),
            mined: Mutex::new(HashMap::new()),
        }
    }

    fn never_mining(mut self) -> Self {
        self.mines = false;
        self
    }

    /// Accepted submissions only return once their attempt is cancelled.
    fn holding_accepted(mut self) -> Self {
        self.holds_accepted = true;
        self
    }

    fn failing_lookups(mut self, err: ReceiptError) -> Self {
        self.lookup_error = Some(err);
        self
    }

    fn sent_nonces(&self) -> Vec<u64> {
        self.sent_nonces.lock().clone()
    }
}

#[async_trait]
impl Sender for NodeEl {
    async fn send_transaction(
        &self,
        tx: &TxEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), SendError> {
        if cancel.is_cancelled() {
            return Err(SendError::Cancelled);
        }
        self.sent_nonces.lock().push(tx.nonce());
        let scripted = self.script.lock().pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }

        if self.mines {
            self.mined.lock().insert(*tx.tx_hash(), mined_receipt(tx, GWEI));
        }
        if self.holds_accepted {
            cancel.cancelled().await;
            return Err(SendError::Cancelled);
        }
        Ok(())
    }
}

#[async_trait]
impl ReceiptGetter for NodeEl {
    async fn transaction_receipt(
        &self,
        hash: B256,
        _cancel: &CancellationToken,
    ) -> Result<Receipt, ReceiptError> {
        if let Some(err) = &self.lookup_error {
            return Err(err.clone());
        }
        let mined = self.mined.lock().get(&hash).cloned();
        mined.ok_or(ReceiptError::NotFound)
    }
}

fn reliable(node: &Arc<NodeEl>) -> Arc<ReliableEl<NodeEl>> {
    Arc::new(ReliableEl::new(node.clone(), BLOCK_TIME))
}

struct ZeroOracle;

impl OpCostOracle for ZeroOracle {
    fn cost(&self, _tx: &TxEnvelope) -> U256 {
        U256::ZERO
    }
}

fn transfer() -> UnincludedTx {
    UnincludedTx::from(TxEip1559 {
        chain_id: 1,
        to: Address::repeat_byte(0x11).into(),
        gas_limit: 21_000,
        max_fee_per_gas: GWEI,
        max_priority_fee_per_gas: GWEI,
        ..Default::default()
    })
}

fn setup<E: El + 'static>(el: Arc<E>, initial: U256) -> (Persistent<PkSigner, E>, Arc<Budget>) {
    let budget = Arc::new(Budget::new(initial));
    let signer = PkSigner::from_hex(DEV_KEY, 1).unwrap();
    let persistent = Persistent::new(signer, el, START_NONCE)
        .with_budget(TxBudget::new(budget.clone()).with_op_cost_oracle(Arc::new(ZeroOracle)));
    (persistent, budget)
}

#[tokio::test(start_paused = true)]
async fn test_included_cost_is_settled_exactly() {
    let one_eth = parse_ether("1").unwrap();
    let el = ScriptedEl::new(vec![], GWEI);
    let (persistent, budget) = setup(el.clone(), one_eth);

    let included = persistent
        .include(transfer(), &CancellationToken::new())
        .await
        .unwrap();

    let spent = U256::from(GWEI * 21_000);
    assert_eq!(included.receipt.settled_cost(), spent);
    assert_eq!(budget.balance(), one_eth - spent);
    assert_eq!(included.transaction.nonce(), START_NONCE);
    assert_eq!(
        included.transaction.recover_signer().unwrap(),
        persistent.address()
    );
}

#[tokio::test(start_paused = true)]
async fn test_unspent_charge_is_returned() {
    let initial = parse_ether("1").unwrap();
    let el = ScriptedEl::new(vec![], GWEI / 4);
    let (persistent, budget) = setup(el, initial);

    persistent
        .include(transfer(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(budget.balance(), initial - U256::from(GWEI / 4 * 21_000));
}

#[tokio::test(start_paused = true)]
async fn test_nonce_too_low_moves_to_fresh_nonce() {
    let el = ScriptedEl::new(vec![SendError::NonceTooLow, SendError::NonceTooLow], GWEI);
    let (persistent, _budget) = setup(el.clone(), parse_ether("1").unwrap());

    let included = persistent
        .include(transfer(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(included.transaction.nonce(), START_NONCE + 2);
    assert_eq!(
        el.sent_nonces(),
        vec![START_NONCE, START_NONCE + 1, START_NONCE + 2]
    );
    assert_eq!(persistent.nonces().gap_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_underpriced_retries_same_nonce() {
    let el = ScriptedEl::new(vec![SendError::Underpriced, SendError::ReplaceUnderpriced], GWEI);
    let (persistent, budget) = setup(el.clone(), parse_ether("1").unwrap());

    let included = persistent
        .include(transfer(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(included.transaction.nonce(), START_NONCE);
    assert_eq!(el.sent_nonces(), vec![START_NONCE; 3]);
    // Retries re-charge only the difference, so nothing is counted twice.
    assert_eq!(
        budget.balance(),
        parse_ether("1").unwrap() - U256::from(GWEI * 21_000)
    );
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_restores_budget_and_nonce() {
    let initial = parse_ether("1").unwrap();
    let el = ScriptedEl::new(vec![SendError::InsufficientFunds], GWEI);
    let (persistent, budget) = setup(el.clone(), initial);

    let err = persistent
        .include(transfer(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, IncludeError::Send(SendError::InsufficientFunds));
    assert_eq!(budget.balance(), initial);
    assert_eq!(persistent.nonces().gap_count(), 1);
    assert_eq!(persistent.nonces().next(), START_NONCE);
}

#[tokio::test(start_paused = true)]
async fn test_overdraft_fails_before_sending() {
    let el = ScriptedEl::new(vec![], GWEI);
    let (persistent, budget) = setup(el.clone(), U256::from(GWEI * 20_999));

    let err = persistent
        .include(transfer(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IncludeError::Budget(_)));
    assert_eq!(budget.balance(), U256::from(GWEI * 20_999));
    assert!(el.sent_nonces().is_empty());
    assert_eq!(persistent.nonces().next(), START_NONCE);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start() {
    let initial = parse_ether("1").unwrap();
    let el = ScriptedEl::new(vec![], GWEI);
    let (persistent, budget) = setup(el.clone(), initial);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = persistent.include(transfer(), &cancel).await.unwrap_err();

    assert_eq!(err, IncludeError::Cancelled);
    assert_eq!(budget.balance(), initial);
    assert!(el.sent_nonces().is_empty());
    assert_eq!(persistent.nonces().gap_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_includes_use_distinct_nonces() {
    let el = ScriptedEl::new(vec![], GWEI);
    let (persistent, budget) = setup(el.clone(), parse_ether("1").unwrap());
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(
        persistent.include(transfer(), &cancel),
        persistent.include(transfer(), &cancel)
    );

    let mut nonces = vec![a.unwrap().transaction.nonce(), b.unwrap().transaction.nonce()];
    nonces.sort();
    assert_eq!(nonces, vec![START_NONCE, START_NONCE + 1]);
    assert_eq!(
        budget.balance(),
        parse_ether("1").unwrap() - U256::from(2 * GWEI * 21_000)
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_mid_flight_releases_everything() {
    let initial = parse_ether("1").unwrap();
    let node = Arc::new(NodeEl::new(vec![]).never_mining());
    let (persistent, budget) = setup(reliable(&node), initial);

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            cancel.cancel();
        }
    };
    let (result, ()) = tokio::join!(persistent.include(transfer(), &cancel), canceller);

    assert_eq!(result.unwrap_err(), IncludeError::Cancelled);
    assert_eq!(budget.balance(), initial);
    // Accepted at 0s and kept alive at 6s.
    assert_eq!(node.sent_nonces(), vec![START_NONCE; 2]);

    tokio::time::sleep(BLOCK_TIME * 10).await;
    assert_eq!(node.sent_nonces().len(), 2);
    assert_eq!(persistent.nonces().gap_count(), 1);
    assert_eq!(persistent.nonces().next(), START_NONCE);
}

#[tokio::test(start_paused = true)]
async fn test_receipt_lookup_failure_is_terminal() {
    let initial = parse_ether("1").unwrap();
    let node = Arc::new(
        NodeEl::new(vec![])
            .never_mining()
            .failing_lookups(ReceiptError::Other("boom".into())),
    );
    let (persistent, budget) = setup(reliable(&node), initial);

    let err = persistent
        .include(transfer(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, IncludeError::Receipt(ReceiptError::Other("boom".into())));
    assert_eq!(budget.balance(), initial);
    assert_eq!(persistent.nonces().gap_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resubmitted_nonce_too_low_is_renonced() {
    let initial = parse_ether("1").unwrap();
    let node = Arc::new(NodeEl::new(vec![
        SendError::NonceTooLow,
        SendError::TxPoolOverflow,
        SendError::NonceTooLow,
    ]));
    let (persistent, budget) = setup(reliable(&node), initial);

    let included = persistent
        .include(transfer(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(included.transaction.nonce(), START_NONCE + 2);
    assert_eq!(
        node.sent_nonces(),
        vec![START_NONCE, START_NONCE + 1, START_NONCE + 1, START_NONCE + 2]
    );
    assert_eq!(budget.balance(), initial - U256::from(GWEI * 21_000));
    assert_eq!(persistent.nonces().gap_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_receipt_wins_over_pending_submission() {
    let initial = parse_ether("1").unwrap();
    let node = Arc::new(NodeEl::new(vec![]).holding_accepted());
    let (persistent, budget) = setup(reliable(&node), initial);

    let included = persistent
        .include(transfer(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(included.transaction.nonce(), START_NONCE);
    assert_eq!(node.sent_nonces(), vec![START_NONCE]);
    assert_eq!(budget.balance(), initial - U256::from(GWEI * 21_000));
}
