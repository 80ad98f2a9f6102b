//! txinclude - reliable transaction inclusion for EVM chains
//!
//! Signs a transaction, keeps it submitted until it lands, watches for its
//! receipt and accounts for what it costs:
//! - `tx::Persistent` drives one transaction to inclusion
//! - `tx::TxBudget` charges worst-case costs against a shared `accounting::Budget`
//! - `chain::ReliableEl` resubmits and polls over a raw JSON-RPC client

pub mod accounting;
pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod tx;

pub use accounting::Budget;
pub use chain::{El, Receipt, ReceiptGetter, ReliableEl, RpcEl, Sender};
pub use error::{IncludeError, IncludeResult};
pub use tx::{IncludedTx, Persistent, PkSigner, TxBudget, UnincludedTx};
