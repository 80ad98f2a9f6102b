//! Transaction inclusion with nonce management, resubmission and cost budgeting

mod cost;
mod monitor;
mod nonce;
mod oracle;
mod payload;
mod persistent;
mod resubmitter;
mod signer;

pub use cost::{OpCostOracle, TxBudget};
pub use monitor::Monitor;
pub use nonce::NonceManager;
pub use oracle::{flz_compress_len, CostParams, CostParamsSource, IsthmusCostOracle};
pub use payload::UnincludedTx;
pub use persistent::{IncludedTx, Persistent};
pub use resubmitter::{NoopObserver, Resubmitter, ResubmitterObserver};
pub use signer::{PkSigner, Signer};
