//! Unsigned transaction payloads accepted by the backend

use alloy::consensus::{TxEip1559, TxEip2930, TxEip4844Variant, TxEip7702, TxLegacy};

/// A transaction that has not been included yet.
///
/// Only the nonce is ever rewritten by the inclusion engine; every other field
/// belongs to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum UnincludedTx {
    Legacy(TxLegacy),
    AccessList(TxEip2930),
    DynamicFee(TxEip1559),
    Blob(TxEip4844Variant),
    SetCode(TxEip7702),
}

impl UnincludedTx {
    pub fn nonce(&self) -> u64 {
        match self {
            UnincludedTx::Legacy(tx) => tx.nonce,
            UnincludedTx::AccessList(tx) => tx.nonce,
            UnincludedTx::DynamicFee(tx) => tx.nonce,
            UnincludedTx::Blob(TxEip4844Variant::TxEip4844(tx)) => tx.nonce,
            UnincludedTx::Blob(TxEip4844Variant::TxEip4844WithSidecar(tx)) => tx.tx.nonce,
            UnincludedTx::SetCode(tx) => tx.nonce,
        }
    }

    pub fn set_nonce(&mut self, nonce: u64) {
        match self {
            UnincludedTx::Legacy(tx) => tx.nonce = nonce,
            UnincludedTx::AccessList(tx) => tx.nonce = nonce,
            UnincludedTx::DynamicFee(tx) => tx.nonce = nonce,
            UnincludedTx::Blob(TxEip4844Variant::TxEip4844(tx)) => tx.nonce = nonce,
            UnincludedTx::Blob(TxEip4844Variant::TxEip4844WithSidecar(tx)) => {
                tx.tx.nonce = nonce
            }
            UnincludedTx::SetCode(tx) => tx.nonce = nonce,
        }
    }

    /// Builder-style variant of [`UnincludedTx::set_nonce`].
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.set_nonce(nonce);
        self
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UnincludedTx::Legacy(_) => "legacy",
            UnincludedTx::AccessList(_) => "access_list",
            UnincludedTx::DynamicFee(_) => "dynamic_fee",
            UnincludedTx::Blob(_) => "blob",
            UnincludedTx::SetCode(_) => "set_code",
        }
    }
}

impl From<TxLegacy> for UnincludedTx {
    fn from(tx: TxLegacy) -> Self {
        UnincludedTx::Legacy(tx)
    }
}

impl From<TxEip2930> for UnincludedTx {
    fn from(tx: TxEip2930) -> Self {
        UnincludedTx::AccessList(tx)
    }
}

impl From<TxEip1559> for UnincludedTx {
    fn from(tx: TxEip1559) -> Self {
        UnincludedTx::DynamicFee(tx)
    }
}

impl From<TxEip4844Variant> for UnincludedTx {
    fn from(tx: TxEip4844Variant) -> Self {
        UnincludedTx::Blob(tx)
    }
}

impl From<TxEip7702> for UnincludedTx {
    fn from(tx: TxEip7702) -> Self {
        UnincludedTx::SetCode(tx)
    }
}
