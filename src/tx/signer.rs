//! Transaction signing for a single key

use super::payload::UnincludedTx;
use crate::error::SignerError;

use alloy::consensus::{SignableTransaction, Signed, TxEnvelope};
use alloy::primitives::{Address, ChainId};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;

/// Turns an unsigned payload into a signed envelope.
///
/// Signing must be deterministic for identical input.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    async fn sign(&self, tx: UnincludedTx) -> Result<TxEnvelope, SignerError>;
}

/// Signs with an in-memory private key for one chain.
#[derive(Clone)]
pub struct PkSigner {
    key: PrivateKeySigner,
    chain_id: ChainId,
}

impl PkSigner {
    pub fn new(key: PrivateKeySigner, chain_id: ChainId) -> Self {
        Self { key, chain_id }
    }

    /// Parse a hex-encoded private key
    pub fn from_hex(key: &str, chain_id: ChainId) -> Result<Self, SignerError> {
        let key = key
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self::new(key, chain_id))
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn sign_inner<T: SignableTransaction<alloy::primitives::Signature>>(
        &self,
        mut tx: T,
    ) -> Result<Signed<T>, SignerError> {
        tx.set_chain_id(self.chain_id);
        let signature = self
            .key
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(tx.into_signed(signature))
    }
}

#[async_trait]
impl Signer for PkSigner {
    fn address(&self) -> Address {
        self.key.address()
    }

    async fn sign(&self, tx: UnincludedTx) -> Result<TxEnvelope, SignerError> {
        let envelope = match tx {
            UnincludedTx::Legacy(tx) => TxEnvelope::Legacy(self.sign_inner(tx)?),
            UnincludedTx::AccessList(tx) => TxEnvelope::Eip2930(self.sign_inner(tx)?),
            UnincludedTx::DynamicFee(tx) => TxEnvelope::Eip1559(self.sign_inner(tx)?),
            UnincludedTx::Blob(tx) => TxEnvelope::Eip4844(self.sign_inner(tx)?),
            UnincludedTx::SetCode(tx) => TxEnvelope::Eip7702(self.sign_inner(tx)?),
        };
        Ok(envelope)
    }
}
