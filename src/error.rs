//! Error types for transaction inclusion

use alloy::primitives::U256;
use thiserror::Error;

/// Conditions reported by a node when a transaction is submitted.
///
/// The set is closed: every message the RPC boundary recognizes maps to exactly
/// one variant, and anything else lands in [`SendError::Unrecognized`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("nonce too low")]
    NonceTooLow,

    #[error("nonce too high")]
    NonceTooHigh,

    #[error("nonce has max value")]
    NonceMax,

    #[error("transaction underpriced")]
    Underpriced,

    #[error("replacement transaction underpriced")]
    ReplaceUnderpriced,

    #[error("already known")]
    AlreadyKnown,

    #[error("txpool is full")]
    TxPoolOverflow,

    #[error("account limit exceeded")]
    AccountLimitExceeded,

    #[error("address already reserved")]
    AuthorityReserved,

    #[error("in-flight transaction limit reached for delegated accounts")]
    InflightTxLimitReached,

    #[error("future transaction tries to replace pending")]
    FutureReplacePending,

    #[error("oversized data")]
    OversizedData,

    #[error("max initcode size exceeded")]
    MaxInitCodeSizeExceeded,

    #[error("invalid sender")]
    InvalidSender,

    #[error("sender not an eoa")]
    SenderNoEoa,

    #[error("insufficient funds for gas * price + value")]
    InsufficientFunds,

    #[error("insufficient funds for transfer")]
    InsufficientFundsForTransfer,

    #[error("gas uint64 overflow")]
    GasUintOverflow,

    #[error("intrinsic gas too low")]
    IntrinsicGas,

    #[error("insufficient gas for floor data gas cost")]
    FloorDataGas,

    #[error("exceeds block gas limit")]
    GasLimit,

    #[error("gas limit reached")]
    GasLimitReached,

    #[error("transaction type not supported")]
    TxTypeNotSupported,

    #[error("max priority fee per gas higher than max fee per gas")]
    TipAboveFeeCap,

    #[error("max priority fee per gas higher than 2^256-1")]
    TipVeryHigh,

    #[error("max fee per gas higher than 2^256-1")]
    FeeCapVeryHigh,

    #[error("max fee per gas less than block base fee")]
    FeeCapTooLow,

    #[error("negative value")]
    NegativeValue,

    #[error("max fee per blob gas less than block blob gas fee")]
    BlobFeeCapTooLow,

    #[error("blob transaction missing blob hashes")]
    MissingBlobHashes,

    #[error("blob transaction has too many blobs")]
    TooManyBlobs,

    #[error("blob transaction of type create")]
    BlobTxCreate,

    #[error("EIP-7702 transaction with empty auth list")]
    EmptyAuthList,

    #[error("EIP-7702 transaction cannot be used to create contract")]
    SetCodeTxCreate,

    #[error("transaction filtered out")]
    FilteredOut,

    #[error("submission cancelled")]
    Cancelled,

    #[error("{0}")]
    Unrecognized(String),
}

/// Node message texts, pinned to geth/op-geth. Longer messages that contain a
/// shorter one must come first.
const SEND_ERROR_MESSAGES: &[(&str, SendError)] = &[
    ("replacement transaction underpriced", SendError::ReplaceUnderpriced),
    ("transaction underpriced", SendError::Underpriced),
    ("nonce too low", SendError::NonceTooLow),
    ("nonce too high", SendError::NonceTooHigh),
    ("nonce has max value", SendError::NonceMax),
    ("already known", SendError::AlreadyKnown),
    ("txpool is full", SendError::TxPoolOverflow),
    ("account limit exceeded", SendError::AccountLimitExceeded),
    ("address already reserved", SendError::AuthorityReserved),
    (
        "in-flight transaction limit reached for delegated accounts",
        SendError::InflightTxLimitReached,
    ),
    (
        "future transaction tries to replace pending",
        SendError::FutureReplacePending,
    ),
    ("oversized data", SendError::OversizedData),
    ("max initcode size exceeded", SendError::MaxInitCodeSizeExceeded),
    ("invalid sender", SendError::InvalidSender),
    ("sender not an eoa", SendError::SenderNoEoa),
    (
        "insufficient funds for gas * price + value",
        SendError::InsufficientFunds,
    ),
    (
        "insufficient funds for transfer",
        SendError::InsufficientFundsForTransfer,
    ),
    ("gas uint64 overflow", SendError::GasUintOverflow),
    ("intrinsic gas too low", SendError::IntrinsicGas),
    (
        "insufficient gas for floor data gas cost",
        SendError::FloorDataGas,
    ),
    ("exceeds block gas limit", SendError::GasLimit),
    ("gas limit reached", SendError::GasLimitReached),
    ("transaction type not supported", SendError::TxTypeNotSupported),
    (
        "max priority fee per gas higher than max fee per gas",
        SendError::TipAboveFeeCap,
    ),
    (
        "max priority fee per gas higher than 2^256-1",
        SendError::TipVeryHigh,
    ),
    ("max fee per gas higher than 2^256-1", SendError::FeeCapVeryHigh),
    ("max fee per gas less than block base fee", SendError::FeeCapTooLow),
    ("negative value", SendError::NegativeValue),
    (
        "max fee per blob gas less than block blob gas fee",
        SendError::BlobFeeCapTooLow,
    ),
    ("blob transaction missing blob hashes", SendError::MissingBlobHashes),
    ("blob transaction has too many blobs", SendError::TooManyBlobs),
    ("blob transaction of type create", SendError::BlobTxCreate),
    (
        "eip-7702 transaction with empty auth list",
        SendError::EmptyAuthList,
    ),
    (
        "eip-7702 transaction cannot be used to create contract",
        SendError::SetCodeTxCreate,
    ),
    ("transaction filtered out", SendError::FilteredOut),
];

impl SendError {
    /// Map a node error message onto the closed taxonomy.
    pub fn from_message(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        SEND_ERROR_MESSAGES
            .iter()
            .find(|(text, _)| lowered.contains(text))
            .map(|(_, kind)| kind.clone())
            .unwrap_or_else(|| SendError::Unrecognized(message.to_string()))
    }

    /// Resubmitting the same transaction cannot succeed.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SendError::AlreadyKnown
                | SendError::TxPoolOverflow
                | SendError::AccountLimitExceeded
                | SendError::AuthorityReserved
                | SendError::InflightTxLimitReached
                | SendError::FutureReplacePending
                | SendError::Unrecognized(_)
        )
    }

    /// The fee offered was refused.
    pub fn is_underpriced(&self) -> bool {
        matches!(self, SendError::Underpriced | SendError::ReplaceUnderpriced)
    }

    /// Short stable name, suitable for metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            SendError::NonceTooLow => "nonce_too_low",
            SendError::NonceTooHigh => "nonce_too_high",
            SendError::NonceMax => "nonce_max",
            SendError::Underpriced => "underpriced",
            SendError::ReplaceUnderpriced => "replace_underpriced",
            SendError::AlreadyKnown => "already_known",
            SendError::TxPoolOverflow => "txpool_overflow",
            SendError::AccountLimitExceeded => "account_limit_exceeded",
            SendError::AuthorityReserved => "authority_reserved",
            SendError::InflightTxLimitReached => "inflight_limit_reached",
            SendError::FutureReplacePending => "future_replace_pending",
            SendError::OversizedData => "oversized_data",
            SendError::MaxInitCodeSizeExceeded => "max_initcode_size_exceeded",
            SendError::InvalidSender => "invalid_sender",
            SendError::SenderNoEoa => "sender_no_eoa",
            SendError::InsufficientFunds => "insufficient_funds",
            SendError::InsufficientFundsForTransfer => "insufficient_funds_for_transfer",
            SendError::GasUintOverflow => "gas_uint_overflow",
            SendError::IntrinsicGas => "intrinsic_gas",
            SendError::FloorDataGas => "floor_data_gas",
            SendError::GasLimit => "gas_limit",
            SendError::GasLimitReached => "gas_limit_reached",
            SendError::TxTypeNotSupported => "tx_type_not_supported",
            SendError::TipAboveFeeCap => "tip_above_fee_cap",
            SendError::TipVeryHigh => "tip_very_high",
            SendError::FeeCapVeryHigh => "fee_cap_very_high",
            SendError::FeeCapTooLow => "fee_cap_too_low",
            SendError::NegativeValue => "negative_value",
            SendError::BlobFeeCapTooLow => "blob_fee_cap_too_low",
            SendError::MissingBlobHashes => "missing_blob_hashes",
            SendError::TooManyBlobs => "too_many_blobs",
            SendError::BlobTxCreate => "blob_tx_create",
            SendError::EmptyAuthList => "empty_auth_list",
            SendError::SetCodeTxCreate => "set_code_tx_create",
            SendError::FilteredOut => "filtered_out",
            SendError::Cancelled => "cancelled",
            SendError::Unrecognized(_) => "unrecognized",
        }
    }
}

/// Conditions reported when looking up a receipt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiptError {
    #[error("receipt not found")]
    NotFound,

    #[error("transaction indexing is in progress")]
    IndexingInProgress,

    #[error("receipt lookup cancelled")]
    Cancelled,

    #[error("receipt lookup failed: {0}")]
    Other(String),
}

impl ReceiptError {
    /// The receipt may show up if asked again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReceiptError::NotFound | ReceiptError::IndexingInProgress)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BudgetError {
    #[error("Overdraft: requested {requested} wei, {remaining} wei remaining")]
    Overdraft { requested: U256, remaining: U256 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Failed to fetch cost params: {0}")]
    Fetch(String),
}

/// Terminal outcome of an inclusion attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IncludeError {
    #[error("Sign transaction: {0}")]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error("Send transaction: {0}")]
    Send(SendError),

    #[error("Wait for receipt: {0}")]
    Receipt(ReceiptError),

    #[error("Inclusion cancelled")]
    Cancelled,
}

impl From<SendError> for IncludeError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Cancelled => IncludeError::Cancelled,
            other => IncludeError::Send(other),
        }
    }
}

impl From<ReceiptError> for IncludeError {
    fn from(err: ReceiptError) -> Self {
        match err {
            ReceiptError::Cancelled => IncludeError::Cancelled,
            other => IncludeError::Receipt(other),
        }
    }
}

impl IncludeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IncludeError::Cancelled)
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            IncludeError::Budget(_)
                | IncludeError::Signer(_)
                | IncludeError::Send(
                    SendError::InsufficientFunds | SendError::InsufficientFundsForTransfer
                )
        )
    }

    /// Short stable name, suitable for metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            IncludeError::Signer(_) => "signer",
            IncludeError::Budget(_) => "overdraft",
            IncludeError::Send(err) => err.label(),
            IncludeError::Receipt(_) => "receipt",
            IncludeError::Cancelled => "cancelled",
        }
    }
}

/// Result type for inclusion operations
pub type IncludeResult<T> = Result<T, IncludeError>;
