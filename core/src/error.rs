use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger unreachable: {0}")]
    Connectivity(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid chain address: '{0}'")]
    InvalidAddress(String),

    #[error("Insufficient balance for gas fees. Current balance: {balance_eth:.6} ETH")]
    InsufficientFunds { balance_eth: f64 },

    #[error("Gas estimation failed: {0}")]
    EstimationFailure(String),

    #[error("Complaint {reference_no} is not owned by {requester}")]
    OwnershipMismatch {
        reference_no: String,
        requester: String,
    },

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Classifier unavailable")]
    ClassifierUnavailable,

    #[error("Label '{0}' is not in the classifier's label set")]
    UnknownLabel(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Transaction {tx_hash} not mined within {timeout_secs}s")]
    ReceiptTimeout { tx_hash: String, timeout_secs: u64 },

    #[error("Transaction {0} reverted")]
    Reverted(String),

    #[error("Malformed ledger response: {0}")]
    Decode(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    /// True for failures caused by the ledger being unreachable rather than
    /// by the data or the contract.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
