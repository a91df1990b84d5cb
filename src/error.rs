use crate::domain::order::{ActorRole, OrderStatus};
use miette::Diagnostic;
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// Errors produced by the order state machine and the wallet ledger.
///
/// Every variant except [`LedgerError::StorageError`] is a business-rule
/// rejection: it is raised before any mutation and must not be retried.
#[derive(Error, Diagnostic, Debug)]
pub enum LedgerError {
    #[error("cannot move order from {from} to {to}")]
    #[diagnostic(code(orderledger::invalid_transition))]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{role} is not permitted to {action}")]
    #[diagnostic(code(orderledger::forbidden))]
    Forbidden { role: ActorRole, action: String },

    #[error("validation failed: {0}")]
    #[diagnostic(code(orderledger::validation))]
    ValidationError(String),

    #[error("order is already cancelled")]
    #[diagnostic(code(orderledger::already_cancelled))]
    AlreadyCancelled,

    #[error("order is already {0} and can no longer change")]
    #[diagnostic(code(orderledger::already_terminal))]
    AlreadyTerminal(OrderStatus),

    #[error("{0} not found")]
    #[diagnostic(code(orderledger::not_found))]
    NotFound(String),

    #[error("insufficient balance: requested {requested}, available {available}")]
    #[diagnostic(code(orderledger::insufficient_balance))]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("withdrawal of {requested} is below the minimum of {minimum}")]
    #[diagnostic(
        code(orderledger::below_minimum),
        help("withdraw at least the platform minimum")
    )]
    BelowMinimum { requested: Decimal, minimum: Decimal },

    #[error("storage error: {0}")]
    #[diagnostic(code(orderledger::storage), help("the operation can be retried"))]
    StorageError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    pub fn storage(message: impl Into<String>) -> Self {
        LedgerError::StorageError(Box::new(std::io::Error::other(message.into())))
    }

    /// Only storage failures are worth retrying; business rules will reject again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StorageError(_))
    }

    /// Message safe to show to the caller. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            LedgerError::StorageError(_) => "temporary failure, please try again".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::StorageError(Box::new(err))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::StorageError(Box::new(err))
    }
}

impl From<csv::Error> for LedgerError {
    fn from(err: csv::Error) -> Self {
        LedgerError::StorageError(Box::new(err))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        LedgerError::StorageError(Box::new(err))
    }
}
