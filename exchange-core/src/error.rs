//! Error types for the exchange

use crate::types::{Action, BookId, TransactionId, TransactionStatus, UserId};
use thiserror::Error;

/// Result type for exchange operations
pub type Result<T> = std::result::Result<T, Error>;

/// Exchange errors
///
/// Guard violations leave every account, book and transaction exactly as
/// they were before the call.
#[derive(Error, Debug)]
pub enum Error {
    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Requested ID
        id: String,
    },

    /// Email already registered
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    /// Ledger amount must be strictly positive
    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(i64),

    /// Debit would take the balance below zero
    #[error("Insufficient credits for {account}: required {required}, available {available}")]
    InsufficientCredits {
        /// Account
        account: UserId,
        /// Credits needed
        required: i64,
        /// Credits held
        available: i64,
    },

    /// Requested book is not open for borrowing
    #[error("Book unavailable: {0}")]
    BookUnavailable(BookId),

    /// Book already reserved by an active transaction
    #[error("Book already unavailable: {0}")]
    AlreadyUnavailable(BookId),

    /// Borrower tried to request their own book
    #[error("Cannot request own book: {0}")]
    OwnBook(BookId),

    /// Action restricted to the owner
    #[error("User {actor} is not the owner in transaction {transaction}")]
    NotOwner {
        /// Acting user
        actor: UserId,
        /// Transaction
        transaction: TransactionId,
    },

    /// Action restricted to the borrower
    #[error("User {actor} is not the borrower in transaction {transaction}")]
    NotBorrower {
        /// Acting user
        actor: UserId,
        /// Transaction
        transaction: TransactionId,
    },

    /// Actor is neither borrower nor owner
    #[error("User {actor} is not a party to transaction {transaction}")]
    NotParticipant {
        /// Acting user
        actor: UserId,
        /// Transaction
        transaction: TransactionId,
    },

    /// Action not legal from the current status
    #[error("Invalid transition: cannot {action} from {from}")]
    InvalidTransition {
        /// Current status
        from: TransactionStatus,
        /// Attempted action
        action: Action,
    },

    /// ISBN failed normalisation
    #[error("Invalid ISBN: {0}")]
    InvalidIsbn(String),

    /// Metadata lookup failed; nothing was listed
    #[error("Book metadata unavailable for ISBN {isbn}: {reason}")]
    BookMetadataUnavailable {
        /// Normalised ISBN
        isbn: String,
        /// Provider failure summary
        reason: String,
    },

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Invariant violation (balance conservation, double booking, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Creates a not found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short label for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::DuplicateEmail(_) => "duplicate_email",
            Error::InvalidAmount(_) => "invalid_amount",
            Error::InsufficientCredits { .. } => "insufficient_credits",
            Error::BookUnavailable(_) => "book_unavailable",
            Error::AlreadyUnavailable(_) => "already_unavailable",
            Error::OwnBook(_) => "own_book",
            Error::NotOwner { .. } => "not_owner",
            Error::NotBorrower { .. } => "not_borrower",
            Error::NotParticipant { .. } => "not_participant",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::InvalidIsbn(_) => "invalid_isbn",
            Error::BookMetadataUnavailable { .. } => "metadata_unavailable",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Metrics(_) => "metrics",
        }
    }

    /// Whether a business rule refused the call, as opposed to the
    /// infrastructure failing under it
    pub fn is_guard(&self) -> bool {
        !matches!(
            self,
            Error::Storage(_)
                | Error::Serialization(_)
                | Error::InvariantViolation(_)
                | Error::Config(_)
                | Error::Io(_)
                | Error::Metrics(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
