//! Book Exchange Core
//!
//! Lending lifecycle and credit ledger for a community book exchange.
//! Members list physical books, earn credits for listing, and spend credits
//! to borrow from neighbours.
//!
//! # Architecture
//!
//! - **Account Store**: identity and balance per member
//! - **Credit Ledger**: sole writer of balances, append-only posting log
//! - **Book Catalog**: book records and the availability guard
//! - **Transaction Manager**: one explicit state machine per loan
//! - **Query Facade**: read-through dashboard projections
//!
//! Every state change is staged into one RocksDB write batch and committed
//! before in-memory records change.
//!
//! # Invariants
//!
//! - Conservation: Σ(deltas) == balance for every account, balance ≥ 0
//! - No double booking: at most one non-terminal transaction per book
//! - Availability: a book is Unavailable iff it has that transaction
//! - Forward only: transaction status never moves backwards

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod accounts;
pub mod catalog;
pub mod config;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod lifecycle;
pub mod metadata;
pub mod metrics;
pub mod query;
pub mod storage;
pub mod types;

// Re-exports
pub use catalog::BookFilter;
pub use config::{Config, ReturnConfirmation};
pub use error::{Error, Result};
pub use exchange::Exchange;
pub use metadata::{Isbn, LookupError, MetadataProvider};
pub use storage::Storage;
pub use types::{
    Action, Book, BookId, BookMetadata, BookStatus, Category, Condition, CreditReason, Listing,
    NewUser, Transaction, TransactionId, TransactionStatus, User, UserId,
};
