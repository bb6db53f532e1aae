//! Lending transaction lifecycle
//!
//! ```text
//! Requested --approve--> Approved --handover--> Completed --return--> Returned
//!     |                     |
//!     +------cancel---------+--------------------------------------> Cancelled
//! ```
//!
//! Every legal move is decided by [`next_status`]; the manager only applies
//! the effects that go with it.
//!
//! # Locking
//!
//! Entity locks are always taken in the order transaction, book, account.
//! Each operation stages every changed record into one batch and writes the
//! copies back only after the commit succeeds, so a failed step leaves the
//! transaction, the book and the balance as they were.

use crate::{
    accounts::AccountStore,
    catalog::BookCatalog,
    config::ReturnConfirmation,
    ledger::{CreditLedger, Posting},
    metrics::Metrics,
    storage::Storage,
    types::{
        Action, BookId, CreditReason, EntryReference, Transaction, TransactionId,
        TransactionStatus, UserId,
    },
    Error, Result,
};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Decide the status `action` by `actor` leads to
///
/// Authorization is checked before legality: a stranger gets an
/// authorization error even when the action would also be out of order.
pub fn next_status(
    transaction: &Transaction,
    actor: UserId,
    action: Action,
    policy: ReturnConfirmation,
) -> Result<TransactionStatus> {
    let is_owner = actor == transaction.owner;
    let is_borrower = actor == transaction.borrower;

    let not_owner = || Error::NotOwner {
        actor,
        transaction: transaction.id,
    };
    let not_borrower = || Error::NotBorrower {
        actor,
        transaction: transaction.id,
    };
    let not_participant = || Error::NotParticipant {
        actor,
        transaction: transaction.id,
    };

    match action {
        Action::Approve | Action::Handover if !is_owner => return Err(not_owner()),
        Action::Return => match policy {
            ReturnConfirmation::EitherParty if !is_owner && !is_borrower => {
                return Err(not_participant())
            }
            ReturnConfirmation::OwnerOnly if !is_owner => {
                return Err(if is_borrower { not_owner() } else { not_participant() })
            }
            ReturnConfirmation::BorrowerOnly if !is_borrower => {
                return Err(if is_owner { not_borrower() } else { not_participant() })
            }
            _ => {}
        },
        Action::Cancel if !is_owner && !is_borrower => return Err(not_participant()),
        _ => {}
    }

    match (transaction.status, action) {
        (TransactionStatus::Requested, Action::Approve) => Ok(TransactionStatus::Approved),
        (TransactionStatus::Approved, Action::Handover) => Ok(TransactionStatus::Completed),
        (TransactionStatus::Completed, Action::Return) => Ok(TransactionStatus::Returned),
        (TransactionStatus::Requested | TransactionStatus::Approved, Action::Cancel) => {
            Ok(TransactionStatus::Cancelled)
        }
        (from, action) => Err(Error::InvalidTransition { from, action }),
    }
}

/// Transaction manager
#[derive(Debug)]
pub struct TransactionManager {
    transactions: DashMap<TransactionId, Arc<Mutex<Transaction>>>,
    accounts: Arc<AccountStore>,
    catalog: Arc<BookCatalog>,
    ledger: Arc<CreditLedger>,
    storage: Arc<Storage>,
    metrics: Metrics,
    borrow_cost: i64,
    return_confirmation: ReturnConfirmation,
}

impl TransactionManager {
    pub(crate) fn new(
        accounts: Arc<AccountStore>,
        catalog: Arc<BookCatalog>,
        ledger: Arc<CreditLedger>,
        storage: Arc<Storage>,
        metrics: Metrics,
        borrow_cost: i64,
        return_confirmation: ReturnConfirmation,
    ) -> Self {
        Self {
            transactions: DashMap::new(),
            accounts,
            catalog,
            ledger,
            storage,
            metrics,
            borrow_cost,
            return_confirmation,
        }
    }

    /// Open a transaction: debit the borrower, reserve the book
    ///
    /// Checks, in order: book and borrower exist, borrower is not the owner,
    /// book is Available, borrower can pay. The first failure wins and
    /// nothing is written.
    pub fn request(&self, book_id: BookId, borrower: UserId) -> Result<Transaction> {
        let book_handle = self.catalog.handle(book_id)?;
        let account_handle = self.accounts.handle(borrower)?;

        let mut book_guard = book_handle.lock();
        if book_guard.owner == borrower {
            return Err(Error::OwnBook(book_id));
        }

        let mut book = book_guard.clone();
        self.catalog.mark_unavailable(&mut book).map_err(|err| match err {
            Error::AlreadyUnavailable(id) => Error::BookUnavailable(id),
            other => other,
        })?;

        let mut account_guard = account_handle.lock();
        let mut account = account_guard.clone();

        let now = Utc::now();
        let transaction = Transaction::open(&book, borrower, self.borrow_cost, now);

        let mut batch = self.storage.batch();
        let entry = self.ledger.post(
            &mut account,
            Posting::Debit(self.borrow_cost),
            CreditReason::BorrowCost,
            EntryReference::Transaction(transaction.id),
            &mut batch,
        )?;
        batch.put_user(&account)?;
        batch.put_book(&book)?;
        batch.put_transaction(&transaction)?;
        self.storage.commit(batch)?;

        *account_guard = account;
        *book_guard = book;
        self.transactions.insert(
            transaction.id,
            Arc::new(Mutex::new(transaction.clone())),
        );

        self.ledger.committed(&[&entry]);
        self.metrics.record_transition("request");
        tracing::info!(
            transaction_id = %transaction.id,
            book_id = %book_id,
            user_id = %borrower,
            "Borrow requested"
        );

        Ok(transaction)
    }

    /// Owner consents to the loan
    pub fn approve(&self, id: TransactionId, actor: UserId) -> Result<Transaction> {
        self.apply(id, actor, Action::Approve)
    }

    /// Owner hands the book over
    pub fn handover(&self, id: TransactionId, actor: UserId) -> Result<Transaction> {
        self.apply(id, actor, Action::Handover)
    }

    /// Confirm the book came back; releases the book
    pub fn confirm_return(&self, id: TransactionId, actor: UserId) -> Result<Transaction> {
        self.apply(id, actor, Action::Return)
    }

    /// Abandon before handover; releases the book and refunds the borrower
    pub fn cancel(&self, id: TransactionId, actor: UserId) -> Result<Transaction> {
        self.apply(id, actor, Action::Cancel)
    }

    fn apply(&self, id: TransactionId, actor: UserId, action: Action) -> Result<Transaction> {
        let handle = self.handle(id)?;
        let mut guard = handle.lock();

        let next = next_status(&guard, actor, action, self.return_confirmation)?;
        let mut transaction = guard.clone();
        transaction.advance(next, actor, Utc::now());

        match next {
            TransactionStatus::Returned | TransactionStatus::Cancelled => {
                self.settle(&transaction)?;
            }
            _ => {
                let mut batch = self.storage.batch();
                batch.put_transaction(&transaction)?;
                self.storage.commit(batch)?;
            }
        }

        *guard = transaction.clone();

        self.metrics.record_transition(action.label());
        tracing::info!(
            transaction_id = %id,
            user_id = %actor,
            action = action.label(),
            status = %next,
            "Transaction advanced"
        );

        Ok(transaction)
    }

    /// Commit a terminal transition together with the book release and,
    /// for a cancellation, the refund. Caller holds the transaction lock.
    fn settle(&self, transaction: &Transaction) -> Result<()> {
        let book_handle = self.catalog.handle(transaction.book)?;
        let mut book_guard = book_handle.lock();
        let mut book = book_guard.clone();
        self.catalog.mark_available(&mut book);

        let mut batch = self.storage.batch();
        batch.put_book(&book)?;
        batch.put_transaction(transaction)?;

        if transaction.status == TransactionStatus::Cancelled {
            let account_handle = self.accounts.handle(transaction.borrower)?;
            let mut account_guard = account_handle.lock();
            let mut account = account_guard.clone();

            let entry = self.ledger.post(
                &mut account,
                Posting::Credit(transaction.cost),
                CreditReason::RefundOnCancel,
                EntryReference::Transaction(transaction.id),
                &mut batch,
            )?;
            batch.put_user(&account)?;
            self.storage.commit(batch)?;

            *account_guard = account;
            *book_guard = book;
            self.ledger.committed(&[&entry]);
        } else {
            self.storage.commit(batch)?;
            *book_guard = book;
        }

        Ok(())
    }

    /// Get transaction by ID
    pub fn get(&self, id: TransactionId) -> Result<Transaction> {
        let handle = self.handle(id)?;
        let transaction = handle.lock().clone();
        Ok(transaction)
    }

    /// Transactions matching `keep`, newest first
    pub fn select<F>(&self, keep: F) -> Vec<Transaction>
    where
        F: Fn(&Transaction) -> bool,
    {
        let mut handles: Vec<(TransactionId, Arc<Mutex<Transaction>>)> = self
            .transactions
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        handles.sort_by(|a, b| b.0.cmp(&a.0));

        handles
            .into_iter()
            .filter_map(|(_, handle)| {
                let transaction = handle.lock();
                keep(&transaction).then(|| transaction.clone())
            })
            .collect()
    }

    /// Non-terminal transaction holding `book`, if any
    pub fn active_for_book(&self, book: BookId) -> Option<Transaction> {
        self.select(|t| t.book == book && t.is_active())
            .into_iter()
            .next()
    }

    /// Number of transactions ever opened
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether no transaction was ever opened
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    fn handle(&self, id: TransactionId) -> Result<Arc<Mutex<Transaction>>> {
        self.transactions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found("Transaction", id))
    }

    pub(crate) fn restore(&self, transaction: Transaction) {
        self.transactions
            .insert(transaction.id, Arc::new(Mutex::new(transaction)));
    }
}
