//! Read-side projections for dashboards
//!
//! Always read-through: every call looks at the live records.

use crate::{
    accounts::AccountStore,
    catalog::{BookCatalog, BookFilter},
    lifecycle::TransactionManager,
    types::{Book, ContactCard, Transaction, TransactionDetails, TransactionId, TransactionStatus, UserId},
    Error, Result,
};
use std::sync::Arc;

/// Query facade
#[derive(Debug, Clone)]
pub struct QueryFacade {
    accounts: Arc<AccountStore>,
    catalog: Arc<BookCatalog>,
    transactions: Arc<TransactionManager>,
}

impl QueryFacade {
    pub(crate) fn new(
        accounts: Arc<AccountStore>,
        catalog: Arc<BookCatalog>,
        transactions: Arc<TransactionManager>,
    ) -> Self {
        Self {
            accounts,
            catalog,
            transactions,
        }
    }

    /// Available books for the borrowing view, newest first
    pub fn browse(&self, filter: BookFilter) -> Vec<Book> {
        self.catalog.find(filter).iter().collect()
    }

    /// Open requests on books `owner` lent out
    pub fn incoming_requests(&self, owner: UserId) -> Result<Vec<TransactionDetails>> {
        self.accounts.handle(owner)?;
        self.transactions
            .select(|t| t.owner == owner && t.is_active())
            .into_iter()
            .map(|t| self.join(t))
            .collect()
    }

    /// Open requests made by `borrower`
    pub fn outgoing_requests(&self, borrower: UserId) -> Result<Vec<TransactionDetails>> {
        self.accounts.handle(borrower)?;
        self.transactions
            .select(|t| t.borrower == borrower && t.is_active())
            .into_iter()
            .map(|t| self.join(t))
            .collect()
    }

    /// Books listed by `owner`, newest first, whatever their status
    pub fn my_books(&self, owner: UserId) -> Result<Vec<Book>> {
        self.accounts.handle(owner)?;
        Ok(self.catalog.owned_by(owner))
    }

    /// Every transaction `actor` took part in, newest first
    pub fn history(&self, actor: UserId) -> Result<Vec<Transaction>> {
        self.accounts.handle(actor)?;
        Ok(self.transactions.select(|t| t.involves(actor)))
    }

    /// One transaction joined with its book and participants
    pub fn details(&self, id: TransactionId) -> Result<TransactionDetails> {
        let transaction = self.transactions.get(id)?;
        self.join(transaction)
    }

    /// Counterpart contact details for `viewer`
    ///
    /// `Ok(None)` while the transaction is Requested or already terminal;
    /// the handle is only shared between approval and return.
    pub fn contact_for(&self, id: TransactionId, viewer: UserId) -> Result<Option<ContactCard>> {
        let transaction = self.transactions.get(id)?;

        let counterpart = if viewer == transaction.borrower {
            transaction.owner
        } else if viewer == transaction.owner {
            transaction.borrower
        } else {
            return Err(Error::NotParticipant {
                actor: viewer,
                transaction: id,
            });
        };

        match transaction.status() {
            TransactionStatus::Approved | TransactionStatus::Completed => {
                let user = self.accounts.get(counterpart)?;
                Ok(Some(ContactCard {
                    user: user.id,
                    display_name: user.display_name,
                    unit: user.unit,
                    contact_handle: user.contact_handle,
                }))
            }
            _ => Ok(None),
        }
    }

    fn join(&self, transaction: Transaction) -> Result<TransactionDetails> {
        let book = self.catalog.get(transaction.book)?;
        let borrower = self.accounts.get(transaction.borrower)?.public_profile();
        let owner = self.accounts.get(transaction.owner)?.public_profile();
        Ok(TransactionDetails {
            transaction,
            book,
            borrower,
            owner,
        })
    }
}
