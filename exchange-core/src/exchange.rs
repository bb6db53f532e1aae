//! Exchange orchestration layer
//!
//! Ties storage, the account store, the ledger, the catalog and the
//! transaction manager into the inbound API used by a service front end.
//!
//! # Example
//!
//! ```no_run
//! use exchange_core::{metadata::StaticMetadataProvider, Config, Exchange, NewUser};
//! use std::sync::Arc;
//!
//! fn main() -> exchange_core::Result<()> {
//!     let exchange = Exchange::open(Config::default(), Arc::new(StaticMetadataProvider::new()))?;
//!
//!     let reader = exchange.signup(NewUser {
//!         email: "reader@example.com".to_string(),
//!         display_name: "Reader".to_string(),
//!         unit: "3F".to_string(),
//!         contact_handle: "+15550123".to_string(),
//!     })?;
//!     assert_eq!(reader.credits(), 3);
//!
//!     exchange.shutdown()
//! }
//! ```

use crate::{
    accounts::AccountStore,
    catalog::BookCatalog,
    ledger::{self, CreditLedger, Posting},
    lifecycle::TransactionManager,
    metadata::{Isbn, MetadataProvider},
    metrics::Metrics,
    query::QueryFacade,
    storage::{Snapshot, Storage},
    types::{
        Book, BookId, BookMetadata, BookStatus, Category, Condition, ContactCard, CreditReason,
        EntryReference, LedgerEntry, Listing, NewUser, Transaction, TransactionId, User, UserId,
    },
    Config, Error, Result,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Book exchange
pub struct Exchange {
    config: Config,
    storage: Arc<Storage>,
    accounts: Arc<AccountStore>,
    ledger: Arc<CreditLedger>,
    catalog: Arc<BookCatalog>,
    transactions: Arc<TransactionManager>,
    queries: QueryFacade,
    metadata: Arc<dyn MetadataProvider>,
    metrics: Metrics,
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("service", &self.config.service_name)
            .field("metadata", &self.metadata.name())
            .field("users", &self.accounts.len())
            .field("books", &self.catalog.len())
            .field("transactions", &self.transactions.len())
            .finish()
    }
}

impl Exchange {
    /// Open the exchange, replaying and checking everything on disk
    pub fn open(config: Config, metadata: Arc<dyn MetadataProvider>) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new()?;

        let snapshot = storage.load()?;
        check_snapshot(&snapshot)?;

        let next_sequence = snapshot
            .entries
            .iter()
            .map(|entry| entry.sequence)
            .max()
            .map_or(1, |last| last + 1);

        let accounts = Arc::new(AccountStore::new(Arc::clone(&storage)));
        for user in snapshot.users {
            accounts.restore(user)?;
        }

        let catalog = Arc::new(BookCatalog::new(Arc::clone(&storage)));
        for book in snapshot.books {
            catalog.restore(book);
        }

        let ledger = Arc::new(CreditLedger::new(
            Arc::clone(&accounts),
            Arc::clone(&storage),
            metrics.clone(),
            next_sequence,
        ));

        let transactions = Arc::new(TransactionManager::new(
            Arc::clone(&accounts),
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            Arc::clone(&storage),
            metrics.clone(),
            config.tariffs.borrow_cost,
            config.lending.return_confirmation,
        ));
        for transaction in snapshot.transactions {
            transactions.restore(transaction);
        }

        let queries = QueryFacade::new(
            Arc::clone(&accounts),
            Arc::clone(&catalog),
            Arc::clone(&transactions),
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            metadata = metadata.name(),
            users = accounts.len(),
            books = catalog.len(),
            transactions = transactions.len(),
            "Exchange opened"
        );

        Ok(Self {
            config,
            storage,
            accounts,
            ledger,
            catalog,
            transactions,
            queries,
            metadata,
            metrics,
        })
    }

    /// Create an account with the signup bonus, in one commit
    pub fn signup(&self, identity: NewUser) -> Result<User> {
        let bonus = self.config.tariffs.signup_bonus;
        let result = self
            .accounts
            .create(identity, |user, batch| {
                let id = user.id;
                self.ledger.post(
                    user,
                    Posting::Credit(bonus),
                    CreditReason::Signup,
                    EntryReference::Account(id),
                    batch,
                )
            })
            .map(|(user, entry)| {
                self.ledger.committed(&[&entry]);
                self.metrics.record_user_created();
                user
            });

        self.track("signup", result)
    }

    /// List a copy and grant the listing reward, in one commit
    pub fn list_book(&self, owner: UserId, listing: Listing) -> Result<Book> {
        let result = self.list(owner, listing);
        self.track("list_book", result)
    }

    fn list(&self, owner: UserId, listing: Listing) -> Result<Book> {
        let handle = self.accounts.handle(owner)?;
        let mut guard = handle.lock();
        let mut account = guard.clone();

        let mut batch = self.storage.batch();
        let book = self.catalog.prepare(owner, listing, Utc::now(), &mut batch)?;
        let entry = self.ledger.post(
            &mut account,
            Posting::Credit(self.config.tariffs.listing_reward),
            CreditReason::ListingReward,
            EntryReference::Listing(book.id),
            &mut batch,
        )?;
        batch.put_user(&account)?;
        self.storage.commit(batch)?;

        *guard = account;
        self.catalog.publish(book.clone());
        self.ledger.committed(&[&entry]);
        self.metrics.record_book_listed();

        Ok(book)
    }

    /// Look up metadata, then list
    ///
    /// A failed lookup aborts before any credit or book record exists.
    pub async fn list_by_isbn(
        &self,
        owner: UserId,
        isbn: &str,
        category: Category,
        condition: Condition,
    ) -> Result<Book> {
        let result = async {
            let isbn = Isbn::parse(isbn)?;
            self.accounts.handle(owner)?;
            let metadata = self.fetch(&isbn).await?;
            self.list(
                owner,
                Listing {
                    isbn,
                    metadata,
                    category,
                    condition,
                },
            )
        }
        .await;

        self.track("list_by_isbn", result)
    }

    /// Metadata for an ISBN, for previewing before listing
    pub async fn lookup_isbn(&self, isbn: &str) -> Result<BookMetadata> {
        let result = async {
            let isbn = Isbn::parse(isbn)?;
            self.fetch(&isbn).await
        }
        .await;

        self.track("lookup_isbn", result)
    }

    async fn fetch(&self, isbn: &Isbn) -> Result<BookMetadata> {
        self.metadata
            .lookup_by_isbn(isbn)
            .await
            .map_err(|err| Error::BookMetadataUnavailable {
                isbn: isbn.to_string(),
                reason: err.to_string(),
            })
    }

    /// Borrower asks for a book
    pub fn request_borrow(&self, book: BookId, borrower: UserId) -> Result<Transaction> {
        let result = self.transactions.request(book, borrower);
        self.track("request", result)
    }

    /// Owner approves
    pub fn approve(&self, transaction: TransactionId, actor: UserId) -> Result<Transaction> {
        let result = self.transactions.approve(transaction, actor);
        self.track("approve", result)
    }

    /// Owner hands the book over
    pub fn handover(&self, transaction: TransactionId, actor: UserId) -> Result<Transaction> {
        let result = self.transactions.handover(transaction, actor);
        self.track("handover", result)
    }

    /// Confirm the book came back
    pub fn return_book(&self, transaction: TransactionId, actor: UserId) -> Result<Transaction> {
        let result = self.transactions.confirm_return(transaction, actor);
        self.track("return", result)
    }

    /// Abandon before handover, refunding the borrower
    pub fn cancel(&self, transaction: TransactionId, actor: UserId) -> Result<Transaction> {
        let result = self.transactions.cancel(transaction, actor);
        self.track("cancel", result)
    }

    /// Balance for display; guards never rely on this value
    pub fn get_balance(&self, user: UserId) -> Result<i64> {
        self.ledger.balance(user)
    }

    /// Postings for one account
    pub fn ledger_entries(&self, user: UserId) -> Result<Vec<LedgerEntry>> {
        self.ledger.entries(user)
    }

    /// Counterpart contact for a participant, once approved
    pub fn contact_for(&self, transaction: TransactionId, viewer: UserId) -> Result<Option<ContactCard>> {
        self.queries.contact_for(transaction, viewer)
    }

    /// Re-check ledger conservation and book availability across the
    /// whole exchange
    ///
    /// Meant for quiescent moments (tests, maintenance); concurrent
    /// operations can make the cross-entity comparison see a half-applied
    /// picture.
    pub fn verify_invariants(&self) -> Result<()> {
        for account in self.accounts.ids() {
            self.ledger.verify(account)?;
        }

        let books = self.catalog.all();
        let transactions = self.transactions.select(|_| true);
        check_books(&books, &transactions)
    }

    fn track<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        match &result {
            Err(err) if err.is_guard() => {
                self.metrics.record_rejection(err.reason());
                tracing::warn!(operation, reason = err.reason(), error = %err, "Operation rejected");
            }
            Err(err) => {
                tracing::error!(operation, reason = err.reason(), error = %err, "Operation failed");
            }
            Ok(_) => {}
        }
        result
    }

    /// Account store
    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    /// Credit ledger
    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Book catalog
    pub fn catalog(&self) -> &BookCatalog {
        &self.catalog
    }

    /// Transaction manager
    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    /// Read-side projections
    pub fn queries(&self) -> &QueryFacade {
        &self.queries
    }

    /// Metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.storage.flush()
    }

    /// Flush and close
    pub fn shutdown(self) -> Result<()> {
        self.storage.flush()?;
        tracing::info!(service = %self.config.service_name, "Exchange shut down");
        Ok(())
    }
}

/// Checks run on a freshly loaded snapshot before anything is served
fn check_snapshot(snapshot: &Snapshot) -> Result<()> {
    let mut entries: HashMap<UserId, Vec<LedgerEntry>> = HashMap::new();
    for entry in &snapshot.entries {
        entries.entry(entry.account).or_default().push(entry.clone());
    }

    for user in &snapshot.users {
        let account_entries = entries.remove(&user.id).unwrap_or_default();
        ledger::check_account(user, &account_entries)?;
    }

    if let Some(orphan) = entries.keys().next() {
        return Err(Error::InvariantViolation(format!(
            "Ledger entries for unknown account {}",
            orphan
        )));
    }

    let known: HashSet<UserId> = snapshot.users.iter().map(|u| u.id).collect();
    for transaction in &snapshot.transactions {
        for party in [transaction.borrower, transaction.owner] {
            if !known.contains(&party) {
                return Err(Error::InvariantViolation(format!(
                    "Transaction {} references unknown user {}",
                    transaction.id, party
                )));
            }
        }
    }

    check_books(&snapshot.books, &snapshot.transactions)
}

/// At most one active transaction per book, and Unavailable iff one exists
fn check_books(books: &[Book], transactions: &[Transaction]) -> Result<()> {
    let mut active: HashMap<BookId, usize> = books.iter().map(|b| (b.id, 0)).collect();

    for transaction in transactions {
        if transaction.borrower == transaction.owner {
            return Err(Error::InvariantViolation(format!(
                "Transaction {} lends a book to its owner",
                transaction.id
            )));
        }
        let count = active.get_mut(&transaction.book).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "Transaction {} references unknown book {}",
                transaction.id, transaction.book
            ))
        })?;
        if transaction.is_active() {
            *count += 1;
        }
    }

    for book in books {
        let count = active.get(&book.id).copied().unwrap_or(0);
        if count > 1 {
            return Err(Error::InvariantViolation(format!(
                "Book {} has {} active transactions",
                book.id, count
            )));
        }
        let reserved = book.status() == BookStatus::Unavailable;
        if reserved != (count == 1) {
            return Err(Error::InvariantViolation(format!(
                "Book {} is {:?} with {} active transactions",
                book.id,
                book.status(),
                count
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{LookupError, StaticMetadataProvider};
    use crate::types::TransactionStatus;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const ISBN: &str = "978-0-441-17271-9";

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        config
    }

    fn provider() -> Arc<dyn MetadataProvider> {
        let isbn = Isbn::parse(ISBN).unwrap();
        Arc::new(StaticMetadataProvider::new().with_record(
            &isbn,
            BookMetadata {
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                cover: Some("https://covers.example/dune.jpg".to_string()),
                description: None,
            },
        ))
    }

    fn member(exchange: &Exchange, name: &str) -> User {
        exchange
            .signup(NewUser {
                email: format!("{}@example.com", name),
                display_name: name.to_string(),
                unit: format!("{}-unit", name),
                contact_handle: format!("+{}", name.len()),
            })
            .unwrap()
    }

    struct Offline;

    #[async_trait]
    impl MetadataProvider for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        async fn lookup_by_isbn(&self, _isbn: &Isbn) -> std::result::Result<BookMetadata, LookupError> {
            Err(LookupError::Transport("timed out".to_string()))
        }
    }

    #[tokio::test]
    async fn test_list_by_isbn() {
        let temp = TempDir::new().unwrap();
        let exchange = Exchange::open(test_config(&temp), provider()).unwrap();
        let owner = member(&exchange, "owner");

        let book = exchange
            .list_by_isbn(owner.id, ISBN, Category::SciFi, Condition::Good)
            .await
            .unwrap();

        assert_eq!(book.title, "Dune");
        assert_eq!(book.isbn, "9780441172719");
        assert!(book.is_available());
        assert_eq!(exchange.get_balance(owner.id).unwrap(), 4);
    }

    #[tokio::test]
    async fn test_failed_lookup_lists_nothing() {
        let temp = TempDir::new().unwrap();
        let exchange = Exchange::open(test_config(&temp), Arc::new(Offline)).unwrap();
        let owner = member(&exchange, "owner");

        let result = exchange
            .list_by_isbn(owner.id, ISBN, Category::SciFi, Condition::Good)
            .await;

        assert!(matches!(result, Err(Error::BookMetadataUnavailable { .. })));
        assert_eq!(exchange.get_balance(owner.id).unwrap(), 3);
        assert!(exchange.catalog().is_empty());

        let bad = exchange
            .list_by_isbn(owner.id, "12345", Category::SciFi, Condition::Good)
            .await;
        assert!(matches!(bad, Err(Error::InvalidIsbn(_))));
    }

    #[tokio::test]
    async fn test_cancel_refunds_and_releases() {
        let temp = TempDir::new().unwrap();
        let exchange = Exchange::open(test_config(&temp), provider()).unwrap();
        let owner = member(&exchange, "owner");
        let borrower = member(&exchange, "borrower");

        let book = exchange
            .list_by_isbn(owner.id, ISBN, Category::SciFi, Condition::Good)
            .await
            .unwrap();
        let txn = exchange.request_borrow(book.id, borrower.id).unwrap();
        assert_eq!(exchange.get_balance(borrower.id).unwrap(), 2);

        exchange.approve(txn.id, owner.id).unwrap();
        let cancelled = exchange.cancel(txn.id, borrower.id).unwrap();

        assert_eq!(cancelled.status(), TransactionStatus::Cancelled);
        assert_eq!(exchange.get_balance(borrower.id).unwrap(), 3);
        assert!(exchange.catalog().get(book.id).unwrap().is_available());

        let reasons: Vec<CreditReason> = exchange
            .ledger_entries(borrower.id)
            .unwrap()
            .iter()
            .map(|e| e.reason)
            .collect();
        assert_eq!(
            reasons,
            vec![
                CreditReason::Signup,
                CreditReason::BorrowCost,
                CreditReason::RefundOnCancel
            ]
        );

        // Terminal: cancelling again is out of order
        assert!(matches!(
            exchange.cancel(txn.id, owner.id),
            Err(Error::InvalidTransition { .. })
        ));
        exchange.verify_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_contact_disclosure() {
        let temp = TempDir::new().unwrap();
        let exchange = Exchange::open(test_config(&temp), provider()).unwrap();
        let owner = member(&exchange, "owner");
        let borrower = member(&exchange, "borrower");
        let stranger = member(&exchange, "stranger");

        let book = exchange
            .list_by_isbn(owner.id, ISBN, Category::SciFi, Condition::Good)
            .await
            .unwrap();
        let txn = exchange.request_borrow(book.id, borrower.id).unwrap();

        assert_eq!(exchange.contact_for(txn.id, borrower.id).unwrap(), None);

        exchange.approve(txn.id, owner.id).unwrap();
        let card = exchange.contact_for(txn.id, borrower.id).unwrap().unwrap();
        assert_eq!(card.user, owner.id);
        assert_eq!(card.contact_handle, owner.contact_handle);

        let reverse = exchange.contact_for(txn.id, owner.id).unwrap().unwrap();
        assert_eq!(reverse.user, borrower.id);

        assert!(matches!(
            exchange.contact_for(txn.id, stranger.id),
            Err(Error::NotParticipant { .. })
        ));

        exchange.handover(txn.id, owner.id).unwrap();
        exchange.return_book(txn.id, owner.id).unwrap();
        assert_eq!(exchange.contact_for(txn.id, borrower.id).unwrap(), None);
    }

    #[tokio::test]
    async fn test_queries() {
        let temp = TempDir::new().unwrap();
        let exchange = Exchange::open(test_config(&temp), provider()).unwrap();
        let owner = member(&exchange, "owner");
        let borrower = member(&exchange, "borrower");

        let first = exchange
            .list_by_isbn(owner.id, ISBN, Category::SciFi, Condition::Good)
            .await
            .unwrap();
        let second = exchange
            .list_by_isbn(owner.id, ISBN, Category::SciFi, Condition::Poor)
            .await
            .unwrap();

        let txn = exchange.request_borrow(first.id, borrower.id).unwrap();
        let queries = exchange.queries();

        let incoming = queries.incoming_requests(owner.id).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].transaction.id, txn.id);
        assert_eq!(incoming[0].borrower.display_name, "borrower");
        assert!(queries.incoming_requests(borrower.id).unwrap().is_empty());

        assert_eq!(queries.outgoing_requests(borrower.id).unwrap().len(), 1);

        let mine: Vec<BookId> = queries.my_books(owner.id).unwrap().iter().map(|b| b.id).collect();
        assert_eq!(mine, vec![second.id, first.id]);

        let browse = queries.browse(crate::catalog::BookFilter::new().search("dune"));
        assert_eq!(browse.len(), 1);
        assert_eq!(browse[0].id, second.id);

        exchange.cancel(txn.id, owner.id).unwrap();
        assert!(queries.outgoing_requests(borrower.id).unwrap().is_empty());
        assert_eq!(queries.history(borrower.id).unwrap().len(), 1);
        assert_eq!(
            queries.details(txn.id).unwrap().owner.id,
            owner.id
        );
    }

    #[tokio::test]
    async fn test_reopen_replays_state() {
        let temp = TempDir::new().unwrap();
        let (owner, borrower, book, txn) = {
            let exchange = Exchange::open(test_config(&temp), provider()).unwrap();
            let owner = member(&exchange, "owner");
            let borrower = member(&exchange, "borrower");
            let book = exchange
                .list_by_isbn(owner.id, ISBN, Category::SciFi, Condition::Good)
                .await
                .unwrap();
            let txn = exchange.request_borrow(book.id, borrower.id).unwrap();
            exchange.approve(txn.id, owner.id).unwrap();
            exchange.shutdown().unwrap();
            (owner, borrower, book, txn)
        };

        let exchange = Exchange::open(test_config(&temp), provider()).unwrap();
        assert_eq!(exchange.get_balance(owner.id).unwrap(), 4);
        assert_eq!(exchange.get_balance(borrower.id).unwrap(), 2);
        assert!(!exchange.catalog().get(book.id).unwrap().is_available());
        assert_eq!(
            exchange.transactions().get(txn.id).unwrap().status(),
            TransactionStatus::Approved
        );
        assert!(matches!(
            exchange.signup(NewUser {
                email: "OWNER@example.com".to_string(),
                display_name: "again".to_string(),
                unit: "x".to_string(),
                contact_handle: "y".to_string(),
            }),
            Err(Error::DuplicateEmail(_))
        ));

        // Sequence resumes past the replayed entries
        let before = exchange.ledger().next_sequence();
        assert!(before > 4);
        exchange.handover(txn.id, owner.id).unwrap();
        exchange.return_book(txn.id, borrower.id).unwrap();
        exchange.verify_invariants().unwrap();
    }

    /// Leave one approved loan on disk, then edit the stored records
    /// directly and reopen
    fn reopen_after<F>(tamper: F) -> Result<()>
    where
        F: FnOnce(&Storage, &User, &Transaction),
    {
        let temp = TempDir::new().unwrap();
        let (borrower, txn) = {
            let exchange = Exchange::open(test_config(&temp), provider()).unwrap();
            let owner = member(&exchange, "owner");
            let borrower = member(&exchange, "borrower");
            let book = exchange
                .list_book(
                    owner.id,
                    Listing {
                        isbn: Isbn::parse(ISBN).unwrap(),
                        metadata: BookMetadata {
                            title: "Dune".to_string(),
                            author: "Frank Herbert".to_string(),
                            cover: None,
                            description: None,
                        },
                        category: Category::SciFi,
                        condition: Condition::Good,
                    },
                )
                .unwrap();
            let txn = exchange.request_borrow(book.id, borrower.id).unwrap();
            exchange.approve(txn.id, owner.id).unwrap();
            exchange.shutdown().unwrap();
            (borrower, txn)
        };

        {
            let storage = Storage::open(&test_config(&temp)).unwrap();
            tamper(&storage, &borrower, &txn);
            storage.flush().unwrap();
        }

        Exchange::open(test_config(&temp), provider()).map(|_| ())
    }

    #[test]
    fn test_open_rejects_inconsistent_storage() {
        // Untouched data opens fine
        assert!(reopen_after(|_, _, _| {}).is_ok());

        // Balance edited behind the ledger's back
        let result = reopen_after(|storage, borrower, _| {
            let mut user = storage.get_user(borrower.id).unwrap().unwrap();
            user.credits += 10;
            let mut batch = storage.batch();
            batch.put_user(&user).unwrap();
            storage.commit(batch).unwrap();
        });
        assert!(matches!(result, Err(Error::InvariantViolation(msg)) if msg.contains("Balance mismatch")));

        // Posting for an account that does not exist
        let result = reopen_after(|storage, _, txn| {
            let mut batch = storage.batch();
            batch
                .put_entry(&LedgerEntry {
                    sequence: 1_000,
                    account: UserId::generate(),
                    delta: 3,
                    balance_after: 3,
                    reason: CreditReason::Signup,
                    reference: EntryReference::Transaction(txn.id),
                    recorded_at: Utc::now(),
                })
                .unwrap();
            storage.commit(batch).unwrap();
        });
        assert!(matches!(result, Err(Error::InvariantViolation(msg)) if msg.contains("unknown account")));

        // Transaction pointing at a stranger
        let result = reopen_after(|storage, _, txn| {
            let mut stray = txn.clone();
            stray.borrower = UserId::generate();
            let mut batch = storage.batch();
            batch.put_transaction(&stray).unwrap();
            storage.commit(batch).unwrap();
        });
        assert!(matches!(result, Err(Error::InvariantViolation(msg)) if msg.contains("unknown user")));
    }

    #[test]
    fn test_check_books_detects_double_booking() {
        let owner = UserId::generate();
        let mut book = Book::new(
            owner,
            Listing {
                isbn: Isbn::parse(ISBN).unwrap(),
                metadata: BookMetadata {
                    title: "Dune".to_string(),
                    author: "Frank Herbert".to_string(),
                    cover: None,
                    description: None,
                },
                category: Category::SciFi,
                condition: Condition::Good,
            },
            Utc::now(),
        );
        book.status = BookStatus::Unavailable;

        let first = Transaction::open(&book, UserId::generate(), 1, Utc::now());
        let second = Transaction::open(&book, UserId::generate(), 1, Utc::now());

        check_books(std::slice::from_ref(&book), std::slice::from_ref(&first)).unwrap();
        assert!(matches!(
            check_books(&[book.clone()], &[first, second]),
            Err(Error::InvariantViolation(_))
        ));

        book.status = BookStatus::Available;
        let third = Transaction::open(&book, UserId::generate(), 1, Utc::now());
        assert!(check_books(&[book], &[third]).is_err());
    }
}
