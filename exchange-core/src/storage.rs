//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `users` - User records with running balance (key: user_id)
//! - `books` - Book records (key: book_id)
//! - `transactions` - Lending transactions (key: transaction_id)
//! - `ledger` - Append-only credit postings (key: account_id || sequence)
//!
//! Every state change goes through a [`Batch`] so that the records touched by
//! one operation land on disk together or not at all.

use crate::{
    error::{Error, Result},
    types::{Book, LedgerEntry, Transaction, User, UserId},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use serde::de::DeserializeOwned;

/// Column family names
const CF_USERS: &str = "users";
const CF_BOOKS: &str = "books";
const CF_TRANSACTIONS: &str = "transactions";
const CF_LEDGER: &str = "ledger";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

/// Everything persisted, as read back on open
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Users
    pub users: Vec<User>,
    /// Books
    pub books: Vec<Book>,
    /// Transactions
    pub transactions: Vec<Transaction>,
    /// Ledger postings, grouped by account in posting order
    pub entries: Vec<LedgerEntry>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_USERS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_BOOKS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_LEDGER, Self::cf_options_ledger()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB");

        Ok(Self {
            db,
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        // Records are re-read on every open, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_ledger() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Start an atomic batch
    pub fn batch(&self) -> Batch<'_> {
        Batch {
            storage: self,
            inner: WriteBatch::default(),
        }
    }

    /// Commit a batch atomically
    pub fn commit(&self, batch: Batch<'_>) -> Result<()> {
        let records = batch.inner.len();
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch.inner, &write_opts)?;

        tracing::debug!(records, "Batch committed");
        Ok(())
    }

    /// Get user by ID
    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let cf = self.cf_handle(CF_USERS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Ledger postings for one account, in posting order
    pub fn account_entries(&self, account: UserId) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf_handle(CF_LEDGER)?;
        let prefix: &[u8] = account.as_bytes();

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push(bincode::deserialize(&value)?);
        }

        Ok(entries)
    }

    /// Read back every record
    pub fn load(&self) -> Result<Snapshot> {
        let snapshot = Snapshot {
            users: self.scan(CF_USERS)?,
            books: self.scan(CF_BOOKS)?,
            transactions: self.scan(CF_TRANSACTIONS)?,
            entries: self.scan(CF_LEDGER)?,
        };

        tracing::info!(
            users = snapshot.users.len(),
            books = snapshot.books.len(),
            transactions = snapshot.transactions.len(),
            entries = snapshot.entries.len(),
            "Loaded exchange state"
        );

        Ok(snapshot)
    }

    fn scan<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let cf = self.cf_handle(name)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    /// Flush memtables (graceful shutdown)
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        tracing::info!("RocksDB flushed");
        Ok(())
    }

    fn ledger_key(entry: &LedgerEntry) -> [u8; 24] {
        let mut key = [0u8; 24];
        key[..16].copy_from_slice(entry.account.as_bytes());
        key[16..].copy_from_slice(&entry.sequence.to_be_bytes());
        key
    }
}

/// Records staged for one atomic commit
pub struct Batch<'a> {
    storage: &'a Storage,
    inner: WriteBatch,
}

impl std::fmt::Debug for Batch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch").field("records", &self.inner.len()).finish()
    }
}

impl Batch<'_> {
    /// Stage a user record
    pub fn put_user(&mut self, user: &User) -> Result<()> {
        let cf = self.storage.cf_handle(CF_USERS)?;
        self.inner.put_cf(cf, user.id.as_bytes(), bincode::serialize(user)?);
        Ok(())
    }

    /// Stage a book record
    pub fn put_book(&mut self, book: &Book) -> Result<()> {
        let cf = self.storage.cf_handle(CF_BOOKS)?;
        self.inner.put_cf(cf, book.id.as_bytes(), bincode::serialize(book)?);
        Ok(())
    }

    /// Stage a transaction record
    pub fn put_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        let cf = self.storage.cf_handle(CF_TRANSACTIONS)?;
        self.inner.put_cf(
            cf,
            transaction.id.as_bytes(),
            bincode::serialize(transaction)?,
        );
        Ok(())
    }

    /// Stage a ledger posting
    pub fn put_entry(&mut self, entry: &LedgerEntry) -> Result<()> {
        let cf = self.storage.cf_handle(CF_LEDGER)?;
        self.inner
            .put_cf(cf, Storage::ledger_key(entry), bincode::serialize(entry)?);
        Ok(())
    }

    /// Number of staged records
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing is staged
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CreditReason, EntryReference, NewUser};
    use chrono::Utc;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (config, temp_dir)
    }

    fn test_user(email: &str) -> User {
        User::new(
            NewUser {
                email: email.to_string(),
                display_name: "Reader".to_string(),
                unit: "12A".to_string(),
                contact_handle: "+15550100".to_string(),
            },
            Utc::now(),
        )
    }

    fn test_entry(account: UserId, sequence: u64, delta: i64, balance_after: i64) -> LedgerEntry {
        LedgerEntry {
            sequence,
            account,
            delta,
            balance_after,
            reason: CreditReason::Signup,
            reference: EntryReference::Account(account),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert!(storage.db.cf_handle(CF_USERS).is_some());
        assert!(storage.db.cf_handle(CF_LEDGER).is_some());
    }

    #[test]
    fn test_batch_commit_and_get() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut user = test_user("a@example.com");
        user.credits = 3;

        let mut batch = storage.batch();
        batch.put_user(&user).unwrap();
        batch.put_entry(&test_entry(user.id, 1, 3, 3)).unwrap();
        assert_eq!(batch.len(), 2);
        storage.commit(batch).unwrap();

        let stored = storage.get_user(user.id).unwrap().unwrap();
        assert_eq!(stored.credits(), 3);
        assert_eq!(stored.email, "a@example.com");
    }

    #[test]
    fn test_uncommitted_batch_writes_nothing() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let user = test_user("b@example.com");
        let mut batch = storage.batch();
        batch.put_user(&user).unwrap();
        drop(batch);

        assert!(storage.get_user(user.id).unwrap().is_none());
    }

    #[test]
    fn test_account_entries_prefix_scan_in_order() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let alice = test_user("alice@example.com");
        let bob = test_user("bob@example.com");

        let mut batch = storage.batch();
        batch.put_entry(&test_entry(alice.id, 3, -1, 2)).unwrap();
        batch.put_entry(&test_entry(bob.id, 2, 3, 3)).unwrap();
        batch.put_entry(&test_entry(alice.id, 1, 3, 3)).unwrap();
        storage.commit(batch).unwrap();

        let entries = storage.account_entries(alice.id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sequence, 1);
        assert_eq!(entries[1].sequence, 3);
        assert!(entries.iter().all(|e| e.account == alice.id));
    }

    #[test]
    fn test_load_after_reopen() {
        let (config, _temp) = test_config();

        let user = test_user("c@example.com");
        {
            let storage = Storage::open(&config).unwrap();
            let mut batch = storage.batch();
            batch.put_user(&user).unwrap();
            batch.put_entry(&test_entry(user.id, 7, 3, 3)).unwrap();
            storage.commit(batch).unwrap();
            storage.flush().unwrap();
        }

        let storage = Storage::open(&config).unwrap();
        let snapshot = storage.load().unwrap();
        assert_eq!(snapshot.users.len(), 1);
        assert_eq!(snapshot.users[0].id, user.id);
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].sequence, 7);
        assert!(snapshot.books.is_empty());
    }
}
