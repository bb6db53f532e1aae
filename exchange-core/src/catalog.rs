//! Book catalog and the availability guard
//!
//! `status` on a [`Book`] is only ever changed here, and only on behalf of
//! the transaction manager: it flips locked copies through the crate-private
//! `mark_unavailable` and `mark_available`, so the flip lands in the same
//! commit as the transaction that caused it. Callers outside the crate can
//! read the catalog but cannot change availability:
//!
//! ```compile_fail
//! use exchange_core::{BookId, Exchange};
//!
//! fn release(exchange: &Exchange, book: BookId) {
//!     let _ = exchange.catalog().mark_available(book);
//! }
//! ```

use crate::{
    storage::{Batch, Storage},
    types::{Book, BookId, BookStatus, Category, Listing, UserId},
    Error, Result,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Discovery filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    /// Lowercased title substring
    search: Option<String>,
    /// `None` matches every category
    category: Option<Category>,
}

impl BookFilter {
    /// Match everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to titles containing `text`
    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = if text.trim().is_empty() {
            None
        } else {
            Some(text.trim().to_lowercase())
        };
        self
    }

    /// Restrict to one category
    pub fn category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }

    /// Lowercased search text, if any
    pub fn search_text(&self) -> Option<&str> {
        self.search.as_deref()
    }

    /// Selected category, if any
    pub fn selected_category(&self) -> Option<Category> {
        self.category
    }

    /// Whether `book` belongs in the borrowing view
    pub fn matches(&self, book: &Book) -> bool {
        if !book.is_available() {
            return false;
        }
        if let Some(category) = self.category {
            if book.category != category {
                return false;
            }
        }
        match &self.search {
            Some(text) => book.title.to_lowercase().contains(text.as_str()),
            None => true,
        }
    }
}

/// Book records, one lock per book
#[derive(Debug)]
pub struct BookCatalog {
    books: DashMap<BookId, Arc<Mutex<Book>>>,
    storage: Arc<Storage>,
}

impl BookCatalog {
    pub(crate) fn new(storage: Arc<Storage>) -> Self {
        Self {
            books: DashMap::new(),
            storage,
        }
    }

    /// Get book by ID
    pub fn get(&self, id: BookId) -> Result<Book> {
        let handle = self.handle(id)?;
        let book = handle.lock().clone();
        Ok(book)
    }

    /// Available books matching `filter`
    ///
    /// The result is lazy and can be walked any number of times; each walk
    /// sees the catalog as it is at that moment.
    pub fn find(&self, filter: BookFilter) -> Discovery<'_> {
        Discovery {
            catalog: self,
            filter,
        }
    }

    /// Every book listed by `owner`, newest first
    pub fn owned_by(&self, owner: UserId) -> Vec<Book> {
        self.handles()
            .into_iter()
            .filter_map(|handle| {
                let book = handle.lock();
                (book.owner == owner).then(|| book.clone())
            })
            .collect()
    }

    /// Every book, whatever its status, newest first
    pub fn all(&self) -> Vec<Book> {
        self.handles()
            .into_iter()
            .map(|handle| handle.lock().clone())
            .collect()
    }

    /// Number of listed books
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether nothing is listed
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Handles ordered newest first, with no map guard held afterwards
    fn handles(&self) -> Vec<Arc<Mutex<Book>>> {
        let mut handles: Vec<(BookId, Arc<Mutex<Book>>)> = self
            .books
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        handles.sort_by(|a, b| b.0.cmp(&a.0));
        handles.into_iter().map(|(_, handle)| handle).collect()
    }

    /// Build a new listing and stage it; visible only after [`publish`](Self::publish)
    pub(crate) fn prepare(
        &self,
        owner: UserId,
        listing: Listing,
        now: DateTime<Utc>,
        batch: &mut Batch<'_>,
    ) -> Result<Book> {
        let book = Book::new(owner, listing, now);
        batch.put_book(&book)?;
        Ok(book)
    }

    /// Make a committed listing visible
    pub(crate) fn publish(&self, book: Book) {
        tracing::info!(book_id = %book.id, user_id = %book.owner, title = %book.title, "Book listed");
        self.books.insert(book.id, Arc::new(Mutex::new(book)));
    }

    /// Conditional flip to Unavailable on a locked copy; fails with
    /// `AlreadyUnavailable` if the book is already taken
    pub(crate) fn mark_unavailable(&self, book: &mut Book) -> Result<()> {
        if book.status == BookStatus::Unavailable {
            return Err(Error::AlreadyUnavailable(book.id));
        }
        book.status = BookStatus::Unavailable;
        Ok(())
    }

    /// Flip back to Available on a locked copy; a no-op when it already is
    pub(crate) fn mark_available(&self, book: &mut Book) {
        book.status = BookStatus::Available;
    }

    pub(crate) fn handle(&self, id: BookId) -> Result<Arc<Mutex<Book>>> {
        self.books
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found("Book", id))
    }

    pub(crate) fn restore(&self, book: Book) {
        self.books.insert(book.id, Arc::new(Mutex::new(book)));
    }
}

/// Lazy, restartable result of [`BookCatalog::find`]
#[derive(Debug)]
pub struct Discovery<'a> {
    catalog: &'a BookCatalog,
    filter: BookFilter,
}

impl<'a> Discovery<'a> {
    /// Walk the matches, newest listing first
    pub fn iter(&self) -> impl Iterator<Item = Book> + '_ {
        self.catalog
            .handles()
            .into_iter()
            .filter_map(move |handle| {
                let book = handle.lock();
                self.filter.matches(&book).then(|| book.clone())
            })
    }

    /// Filter in use
    pub fn filter(&self) -> &BookFilter {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Isbn;
    use crate::types::{BookMetadata, Condition};
    use crate::Config;
    use tempfile::TempDir;

    fn test_catalog() -> (BookCatalog, Arc<Storage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        let storage = Arc::new(Storage::open(&config).unwrap());
        (BookCatalog::new(Arc::clone(&storage)), storage, temp_dir)
    }

    fn list(catalog: &BookCatalog, storage: &Storage, owner: UserId, title: &str, category: Category) -> Book {
        let listing = Listing {
            isbn: Isbn::parse("9780441172719").unwrap(),
            metadata: BookMetadata {
                title: title.to_string(),
                author: "Someone".to_string(),
                cover: None,
                description: None,
            },
            category,
            condition: Condition::Good,
        };
        let mut batch = storage.batch();
        let book = catalog.prepare(owner, listing, Utc::now(), &mut batch).unwrap();
        storage.commit(batch).unwrap();
        catalog.publish(book.clone());
        book
    }

    /// Flip the live record in place, as the transaction manager does
    fn take(catalog: &BookCatalog, id: BookId) -> Result<()> {
        let handle = catalog.handle(id)?;
        let mut book = handle.lock();
        catalog.mark_unavailable(&mut book)
    }

    #[test]
    fn test_mark_unavailable_guard() {
        let (catalog, storage, _temp) = test_catalog();
        let book = list(&catalog, &storage, UserId::generate(), "Dune", Category::SciFi);

        take(&catalog, book.id).unwrap();
        assert_eq!(catalog.get(book.id).unwrap().status(), BookStatus::Unavailable);

        assert!(matches!(
            take(&catalog, book.id),
            Err(Error::AlreadyUnavailable(id)) if id == book.id
        ));
        assert!(matches!(
            take(&catalog, BookId::generate()),
            Err(Error::NotFound { entity: "Book", .. })
        ));
    }

    #[test]
    fn test_mark_available_idempotent() {
        let (catalog, storage, _temp) = test_catalog();
        let book = list(&catalog, &storage, UserId::generate(), "Emma", Category::Romance);

        let mut copy = catalog.get(book.id).unwrap();
        catalog.mark_available(&mut copy);
        catalog.mark_available(&mut copy);
        assert!(copy.is_available());
        assert_eq!(copy, book);

        catalog.mark_unavailable(&mut copy).unwrap();
        catalog.mark_available(&mut copy);
        assert!(copy.is_available());

        // Copies are staged, the live record is untouched
        assert_eq!(catalog.get(book.id).unwrap(), book);
    }

    #[test]
    fn test_find_filters() {
        let (catalog, storage, _temp) = test_catalog();
        let owner = UserId::generate();
        let dune = list(&catalog, &storage, owner, "Dune", Category::SciFi);
        list(&catalog, &storage, owner, "Dune Messiah", Category::SciFi);
        list(&catalog, &storage, owner, "Gone Girl", Category::Mystery);

        let all = catalog.find(BookFilter::new());
        assert_eq!(all.iter().count(), 3);

        let search = catalog.find(BookFilter::new().search("  dUNE "));
        assert_eq!(search.filter().search_text(), Some("dune"));
        assert_eq!(search.iter().count(), 2);

        let mystery = catalog.find(BookFilter::new().category(Some(Category::Mystery)));
        let titles: Vec<String> = mystery.iter().map(|b| b.title).collect();
        assert_eq!(titles, vec!["Gone Girl".to_string()]);

        // Restartable, and sees later changes
        take(&catalog, dune.id).unwrap();
        assert_eq!(search.iter().count(), 1);
        assert_eq!(all.iter().count(), 2);
    }

    #[test]
    fn test_owned_by() {
        let (catalog, storage, _temp) = test_catalog();
        let alice = UserId::generate();
        let bob = UserId::generate();
        let first = list(&catalog, &storage, alice, "One", Category::Fiction);
        list(&catalog, &storage, bob, "Two", Category::Fiction);
        let third = list(&catalog, &storage, alice, "Three", Category::Fiction);

        take(&catalog, first.id).unwrap();

        let owned: Vec<BookId> = catalog.owned_by(alice).iter().map(|b| b.id).collect();
        assert_eq!(owned, vec![third.id, first.id]);
    }
}
