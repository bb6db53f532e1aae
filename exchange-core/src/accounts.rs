//! Account store
//!
//! Holds member identity. Balances live on the user record but are only
//! written through [`CreditLedger`](crate::ledger::CreditLedger).

use crate::{
    storage::{Batch, Storage},
    types::{NewUser, User, UserId},
    Error, Result,
};
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use std::sync::Arc;

/// User records, one lock per account
#[derive(Debug)]
pub struct AccountStore {
    accounts: DashMap<UserId, Arc<Mutex<User>>>,
    emails: DashMap<String, UserId>,
    storage: Arc<Storage>,
}

impl AccountStore {
    pub(crate) fn new(storage: Arc<Storage>) -> Self {
        Self {
            accounts: DashMap::new(),
            emails: DashMap::new(),
            storage,
        }
    }

    /// Create an account, letting `opening` stage extra records (the signup
    /// posting) into the same batch as the user record. Fails with
    /// `DuplicateEmail` if the email is taken.
    ///
    /// The email slot stays locked until the commit finishes, so two signups
    /// with the same email cannot both succeed. Members join through
    /// [`Exchange::signup`](crate::Exchange::signup); there is no public way
    /// to open an account without the starting bonus:
    ///
    /// ```compile_fail
    /// use exchange_core::{Exchange, NewUser};
    ///
    /// fn join(exchange: &Exchange, identity: NewUser) {
    ///     let _ = exchange.accounts().create(identity, |_, _| Ok(()));
    /// }
    /// ```
    pub(crate) fn create<T, F>(&self, identity: NewUser, opening: F) -> Result<(User, T)>
    where
        F: FnOnce(&mut User, &mut Batch<'_>) -> Result<T>,
    {
        let email = normalize_email(&identity.email);

        match self.emails.entry(email.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateEmail(email)),
            Entry::Vacant(slot) => {
                let mut user = User::new(NewUser { email, ..identity }, Utc::now());

                let mut batch = self.storage.batch();
                let staged = opening(&mut user, &mut batch)?;
                batch.put_user(&user)?;
                self.storage.commit(batch)?;

                self.accounts
                    .insert(user.id, Arc::new(Mutex::new(user.clone())));
                slot.insert(user.id);

                tracing::info!(user_id = %user.id, "Account created");
                Ok((user, staged))
            }
        }
    }

    /// Get user by ID
    pub fn get(&self, id: UserId) -> Result<User> {
        let handle = self.handle(id)?;
        let user = handle.lock().clone();
        Ok(user)
    }

    /// Get user by email (case-insensitive)
    pub fn get_by_email(&self, email: &str) -> Result<User> {
        let id = self
            .emails
            .get(&normalize_email(email))
            .map(|entry| *entry.value())
            .ok_or_else(|| Error::not_found("User", email))?;
        self.get(id)
    }

    /// Number of accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no account exists yet
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Every account ID
    pub fn ids(&self) -> Vec<UserId> {
        self.accounts.iter().map(|entry| *entry.key()).collect()
    }

    /// Lock handle for one account; the map guard is released on return
    pub(crate) fn handle(&self, id: UserId) -> Result<Arc<Mutex<User>>> {
        self.accounts
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found("User", id))
    }

    /// Re-insert a persisted user on open
    pub(crate) fn restore(&self, user: User) -> Result<()> {
        let email = normalize_email(&user.email);
        if self.emails.insert(email.clone(), user.id).is_some() {
            return Err(Error::InvariantViolation(format!(
                "Email {} registered twice",
                email
            )));
        }
        self.accounts.insert(user.id, Arc::new(Mutex::new(user)));
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use tempfile::TempDir;

    fn test_store() -> (AccountStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        let storage = Arc::new(Storage::open(&config).unwrap());
        (AccountStore::new(storage), temp_dir)
    }

    fn create(store: &AccountStore, identity: NewUser) -> Result<User> {
        store.create(identity, |_, _| Ok(())).map(|(user, ())| user)
    }

    fn identity(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            display_name: "Reader".to_string(),
            unit: "7C".to_string(),
            contact_handle: "+15550101".to_string(),
        }
    }

    #[test]
    fn test_create_and_get() {
        let (store, _temp) = test_store();
        let user = create(&store, identity("Reader@Example.com ")).unwrap();

        assert_eq!(user.email, "reader@example.com");
        assert_eq!(user.credits(), 0);
        assert_eq!(store.get(user.id).unwrap(), user);
        assert_eq!(store.get_by_email("READER@example.com").unwrap().id, user.id);
    }

    #[test]
    fn test_duplicate_email() {
        let (store, _temp) = test_store();
        create(&store, identity("dup@example.com")).unwrap();

        let result = create(&store, identity("DUP@example.com"));
        assert!(matches!(result, Err(Error::DuplicateEmail(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_not_found() {
        let (store, _temp) = test_store();
        assert!(matches!(
            store.get(UserId::generate()),
            Err(Error::NotFound { entity: "User", .. })
        ));
        assert!(store.get_by_email("nobody@example.com").is_err());
    }

    #[test]
    fn test_failed_opening_creates_nothing() {
        let (store, _temp) = test_store();
        let result: Result<(User, ())> = store.create(identity("x@example.com"), |_, _| {
            Err(Error::InvalidAmount(0))
        });

        assert!(result.is_err());
        assert!(store.is_empty());
        // Email is free again
        assert!(create(&store, identity("x@example.com")).is_ok());
    }
}
