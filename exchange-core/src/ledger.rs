//! Credit ledger
//!
//! The only writer of account balances. Every change is an append-only
//! [`LedgerEntry`] staged in the same batch as the updated user record, so the
//! running balance and the log cannot drift apart.
//!
//! # Invariants
//!
//! 1. **Positivity**: every posting moves a strictly positive amount
//! 2. **No overdraft**: a debit that would take a balance below zero is refused
//! 3. **Conservation**: sum of an account's deltas == its balance
//!
//! Tariffs are not known here; callers decide how much to post.

use crate::{
    accounts::AccountStore,
    metrics::Metrics,
    storage::{Batch, Storage},
    types::{CreditReason, EntryReference, LedgerEntry, User, UserId},
    Error, Result,
};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Direction and size of one posting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posting {
    /// Add credits
    Credit(i64),
    /// Remove credits
    Debit(i64),
}

impl Posting {
    fn amount(&self) -> i64 {
        match self {
            Posting::Credit(amount) | Posting::Debit(amount) => *amount,
        }
    }
}

/// Credit ledger
#[derive(Debug)]
pub struct CreditLedger {
    accounts: Arc<AccountStore>,
    storage: Arc<Storage>,
    sequence: AtomicU64,
    metrics: Metrics,
}

impl CreditLedger {
    pub(crate) fn new(
        accounts: Arc<AccountStore>,
        storage: Arc<Storage>,
        metrics: Metrics,
        next_sequence: u64,
    ) -> Self {
        Self {
            accounts,
            storage,
            sequence: AtomicU64::new(next_sequence),
            metrics,
        }
    }

    /// Increase a balance by `amount`
    pub fn credit(
        &self,
        account: UserId,
        amount: i64,
        reason: CreditReason,
        reference: EntryReference,
    ) -> Result<LedgerEntry> {
        self.apply(account, Posting::Credit(amount), reason, reference)
    }

    /// Decrease a balance by `amount`; refused if it would go negative
    pub fn debit(
        &self,
        account: UserId,
        amount: i64,
        reason: CreditReason,
        reference: EntryReference,
    ) -> Result<LedgerEntry> {
        self.apply(account, Posting::Debit(amount), reason, reference)
    }

    fn apply(
        &self,
        account: UserId,
        posting: Posting,
        reason: CreditReason,
        reference: EntryReference,
    ) -> Result<LedgerEntry> {
        let handle = self.accounts.handle(account)?;
        let mut guard = handle.lock();
        let mut user = guard.clone();

        let mut batch = self.storage.batch();
        let entry = self.post(&mut user, posting, reason, reference, &mut batch)?;
        batch.put_user(&user)?;
        self.storage.commit(batch)?;

        *guard = user;
        self.committed(&[&entry]);
        Ok(entry)
    }

    /// Stage one posting against a locked copy of `user`
    ///
    /// Updates `user.credits` and stages the entry; the caller stages the
    /// user record and commits. Nothing is visible until that commit.
    pub(crate) fn post(
        &self,
        user: &mut User,
        posting: Posting,
        reason: CreditReason,
        reference: EntryReference,
        batch: &mut Batch<'_>,
    ) -> Result<LedgerEntry> {
        let amount = posting.amount();
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }

        let balance_after = match posting {
            Posting::Credit(_) => user.credits.checked_add(amount).ok_or_else(|| {
                Error::InvariantViolation(format!("Balance overflow for {}", user.id))
            })?,
            Posting::Debit(_) => {
                if user.credits < amount {
                    return Err(Error::InsufficientCredits {
                        account: user.id,
                        required: amount,
                        available: user.credits,
                    });
                }
                user.credits - amount
            }
        };

        let delta = match posting {
            Posting::Credit(_) => amount,
            Posting::Debit(_) => -amount,
        };

        let entry = LedgerEntry {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            account: user.id,
            delta,
            balance_after,
            reason,
            reference,
            recorded_at: Utc::now(),
        };

        batch.put_entry(&entry)?;
        user.credits = balance_after;
        Ok(entry)
    }

    /// Report postings once their batch is on disk
    pub(crate) fn committed(&self, entries: &[&LedgerEntry]) {
        for entry in entries {
            self.metrics.record_posting(entry.delta);
            tracing::info!(
                user_id = %entry.account,
                delta = entry.delta,
                balance = entry.balance_after,
                reason = entry.reason.label(),
                "Credits posted"
            );
        }
    }

    /// Current balance
    pub fn balance(&self, account: UserId) -> Result<i64> {
        Ok(self.accounts.get(account)?.credits())
    }

    /// Postings for one account, oldest first
    pub fn entries(&self, account: UserId) -> Result<Vec<LedgerEntry>> {
        // Existence check so an unknown account is NotFound, not an empty log
        self.accounts.handle(account)?;
        self.storage.account_entries(account)
    }

    /// Check conservation for one account
    ///
    /// Holds the account lock while reading the log, so the balance cannot
    /// move underneath the check.
    pub fn verify(&self, account: UserId) -> Result<()> {
        let handle = self.accounts.handle(account)?;
        let guard = handle.lock();

        let entries = self.storage.account_entries(account)?;
        check_account(&guard, &entries)
    }

    /// Next sequence to be handed out
    pub fn next_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

/// Conservation check shared by live verification and replay
pub(crate) fn check_account(user: &User, entries: &[LedgerEntry]) -> Result<()> {
    if user.credits < 0 {
        return Err(Error::InvariantViolation(format!(
            "Negative balance {} for {}",
            user.credits, user.id
        )));
    }

    let mut running: i64 = 0;
    for entry in entries {
        running = running.checked_add(entry.delta).ok_or_else(|| {
            Error::InvariantViolation(format!("Ledger overflow for {}", user.id))
        })?;
        if running != entry.balance_after {
            return Err(Error::InvariantViolation(format!(
                "Entry {} for {} records balance {} but log sums to {}",
                entry.sequence, user.id, entry.balance_after, running
            )));
        }
    }

    if running != user.credits {
        return Err(Error::InvariantViolation(format!(
            "Balance mismatch for {}: record {} != log {}",
            user.id, user.credits, running
        )));
    }

    Ok(())
}
