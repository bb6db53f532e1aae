//! Metrics collection for observability
//!
//! Prometheus counters, registered in a registry owned by one exchange
//! instance.
//!
//! # Metrics
//!
//! - `exchange_transitions_total{action}` - Applied lifecycle actions (including `request`)
//! - `exchange_guard_rejections_total{reason}` - Operations refused by a guard
//! - `exchange_credits_issued_total` - Credits granted (signup, listing, refunds)
//! - `exchange_credits_spent_total` - Credits charged for borrow requests
//! - `exchange_books_listed_total` - Books listed
//! - `exchange_users_total` - Accounts created

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Applied transitions by action
    pub transitions_total: IntCounterVec,

    /// Guard rejections by reason
    pub guard_rejections_total: IntCounterVec,

    /// Credits granted
    pub credits_issued: IntCounter,

    /// Credits charged
    pub credits_spent: IntCounter,

    /// Books listed
    pub books_listed: IntCounter,

    /// Accounts created
    pub users_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("users_total", &self.users_total.get())
            .field("books_listed", &self.books_listed.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transitions_total = IntCounterVec::new(
            Opts::new("exchange_transitions_total", "Applied lifecycle actions"),
            &["action"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        let guard_rejections_total = IntCounterVec::new(
            Opts::new(
                "exchange_guard_rejections_total",
                "Operations refused by a guard",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(guard_rejections_total.clone()))?;

        let credits_issued = IntCounter::new("exchange_credits_issued_total", "Credits granted")?;
        registry.register(Box::new(credits_issued.clone()))?;

        let credits_spent = IntCounter::new("exchange_credits_spent_total", "Credits charged")?;
        registry.register(Box::new(credits_spent.clone()))?;

        let books_listed = IntCounter::new("exchange_books_listed_total", "Books listed")?;
        registry.register(Box::new(books_listed.clone()))?;

        let users_total = IntCounter::new("exchange_users_total", "Accounts created")?;
        registry.register(Box::new(users_total.clone()))?;

        Ok(Self {
            transitions_total,
            guard_rejections_total,
            credits_issued,
            credits_spent,
            books_listed,
            users_total,
            registry,
        })
    }

    /// Record an applied action
    pub fn record_transition(&self, action: &str) {
        self.transitions_total.with_label_values(&[action]).inc();
    }

    /// Record a refused operation
    pub fn record_rejection(&self, reason: &str) {
        self.guard_rejections_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a committed posting
    pub fn record_posting(&self, delta: i64) {
        if delta >= 0 {
            self.credits_issued.inc_by(delta.unsigned_abs());
        } else {
            self.credits_spent.inc_by(delta.unsigned_abs());
        }
    }

    /// Record a new listing
    pub fn record_book_listed(&self) {
        self.books_listed.inc();
    }

    /// Record a signup
    pub fn record_user_created(&self) {
        self.users_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every metric in the text exposition format
    pub fn gather_text(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
