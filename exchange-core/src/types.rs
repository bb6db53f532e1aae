//! Core types for the exchange
//!
//! All persisted types are designed for:
//! - Deterministic serialization (bincode)
//! - Integer credits (no fractional balances)
//! - Time-ordered identifiers (UUIDv7)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh, time-ordered identifier
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Underlying UUID
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Raw key bytes for storage
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// User (account) identifier
    UserId
);
id_type!(
    /// Book identifier
    BookId
);
id_type!(
    /// Lending transaction identifier
    TransactionId
);

/// Identity supplied at signup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    /// Login email, unique across the exchange
    pub email: String,
    /// Name shown to other members
    pub display_name: String,
    /// Unit / address identifier within the community
    pub unit: String,
    /// Contact handle (e.g. a messaging number), disclosed per transaction
    pub contact_handle: String,
}

/// A member of the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique ID
    pub id: UserId,
    /// Login email
    pub email: String,
    /// Display name
    pub display_name: String,
    /// Unit / address identifier
    pub unit: String,
    /// Contact handle
    pub contact_handle: String,
    /// Credit balance, written only by the credit ledger
    pub(crate) credits: i64,
    /// Signup timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    pub(crate) fn new(identity: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::generate(),
            email: identity.email,
            display_name: identity.display_name,
            unit: identity.unit,
            contact_handle: identity.contact_handle,
            credits: 0,
            created_at: now,
        }
    }

    /// Current credit balance
    pub fn credits(&self) -> i64 {
        self.credits
    }

    /// Profile safe to show to any member
    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            display_name: self.display_name.clone(),
            unit: self.unit.clone(),
        }
    }
}

/// User fields visible without a lending relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    /// User ID
    pub id: UserId,
    /// Display name
    pub display_name: String,
    /// Unit / address identifier
    pub unit: String,
}

/// Contact details disclosed to a lending counterpart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCard {
    /// Whose contact this is
    pub user: UserId,
    /// Display name
    pub display_name: String,
    /// Unit / address identifier
    pub unit: String,
    /// Contact handle
    pub contact_handle: String,
}

/// Book category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Fiction
    Fiction,
    /// Non-Fiction
    NonFiction,
    /// Sci-Fi
    SciFi,
    /// Mystery
    Mystery,
    /// Romance
    Romance,
    /// Self-Help
    SelfHelp,
    /// Business
    Business,
    /// Academic
    Academic,
    /// Biographies
    Biographies,
}

impl Category {
    /// Every category, in display order
    pub const ALL: [Category; 9] = [
        Category::Fiction,
        Category::NonFiction,
        Category::SciFi,
        Category::Mystery,
        Category::Romance,
        Category::SelfHelp,
        Category::Business,
        Category::Academic,
        Category::Biographies,
    ];

    /// Display name
    pub fn label(&self) -> &'static str {
        match self {
            Category::Fiction => "Fiction",
            Category::NonFiction => "Non-Fiction",
            Category::SciFi => "Sci-Fi",
            Category::Mystery => "Mystery",
            Category::Romance => "Romance",
            Category::SelfHelp => "Self-Help",
            Category::Business => "Business",
            Category::Academic => "Academic",
            Category::Biographies => "Biographies",
        }
    }

    /// Parse a discovery filter value; "All" or blank means any category
    pub fn parse_filter(s: &str) -> std::result::Result<Option<Category>, String> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(None);
        }
        s.parse().map(Some)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// Physical condition of a listed copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Minor wear
    Good,
    /// Readable, some damage
    Fair,
    /// Heavily worn
    Poor,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Condition::Good => "Good",
            Condition::Fair => "Fair",
            Condition::Poor => "Poor",
        })
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "good" => Ok(Condition::Good),
            "fair" => Ok(Condition::Fair),
            "poor" => Ok(Condition::Poor),
            _ => Err(format!("unknown condition: {}", s)),
        }
    }
}

/// Bibliographic data, either typed in or fetched from a metadata provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    /// Title
    pub title: String,
    /// Primary author
    pub author: String,
    /// Cover image reference (URL)
    pub cover: Option<String>,
    /// Blurb
    pub description: Option<String>,
}

/// Everything needed to list a copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Normalised ISBN
    pub isbn: crate::metadata::Isbn,
    /// Bibliographic data
    pub metadata: BookMetadata,
    /// Category
    pub category: Category,
    /// Condition
    pub condition: Condition,
}

/// Book availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BookStatus {
    /// Open for borrow requests
    Available = 1,
    /// Has an active, non-terminal transaction
    Unavailable = 2,
}

/// A listed physical copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Unique ID
    pub id: BookId,
    /// Owner, immutable after listing
    pub owner: UserId,
    /// Normalised ISBN
    pub isbn: String,
    /// Title
    pub title: String,
    /// Author
    pub author: String,
    /// Cover reference
    pub cover: Option<String>,
    /// Blurb
    pub description: Option<String>,
    /// Category
    pub category: Category,
    /// Condition
    pub condition: Condition,
    /// Availability, written only by the catalog
    pub(crate) status: BookStatus,
    /// Listing timestamp
    pub listed_at: DateTime<Utc>,
}

impl Book {
    pub(crate) fn new(owner: UserId, listing: Listing, now: DateTime<Utc>) -> Self {
        Self {
            id: BookId::generate(),
            owner,
            isbn: listing.isbn.as_str().to_string(),
            title: listing.metadata.title,
            author: listing.metadata.author,
            cover: listing.metadata.cover,
            description: listing.metadata.description,
            category: listing.category,
            condition: listing.condition,
            status: BookStatus::Available,
            listed_at: now,
        }
    }

    /// Current availability
    pub fn status(&self) -> BookStatus {
        self.status
    }

    /// Whether the book can be requested
    pub fn is_available(&self) -> bool {
        self.status == BookStatus::Available
    }
}

/// Lending transaction status
///
/// Ordered: `Requested -> Approved -> Completed -> Returned`, with
/// `Cancelled` reachable from `Requested` or `Approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Borrower asked, owner has not answered
    Requested = 1,
    /// Owner consented
    Approved = 2,
    /// Book physically with the borrower
    Completed = 3,
    /// Book back with the owner (terminal)
    Returned = 4,
    /// Abandoned before handover (terminal)
    Cancelled = 5,
}

impl TransactionStatus {
    /// Terminal states release the book for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Returned | TransactionStatus::Cancelled)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionStatus::Requested => "Requested",
            TransactionStatus::Approved => "Approved",
            TransactionStatus::Completed => "Completed",
            TransactionStatus::Returned => "Returned",
            TransactionStatus::Cancelled => "Cancelled",
        })
    }
}

/// Action applied to an existing transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Owner consents
    Approve,
    /// Owner hands the book over
    Handover,
    /// Physical return confirmed
    Return,
    /// Either party abandons before handover
    Cancel,
}

impl Action {
    /// Metric / log label
    pub fn label(&self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::Handover => "handover",
            Action::Return => "return",
            Action::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Audit record of one status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Status entered
    pub status: TransactionStatus,
    /// Who caused it
    pub actor: UserId,
    /// When
    pub at: DateTime<Utc>,
}

/// One loan of one book between a borrower and the owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique ID
    pub id: TransactionId,
    /// Book on loan
    pub book: BookId,
    /// Borrower
    pub borrower: UserId,
    /// Owner at request time
    pub owner: UserId,
    /// Current status, written only by the transaction manager
    pub(crate) status: TransactionStatus,
    /// Credits charged to the borrower at request time
    pub cost: i64,
    /// Request timestamp
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
    /// Every status the transaction has entered, oldest first
    pub history: Vec<StatusChange>,
}

impl Transaction {
    pub(crate) fn open(book: &Book, borrower: UserId, cost: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: TransactionId::generate(),
            book: book.id,
            borrower,
            owner: book.owner,
            status: TransactionStatus::Requested,
            cost,
            created_at: now,
            updated_at: now,
            history: vec![StatusChange {
                status: TransactionStatus::Requested,
                actor: borrower,
                at: now,
            }],
        }
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Whether the transaction still holds its book
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Whether `user` is the borrower or the owner
    pub fn involves(&self, user: UserId) -> bool {
        self.borrower == user || self.owner == user
    }

    pub(crate) fn advance(&mut self, status: TransactionStatus, actor: UserId, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
        self.history.push(StatusChange { status, actor, at: now });
    }
}

/// Transaction joined with its book and participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetails {
    /// The transaction
    pub transaction: Transaction,
    /// The book
    pub book: Book,
    /// Borrower profile
    pub borrower: PublicProfile,
    /// Owner profile
    pub owner: PublicProfile,
}

/// Why credits moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CreditReason {
    /// Starting bonus
    Signup = 1,
    /// Reward for listing a book
    ListingReward = 2,
    /// Cost of a borrow request
    BorrowCost = 3,
    /// Borrow cost returned on cancellation
    RefundOnCancel = 4,
}

impl CreditReason {
    /// Metric / log label
    pub fn label(&self) -> &'static str {
        match self {
            CreditReason::Signup => "signup",
            CreditReason::ListingReward => "listing_reward",
            CreditReason::BorrowCost => "borrow_cost",
            CreditReason::RefundOnCancel => "refund_on_cancel",
        }
    }
}

/// Event that triggered a posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryReference {
    /// Account opening
    Account(UserId),
    /// A listing
    Listing(BookId),
    /// A lending transaction
    Transaction(TransactionId),
}

/// One posting in the credit ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Global posting sequence
    pub sequence: u64,
    /// Account posted to
    pub account: UserId,
    /// Signed change
    pub delta: i64,
    /// Balance after this posting
    pub balance_after: i64,
    /// Reason code
    pub reason: CreditReason,
    /// Triggering event
    pub reference: EntryReference,
    /// Posting time
    pub recorded_at: DateTime<Utc>,
}
