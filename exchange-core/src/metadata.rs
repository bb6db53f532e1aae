//! Book metadata lookup port
//!
//! The exchange never talks to a book-data service directly. Listing by ISBN
//! goes through a [`MetadataProvider`]; HTTP implementations live in the
//! `isbn-adapters` crate.

use crate::types::BookMetadata;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Normalised ISBN: uppercase digits and `X`, 10 or 13 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Isbn(String);

impl Isbn {
    /// Normalise user input (dashes, spaces and other noise are dropped)
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned: String = raw
            .chars()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| c.is_ascii_digit() || *c == 'X')
            .collect();

        match cleaned.len() {
            10 | 13 => Ok(Self(cleaned)),
            _ => Err(Error::InvalidIsbn(raw.to_string())),
        }
    }

    /// Normalised form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a provider could not answer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// Provider has no record for the ISBN
    #[error("not found")]
    NotFound,

    /// Network or HTTP failure
    #[error("transport: {0}")]
    Transport(String),

    /// Response could not be decoded
    #[error("decode: {0}")]
    Decode(String),
}

/// External book-data provider
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Look up title, author and cover by ISBN
    async fn lookup_by_isbn(&self, isbn: &Isbn) -> std::result::Result<BookMetadata, LookupError>;
}

/// In-memory provider, seeded up front
#[derive(Debug, Default, Clone)]
pub struct StaticMetadataProvider {
    records: HashMap<String, BookMetadata>,
}

impl StaticMetadataProvider {
    /// Empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record
    pub fn with_record(mut self, isbn: &Isbn, metadata: BookMetadata) -> Self {
        self.records.insert(isbn.as_str().to_string(), metadata);
        self
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadataProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn lookup_by_isbn(&self, isbn: &Isbn) -> std::result::Result<BookMetadata, LookupError> {
        self.records
            .get(isbn.as_str())
            .cloned()
            .ok_or(LookupError::NotFound)
    }
}

/// Tries providers in order; the first hit wins
#[derive(Clone, Default)]
pub struct FallbackChain {
    providers: Vec<Arc<dyn MetadataProvider>>,
}

impl fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("FallbackChain").field("providers", &names).finish()
    }
}

impl FallbackChain {
    /// Empty chain (every lookup fails)
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider
    pub fn then(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.providers.push(provider);
        self
    }
}

#[async_trait]
impl MetadataProvider for FallbackChain {
    fn name(&self) -> &str {
        "fallback-chain"
    }

    async fn lookup_by_isbn(&self, isbn: &Isbn) -> std::result::Result<BookMetadata, LookupError> {
        let mut last = LookupError::NotFound;

        for provider in &self.providers {
            match provider.lookup_by_isbn(isbn).await {
                Ok(metadata) => {
                    tracing::debug!(isbn = %isbn, provider = provider.name(), "Metadata found");
                    return Ok(metadata);
                }
                Err(err) => {
                    tracing::warn!(
                        isbn = %isbn,
                        provider = provider.name(),
                        error = %err,
                        "Metadata provider failed, trying next"
                    );
                    last = err;
                }
            }
        }

        Err(last)
    }
}
