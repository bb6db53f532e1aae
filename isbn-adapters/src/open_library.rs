//! OpenLibrary provider
//!
//! Uses the books API with `jscmd=data`, which answers with an object keyed
//! by the requested bibkey (`ISBN:<isbn>`), or `{}` when nothing matched.

use crate::{base_url, checked_body, AdapterConfig, Error, Result, UNKNOWN};
use async_trait::async_trait;
use exchange_core::{BookMetadata, Isbn, LookupError, MetadataProvider};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Record {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<Author>,
    cover: Option<Cover>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Cover {
    medium: Option<String>,
}

/// OpenLibrary books API
#[derive(Debug, Clone)]
pub struct OpenLibraryProvider {
    client: Client,
    base_url: String,
}

impl OpenLibraryProvider {
    /// Create provider
    pub fn new(config: &AdapterConfig) -> Result<Self> {
        Ok(Self {
            client: config.client()?,
            base_url: base_url(&config.open_library_url),
        })
    }

    async fn fetch(&self, isbn: &Isbn) -> Result<BookMetadata> {
        let bibkey = format!("ISBN:{}", isbn);
        let url = format!("{}/api/books", self.base_url);
        debug!(isbn = %isbn, url = %url, "Querying OpenLibrary");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("bibkeys", bibkey.as_str()),
                ("jscmd", "data"),
                ("format", "json"),
            ])
            .send()
            .await?;

        let body = checked_body(response).await?;
        let mut decoded: HashMap<String, Record> = serde_json::from_slice(&body)
            .map_err(|e| Error::Decode(format!("invalid OpenLibrary payload: {}", e)))?;

        let record = decoded
            .remove(&bibkey)
            .ok_or_else(|| Error::NotFound(isbn.to_string()))?;

        Ok(BookMetadata {
            title: record.title.unwrap_or_else(|| UNKNOWN.to_string()),
            author: record
                .authors
                .into_iter()
                .next()
                .map(|a| a.name)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            cover: record.cover.and_then(|c| c.medium).filter(|url| !url.is_empty()),
            description: None,
        })
    }
}

#[async_trait]
impl MetadataProvider for OpenLibraryProvider {
    fn name(&self) -> &str {
        "open-library"
    }

    async fn lookup_by_isbn(&self, isbn: &Isbn) -> std::result::Result<BookMetadata, LookupError> {
        self.fetch(isbn).await.map_err(LookupError::from)
    }
}
