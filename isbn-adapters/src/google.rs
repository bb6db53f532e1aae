//! Google Books provider

use crate::{base_url, checked_body, AdapterConfig, Error, Result, UNKNOWN};
use async_trait::async_trait;
use exchange_core::{BookMetadata, Isbn, LookupError, MetadataProvider};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    volume_info: VolumeInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    description: Option<String>,
    image_links: Option<ImageLinks>,
}

#[derive(Debug, Deserialize)]
struct ImageLinks {
    thumbnail: Option<String>,
}

impl VolumeInfo {
    fn into_metadata(self) -> BookMetadata {
        let cover = self
            .image_links
            .and_then(|links| links.thumbnail)
            .filter(|url| !url.is_empty())
            .map(|url| match url.strip_prefix("http://") {
                Some(rest) => format!("https://{}", rest),
                None => url,
            });

        BookMetadata {
            title: self.title.unwrap_or_else(|| UNKNOWN.to_string()),
            author: self
                .authors
                .into_iter()
                .next()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            cover,
            description: self.description.filter(|d| !d.is_empty()),
        }
    }
}

/// Google Books volumes search
#[derive(Debug, Clone)]
pub struct GoogleBooksProvider {
    client: Client,
    base_url: String,
}

impl GoogleBooksProvider {
    /// Create provider
    pub fn new(config: &AdapterConfig) -> Result<Self> {
        Ok(Self {
            client: config.client()?,
            base_url: base_url(&config.google_books_url),
        })
    }

    async fn fetch(&self, isbn: &Isbn) -> Result<BookMetadata> {
        let url = format!("{}/books/v1/volumes", self.base_url);
        debug!(isbn = %isbn, url = %url, "Querying Google Books");

        let response = self
            .client
            .get(&url)
            .query(&[("q", format!("isbn:{}", isbn))])
            .send()
            .await?;

        let body = checked_body(response).await?;
        let decoded: VolumesResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::Decode(format!("invalid Google Books payload: {}", e)))?;

        decoded
            .items
            .into_iter()
            .next()
            .map(|volume| volume.volume_info.into_metadata())
            .ok_or_else(|| Error::NotFound(isbn.to_string()))
    }
}

#[async_trait]
impl MetadataProvider for GoogleBooksProvider {
    fn name(&self) -> &str {
        "google-books"
    }

    async fn lookup_by_isbn(&self, isbn: &Isbn) -> std::result::Result<BookMetadata, LookupError> {
        self.fetch(isbn).await.map_err(LookupError::from)
    }
}
