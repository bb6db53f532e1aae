//! # ISBN Adapters
//!
//! HTTP implementations of the exchange's book metadata port:
//! - Google Books volumes search
//! - OpenLibrary books API
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  FallbackChain (exchange-core)       │
//! └──────────┬───────────────────────────┘
//!            │ first hit wins
//!     ┌──────┴───────┐
//! ┌───▼────────┐ ┌───▼──────────┐
//! │ Google     │ │ OpenLibrary  │
//! │ Books      │ │              │
//! └────────────┘ └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod error;
pub mod google;
pub mod open_library;

pub use error::{Error, Result};
pub use google::GoogleBooksProvider;
pub use open_library::OpenLibraryProvider;

use exchange_core::metadata::FallbackChain;
use std::sync::Arc;
use std::time::Duration;

/// Default Google Books API base URL
pub const DEFAULT_GOOGLE_BOOKS_URL: &str = "https://www.googleapis.com";

/// Default OpenLibrary base URL
pub const DEFAULT_OPEN_LIBRARY_URL: &str = "https://openlibrary.org";

/// Default request timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// Default user agent
pub const DEFAULT_USER_AGENT: &str = concat!("book-exchange/", env!("CARGO_PKG_VERSION"));

/// Placeholder for missing title or author
pub(crate) const UNKNOWN: &str = "Unknown";

/// Adapter configuration
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Google Books base URL
    pub google_books_url: String,
    /// OpenLibrary base URL
    pub open_library_url: String,
    /// Per-request timeout
    pub timeout_seconds: u64,
    /// User agent sent to providers
    pub user_agent: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            google_books_url: DEFAULT_GOOGLE_BOOKS_URL.to_string(),
            open_library_url: DEFAULT_OPEN_LIBRARY_URL.to_string(),
            timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl AdapterConfig {
    /// Defaults overridden by `EXCHANGE_GOOGLE_BOOKS_URL`,
    /// `EXCHANGE_OPEN_LIBRARY_URL` and `EXCHANGE_LOOKUP_TIMEOUT_SECONDS`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("EXCHANGE_GOOGLE_BOOKS_URL") {
            config.google_books_url = url;
        }
        if let Ok(url) = std::env::var("EXCHANGE_OPEN_LIBRARY_URL") {
            config.open_library_url = url;
        }
        if let Ok(raw) = std::env::var("EXCHANGE_LOOKUP_TIMEOUT_SECONDS") {
            config.timeout_seconds = raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("EXCHANGE_LOOKUP_TIMEOUT_SECONDS: {}", e)))?;
        }

        Ok(config)
    }

    pub(crate) fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(e.to_string()))
    }
}

/// Google Books first, OpenLibrary as fallback
pub fn default_chain(config: &AdapterConfig) -> Result<FallbackChain> {
    Ok(FallbackChain::new()
        .then(Arc::new(GoogleBooksProvider::new(config)?))
        .then(Arc::new(OpenLibraryProvider::new(config)?)))
}

/// Trim a provider URL and drop a trailing slash
pub(crate) fn base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Body of a successful response; non-2xx becomes `ProviderApi`
pub(crate) async fn checked_body(response: reqwest::Response) -> Result<Vec<u8>> {
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(Error::ProviderApi {
            status_code: status.as_u16(),
            message: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    Ok(body.to_vec())
}
