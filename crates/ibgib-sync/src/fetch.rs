//! Content fetch
//!
//! `GET <base_json_path><percent-encoded id>` returns a snapshot document.

use crate::error::FetchError;
use dashmap::DashMap;
use ibgib_content::{ContentSnapshot, IbGibId};
use reqwest::Url;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Source of snapshots not yet cached
#[async_trait::async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch the snapshot for `id`
    async fn fetch(&self, id: &IbGibId) -> Result<ContentSnapshot, FetchError>;
}

/// HTTP fetcher using reqwest
#[derive(Debug, Clone)]
pub struct HttpContentFetcher {
    client: reqwest::Client,
    base: Url,
}

impl HttpContentFetcher {
    /// Create fetcher for a base path
    ///
    /// # Errors
    /// [`FetchError::InvalidBase`] if the base is not a hierarchical URL
    pub fn new(base_json_path: &str) -> Result<Self, FetchError> {
        let base = Url::parse(base_json_path).map_err(|e| FetchError::InvalidBase(format!("{base_json_path}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(FetchError::InvalidBase(base_json_path.to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }

    /// URL for one id
    ///
    /// # Errors
    /// [`FetchError::InvalidBase`]
    pub fn url_for(&self, id: &IbGibId) -> Result<Url, FetchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::InvalidBase(self.base.to_string()))?
            .pop_if_empty()
            .push(&id.to_string());
        Ok(url)
    }
}

#[async_trait::async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, id: &IbGibId) -> Result<ContentSnapshot, FetchError> {
        let url = self.url_for(id)?;
        tracing::debug!(id = %id, url = %url, "fetching content");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Http { id: id.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                id: id.clone(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| FetchError::Http { id: id.clone(), source })?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode {
            id: id.clone(),
            reason: e.to_string(),
        })
    }
}

/// Fetcher over an in-memory document set
///
/// Serves offline sessions (everything already persisted) and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    documents: Arc<DashMap<IbGibId, ContentSnapshot>>,
    requests: Arc<AtomicUsize>,
}

impl MemoryFetcher {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `snapshot` under its derived id
    pub fn insert(&self, snapshot: ContentSnapshot) {
        self.documents.insert(snapshot.id(), snapshot);
    }

    /// Serve `snapshot` under an arbitrary id
    pub fn insert_as(&self, id: IbGibId, snapshot: ContentSnapshot) {
        self.documents.insert(id, snapshot);
    }

    /// Number of fetches so far
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

impl FromIterator<ContentSnapshot> for MemoryFetcher {
    fn from_iter<I: IntoIterator<Item = ContentSnapshot>>(iter: I) -> Self {
        let fetcher = Self::new();
        for snapshot in iter {
            fetcher.insert(snapshot);
        }
        fetcher
    }
}

#[async_trait::async_trait]
impl ContentFetcher for MemoryFetcher {
    async fn fetch(&self, id: &IbGibId) -> Result<ContentSnapshot, FetchError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.documents
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FetchError::NotFound(id.clone()))
    }
}
