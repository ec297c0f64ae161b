use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::config::FetchConfig;

/// Why a single page could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    /// 404: the catalog has no page at this index.
    #[error("page {page} not found (HTTP 404)")]
    NotFound { page: u32 },

    #[error("page {page} returned HTTP {status}")]
    Status { page: u32, status: u16 },

    #[error("page {page} could not be fetched: {source}")]
    Transport {
        page: u32,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn from_status(page: u32, status: u16) -> Self {
        if status == StatusCode::NOT_FOUND.as_u16() {
            FetchError::NotFound { page }
        } else {
            FetchError::Status { page, status }
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            FetchError::NotFound { page }
            | FetchError::Status { page, .. }
            | FetchError::Transport { page, .. } => *page,
        }
    }

    /// Status code if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::NotFound { .. } => Some(StatusCode::NOT_FOUND.as_u16()),
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
        }
    }

    pub fn is_end_of_catalog(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Source of raw catalog pages, one call per page index (1-based). No retries.
#[allow(async_fn_in_trait)]
pub trait PageFetcher {
    async fn fetch(&self, page: u32) -> Result<String, FetchError>;
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
    url_pattern: String,
}

impl HttpPageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.google.com/"));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url_pattern: config.url_pattern.clone(),
        })
    }

    pub fn page_url(&self, page: u32) -> String {
        page_url(&self.url_pattern, page)
    }
}

impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, page: u32) -> Result<String, FetchError> {
        let url = self.page_url(page);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Transport { page, source })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::from_status(page, status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|source| FetchError::Transport { page, source })
    }
}

fn page_url(pattern: &str, page: u32) -> String {
    pattern.replace("{page}", &page.to_string())
}
