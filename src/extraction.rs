use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fetcher::{FetchError, PageFetcher};
use crate::parser::{self, MalformedPage};
use crate::record::BookRecord;

/// Why the page loop ended.
#[derive(Debug)]
pub enum StopReason {
    TargetReached,
    PageCeiling,
    /// The catalog answered 404 for this page.
    EndOfCatalog { page: u32 },
    FetchFailed(FetchError),
}

impl StopReason {
    /// A stop that the scheduler may want to retry the whole job for.
    pub fn is_transient_failure(&self) -> bool {
        matches!(self, StopReason::FetchFailed(_))
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::TargetReached => write!(f, "target reached"),
            StopReason::PageCeiling => write!(f, "page ceiling reached"),
            StopReason::EndOfCatalog { page } => write!(f, "catalog ended at page {}", page),
            StopReason::FetchFailed(e) => write!(f, "fetch failed: {}", e),
        }
    }
}

/// Outcome of one extraction pass. `records` never exceeds the requested count.
#[derive(Debug)]
pub struct Extraction {
    pub records: Vec<BookRecord>,
    pub pages_fetched: u32,
    pub stop: StopReason,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("target count must be at least 1")]
    InvalidTarget,

    #[error("page ceiling must be at least 1")]
    InvalidCeiling,

    #[error("page {page} is malformed: {source}")]
    MalformedPage {
        page: u32,
        #[source]
        source: MalformedPage,
    },
}

/// Walk catalog pages 1..=page_ceiling until `target_count` records are collected.
///
/// A failed fetch ends the walk but keeps what earlier pages produced; the
/// failure is returned in [`Extraction::stop`]. A malformed page aborts the
/// whole extraction.
pub async fn extract<F: PageFetcher>(
    fetcher: &F,
    target_count: usize,
    page_ceiling: u32,
) -> Result<Extraction, ExtractError> {
    if target_count == 0 {
        return Err(ExtractError::InvalidTarget);
    }
    if page_ceiling == 0 {
        return Err(ExtractError::InvalidCeiling);
    }

    let mut records: Vec<BookRecord> = Vec::new();
    let mut page: u32 = 1;
    let mut pages_fetched: u32 = 0;
    let mut failure: Option<FetchError> = None;

    while records.len() < target_count && page <= page_ceiling {
        let raw = match fetcher.fetch(page).await {
            Ok(raw) => raw,
            Err(e) => {
                failure = Some(e);
                break;
            }
        };
        pages_fetched += 1;

        let found = parser::extract_records(&raw)
            .map_err(|source| ExtractError::MalformedPage { page, source })?;
        debug!("Page {}: {} records", page, found.len());
        records.extend(found);
        page += 1;
    }

    let stop = match failure {
        Some(e) if e.is_end_of_catalog() => {
            info!("Reached end of catalog at page {}", e.page());
            StopReason::EndOfCatalog { page: e.page() }
        }
        Some(e) => {
            warn!(
                "Failed to reach page {} (status {}): {}",
                e.page(),
                e.status()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".into()),
                e
            );
            StopReason::FetchFailed(e)
        }
        None if records.len() >= target_count => StopReason::TargetReached,
        None => {
            info!("Stopped at page ceiling ({} pages) short of target", page_ceiling);
            StopReason::PageCeiling
        }
    };

    records.truncate(target_count);
    info!(
        "Extracted {} books from {} pages (target {})",
        records.len(),
        pages_fetched,
        target_count
    );

    Ok(Extraction {
        records,
        pages_fetched,
        stop,
    })
}
