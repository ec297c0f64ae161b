use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

pub const DEFAULT_TARGET_COUNT: usize = 50;
pub const DEFAULT_PAGE_CEILING: u32 = 5;
pub const DEFAULT_DB_PATH: &str = "data/books.sqlite";
pub const DEFAULT_STAGING_PATH: &str = "data/staged_books.json";
pub const DEFAULT_URL_PATTERN: &str = "http://books.toscrape.com/catalogue/page-{page}.html";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

/// HTTP settings for the page fetcher. `url_pattern` must contain `{page}`.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub url_pattern: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url_pattern: DEFAULT_URL_PATTERN.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Everything one run needs. `connection` is the SQLite file the loader writes to.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub target_count: usize,
    pub page_ceiling: u32,
    pub connection: PathBuf,
    pub fetch: FetchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_count: DEFAULT_TARGET_COUNT,
            page_ceiling: DEFAULT_PAGE_CEILING,
            connection: PathBuf::from(DEFAULT_DB_PATH),
            fetch: FetchConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target_count == 0 {
            bail!("target count must be at least 1");
        }
        if self.page_ceiling == 0 {
            bail!("page ceiling must be at least 1");
        }
        if !self.fetch.url_pattern.contains("{page}") {
            bail!(
                "URL pattern {:?} has no {{page}} placeholder",
                self.fetch.url_pattern
            );
        }
        if self.fetch.timeout.is_zero() {
            bail!("fetch timeout must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_daily_job() {
        let c = PipelineConfig::default();
        assert_eq!(c.target_count, 50);
        assert_eq!(c.page_ceiling, 5);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_zero_target() {
        let c = PipelineConfig {
            target_count: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_zero_ceiling() {
        let c = PipelineConfig {
            page_ceiling: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_pattern_without_placeholder() {
        let mut c = PipelineConfig::default();
        c.fetch.url_pattern = "http://books.toscrape.com/catalogue/page-1.html".into();
        let err = c.validate().unwrap_err().to_string();
        assert!(err.contains("{page}"), "unexpected message: {}", err);
    }
}
