// src/config.rs
// =============================================================================
// Crawl configuration and its validation.
//
// The CLI (or a test) fills in a CrawlConfig with raw values. Before any
// network activity happens, `validate()` checks them and produces a CrawlPlan:
// the normalized seed URL, the crawl scope and the limits the scheduler runs
// with. A bad value is a ConfigError and the crawl never starts.
// =============================================================================

use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::crawl::{CrawlScope, FetchSettings, NormalizedUrl};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid seed URL '{seed}': {reason}")]
    InvalidSeed { seed: String, reason: String },
    #[error("max pages must be at least 1")]
    ZeroMaxPages,
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

// Raw, unchecked settings for one crawl run
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Domain ("example.com") or full URL ("https://example.com/start")
    pub seed: String,
    /// Link hops from the seed; 0 = only the seed page
    pub max_depth: usize,
    pub max_pages: usize,
    pub concurrency: usize,
    /// Also crawl *.domain, not just the seed's exact host
    pub include_subdomains: bool,
    pub fetch: FetchSettings,
}

impl CrawlConfig {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            max_depth: 3,
            max_pages: 50,
            concurrency: 4,
            include_subdomains: false,
            fetch: FetchSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<CrawlPlan, ConfigError> {
        if self.max_pages == 0 {
            return Err(ConfigError::ZeroMaxPages);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.fetch.timeout == Duration::ZERO {
            return Err(ConfigError::ZeroTimeout);
        }

        let seed_url = parse_seed(&self.seed)?;
        let (scope, seed) = CrawlScope::seed(&seed_url, self.include_subdomains).map_err(|e| {
            ConfigError::InvalidSeed {
                seed: self.seed.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(CrawlPlan {
            seed,
            scope,
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            concurrency: self.concurrency,
            fetch: self.fetch.clone(),
        })
    }
}

// Validated settings; only `CrawlConfig::validate()` builds one
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub seed: NormalizedUrl,
    pub scope: CrawlScope,
    pub max_depth: usize,
    pub max_pages: usize,
    pub concurrency: usize,
    pub fetch: FetchSettings,
}

// Accepts a bare domain and assumes http:// for it
fn parse_seed(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidSeed {
        seed: raw.to_string(),
        reason,
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))
}
