// src/crawl/mod.rs
// =============================================================================
// This module handles website crawling.
//
// Submodules:
// - normalize: canonical URLs and the same-site scope check
// - fetch: one bounded HTTP GET, outcome sorted into success/failure kinds
// - scheduler: frontier, visited set and the worker pool that drives a run
//
// Features:
// - Breadth-first crawling starting from a seed URL
// - Same-domain restriction (exact host, optionally subdomains)
// - Depth and page-count limits
// - Bounded concurrency with a shared, de-duplicated frontier
// =============================================================================

mod fetch;
mod normalize;
mod scheduler;

pub use fetch::{Fetch, FetchFailure, FetchSettings, HttpFetcher};
pub use normalize::{normalize, CrawlScope, NormalizedUrl, Rejected};
pub use scheduler::{CrawlProgress, Crawler, ProgressFn};
