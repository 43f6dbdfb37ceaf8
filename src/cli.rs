// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// We use the "derive" API: the CLI is a plain struct and clap generates the
// parsing, --help and --version from the attributes.
// =============================================================================

use clap::{ArgAction, Parser};
use std::time::Duration;

use crate::config::CrawlConfig;
use crate::crawl::FetchSettings;

#[derive(Parser, Debug)]
#[command(
    name = "seo-auditor",
    version = "0.1.0",
    about = "Crawl a website and report on-page SEO issues",
    long_about = "seo-auditor crawls a website breadth-first from a seed domain and checks every \
                  page for missing or badly sized titles and meta descriptions, heading structure \
                  problems, images without alt text and broken internal links.",
    after_help = "Examples:\n  \
                  seo-auditor example.com                  # Basic crawl\n  \
                  seo-auditor example.com -d 5 -p 100      # 5 levels deep, at most 100 pages\n  \
                  seo-auditor https://example.com --json   # Machine-readable report"
)]
pub struct Cli {
    /// Domain or URL to start from (e.g., example.com or https://example.com/blog)
    pub domain: String,

    /// Maximum crawl depth in link hops from the start page (0 = start page only)
    #[arg(short = 'd', long = "depth", default_value_t = 3)]
    pub depth: usize,

    /// Maximum number of pages to fetch
    #[arg(short = 'p', long, default_value_t = 50)]
    pub max_pages: usize,

    /// Number of pages fetched in parallel
    #[arg(short = 'c', long, default_value_t = 4)]
    pub concurrency: usize,

    /// Also crawl subdomains of the start host
    #[arg(long)]
    pub include_subdomains: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Maximum redirects followed per request
    #[arg(long, default_value_t = 5)]
    pub max_redirects: usize,

    /// User-Agent header sent with every request
    #[arg(long, default_value = "SEOAuditTool/1.0")]
    pub user_agent: String,

    /// Output the report as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn crawl_config(&self) -> CrawlConfig {
        let mut config = CrawlConfig::new(self.domain.clone());
        config.max_depth = self.depth;
        config.max_pages = self.max_pages;
        config.concurrency = self.concurrency;
        config.include_subdomains = self.include_subdomains;
        config.fetch = FetchSettings {
            timeout: Duration::from_secs(self.timeout),
            max_redirects: self.max_redirects,
            user_agent: self.user_agent.clone(),
        };
        config
    }
}
