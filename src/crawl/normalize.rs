// src/crawl/normalize.rs
// =============================================================================
// This module turns raw hrefs into canonical, in-scope URLs.
//
// Every URL the crawler compares, stores in the visited set or puts on the
// frontier goes through `normalize()` first, so two hrefs that point to the
// same page ("/about", "https://EXAMPLE.com:443/about#team") end up equal.
//
// What normalization does:
// - Resolves relative links against the page they were found on
// - Lower-cases the host and drops default ports (:80 for http, :443 for https)
// - Strips the #fragment
// - Keeps the query string exactly as written
//
// What it rejects:
// - Anything that is not http/https (mailto:, tel:, javascript:, data: ...)
// - Hosts outside the crawl scope
//
// The function is pure: no shared state, safe to call from every worker.
//
// Rust concepts:
// - Newtype: NormalizedUrl wraps Url so an unchecked URL cannot be passed
//   where a checked one is expected
// - thiserror: Derives Display and Error for the Rejected enum
// =============================================================================

use std::fmt;
use thiserror::Error;
use url::Url;

// A URL in canonical form
//
// Only `normalize()` and `CrawlScope::seed()` can build one, so holding a
// NormalizedUrl means the URL is http(s), fragment-free and in scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

// Why an href was not turned into a NormalizedUrl
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("empty href")]
    Empty,
    #[error("fragment-only href")]
    FragmentOnly,
    #[error("malformed URL: {0}")]
    Malformed(String),
    #[error("unsupported scheme '{0}'")]
    Scheme(String),
    #[error("host '{0}' is outside the crawl scope")]
    OutOfScope(String),
}

impl Rejected {
    // True when the href pointed at a real web page on another host
    pub fn is_external(&self) -> bool {
        matches!(self, Rejected::OutOfScope(_))
    }
}

// Which hosts the crawl is allowed to visit
//
// Exact-host match by default: "example.com" does NOT cover
// "blog.example.com" unless include_subdomains is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlScope {
    host: String,
    include_subdomains: bool,
}

impl CrawlScope {
    // Builds the scope from a seed URL and returns the normalized seed with it
    pub fn seed(seed: &Url, include_subdomains: bool) -> Result<(Self, NormalizedUrl), Rejected> {
        let host = seed
            .host_str()
            .ok_or_else(|| Rejected::Malformed(format!("no host in '{}'", seed)))?
            .to_ascii_lowercase();

        let scope = CrawlScope { host, include_subdomains };
        let normalized = normalize(seed, seed.as_str(), &scope)?;
        Ok((scope, normalized))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn contains(&self, host: &str) -> bool {
        if host.eq_ignore_ascii_case(&self.host) {
            return true;
        }
        self.include_subdomains
            && host.len() > self.host.len()
            && host.to_ascii_lowercase().ends_with(&format!(".{}", self.host))
    }
}

// Canonicalizes `raw_href` relative to `base` and checks it against `scope`
//
// Examples (base = https://example.com/blog/post, scope = example.com):
//   "../about#team"              -> https://example.com/about
//   "HTTPS://Example.COM:443/x"  -> https://example.com/x
//   "/search?q=rust"             -> https://example.com/search?q=rust
//   "mailto:hi@example.com"      -> Rejected::Scheme
//   "https://other.com/"         -> Rejected::OutOfScope
pub fn normalize(base: &Url, raw_href: &str, scope: &CrawlScope) -> Result<NormalizedUrl, Rejected> {
    let href = raw_href.trim();
    if href.is_empty() {
        return Err(Rejected::Empty);
    }
    if href.starts_with('#') {
        return Err(Rejected::FragmentOnly);
    }

    // join() handles both absolute and relative hrefs
    let mut url = base
        .join(href)
        .map_err(|e| Rejected::Malformed(format!("{}: {}", href, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(Rejected::Scheme(other.to_string())),
    }

    let host = match url.host_str() {
        Some(host) => host.to_ascii_lowercase(),
        None => return Err(Rejected::Malformed(format!("no host in '{}'", href))),
    };
    if !scope.contains(&host) {
        return Err(Rejected::OutOfScope(host));
    }

    url.set_fragment(None);

    // The url crate already lower-cases hosts and drops default ports for
    // http(s), but an explicit port equal to the default must not survive
    // either way.
    if url.port().is_some() && url.port() == default_port(url.scheme()) {
        url.set_port(None)
            .map_err(|_| Rejected::Malformed(format!("cannot clear port on '{}'", href)))?;
    }

    Ok(NormalizedUrl(url))
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}
