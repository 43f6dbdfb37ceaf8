// src/audit/parser.rs
// =============================================================================
// This module turns fetched HTML into a PageModel.
//
// We use the `scraper` crate which:
// - Parses HTML into a DOM (built on html5ever, the parser used by Servo)
// - Recovers from malformed markup the way a browser does
// - Supports CSS selectors for finding elements
//
// The parser never runs scripts and never fetches images or stylesheets.
// It reads the markup once and copies out exactly what the rules need, so
// the rule engine never has to look at raw HTML.
// =============================================================================

use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use thiserror::Error;
use url::Url;

use crate::crawl::{normalize, CrawlScope, NormalizedUrl, Rejected};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty response body")]
    EmptyBody,
    #[error("content is not markup ({0})")]
    NotMarkup(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub src: Option<String>,
    pub has_alt: bool,
    pub alt_text: Option<String>,
}

// Where an <a href> leads, as seen from the page it is on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Same site, crawlable
    Internal(NormalizedUrl),
    /// A web page on another host
    External,
    /// mailto:, tel:, javascript:, #fragment, empty or malformed
    Unfollowable(Rejected),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub target: LinkTarget,
}

// Everything the rule engine gets to see about a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageModel {
    pub url: NormalizedUrl,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: Vec<Heading>,
    pub images: Vec<Image>,
    pub links: Vec<Link>,
}

impl PageModel {
    // Crawlable links in document order
    pub fn internal_links(&self) -> impl Iterator<Item = &NormalizedUrl> {
        self.links.iter().filter_map(|link| match &link.target {
            LinkTarget::Internal(url) => Some(url),
            _ => None,
        })
    }
}

struct Selectors {
    title: Selector,
    meta: Selector,
    headings: Selector,
    images: Selector,
    anchors: Selector,
}

// Selectors are constants, so parsing them can only fail on a typo here
fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let parse = |css: &str| Selector::parse(css).expect("static CSS selector");
        Selectors {
            title: parse("title"),
            meta: parse("meta[name]"),
            headings: parse("h1, h2, h3, h4, h5, h6"),
            images: parse("img"),
            anchors: parse("a[href]"),
        }
    })
}

// Parses `body` (fetched from `url`) into a PageModel
//
// `content_type` is the response's Content-Type header if it had one.
pub fn parse(
    url: &NormalizedUrl,
    body: &str,
    content_type: Option<&str>,
    scope: &CrawlScope,
) -> Result<PageModel, ParseError> {
    if let Some(content_type) = content_type {
        if !is_markup_type(content_type) {
            return Err(ParseError::NotMarkup(content_type.to_string()));
        }
    }
    if body.trim().is_empty() {
        return Err(ParseError::EmptyBody);
    }
    if body.contains('\0') {
        return Err(ParseError::NotMarkup("binary data".to_string()));
    }

    let document = Html::parse_document(body);
    let selectors = selectors();

    let title = document
        .select(&selectors.title)
        .next()
        .map(|el| collapse_whitespace(&element_text(el)))
        .filter(|text| !text.is_empty());

    // The name attribute is case-insensitive in HTML, CSS attribute
    // selectors are not, so compare by hand
    let meta_description = document
        .select(&selectors.meta)
        .find(|el| {
            el.value()
                .attr("name")
                .is_some_and(|name| name.trim().eq_ignore_ascii_case("description"))
        })
        .map(|el| el.value().attr("content").unwrap_or("").trim().to_string());

    let headings = document
        .select(&selectors.headings)
        .filter_map(|el| {
            let level = heading_level(el.value().name())?;
            Some(Heading {
                level,
                text: collapse_whitespace(&element_text(el)),
            })
        })
        .collect();

    let images = document
        .select(&selectors.images)
        .map(|el| {
            let alt = el.value().attr("alt");
            Image {
                src: el.value().attr("src").map(|s| s.trim().to_string()),
                has_alt: alt.is_some(),
                alt_text: alt.map(|s| s.trim().to_string()),
            }
        })
        .collect();

    let links = document
        .select(&selectors.anchors)
        .filter_map(|el| el.value().attr("href"))
        .map(|href| Link {
            href: href.to_string(),
            target: classify_link(url.as_url(), href, scope),
        })
        .collect();

    Ok(PageModel {
        url: url.clone(),
        title,
        meta_description,
        headings,
        images,
        links,
    })
}

fn classify_link(base: &Url, href: &str, scope: &CrawlScope) -> LinkTarget {
    match normalize(base, href, scope) {
        Ok(url) => LinkTarget::Internal(url),
        Err(rejected) if rejected.is_external() => LinkTarget::External,
        Err(rejected) => LinkTarget::Unfollowable(rejected),
    }
}

fn is_markup_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime == "text/html" || mime == "application/xhtml+xml"
}

fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. scraper's Html is not Send. parse() drops it before returning, so only
//    the PageModel (plain owned data) ever crosses an .await in a worker.
//
// 2. html5ever repairs any markup into some tree: unclosed tags, stray
//    </div>s and a missing <head> all parse. ParseError is only for bodies
//    that are not HTML at all.
// -----------------------------------------------------------------------------
