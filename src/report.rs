// src/report.rs
// =============================================================================
// The result data model: findings, broken links and the final Report.
//
// A Report is built up by the crawl scheduler while the run is in progress
// and frozen (moved out by value) when the run ends. After that nobody can
// mutate it; the printing code in main.rs only reads it.
// =============================================================================

use serde::Serialize;
use std::fmt;

use crate::crawl::FetchFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        };
        f.write_str(label)
    }
}

// Which rule produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    Title,
    MetaDescription,
    Headings,
    ImageAlt,
    LinkHref,
    ExternalLinks,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::Title => "title",
            RuleId::MetaDescription => "meta_description",
            RuleId::Headings => "headings",
            RuleId::ImageAlt => "image_alt",
            RuleId::LinkHref => "link_href",
            RuleId::ExternalLinks => "external_links",
        }
    }
}

/// One SEO issue detected on one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub url: String,
    pub rule: RuleId,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// A link found on `source` whose target could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenLink {
    pub source: String,
    pub target: String,
    pub cause: FetchFailure,
}

// How the crawl run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum CrawlStatus {
    Completed,
    Aborted(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub target_domain: String,
    pub status: CrawlStatus,
    pub pages_visited: usize,
    pub pages_failed: usize,
    pub findings: Vec<Finding>,
    pub broken_links: Vec<BrokenLink>,
}

impl Report {
    pub fn new(target_domain: impl Into<String>) -> Self {
        Self {
            target_domain: target_domain.into(),
            status: CrawlStatus::Completed,
            pages_visited: 0,
            pages_failed: 0,
            findings: Vec::new(),
            broken_links: Vec::new(),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    // True when the site has something a user must fix
    pub fn has_issues(&self) -> bool {
        self.count(Severity::Error) > 0 || !self.broken_links.is_empty()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.status, CrawlStatus::Aborted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity) -> Finding {
        Finding {
            url: "https://example.com/".to_string(),
            rule: RuleId::Title,
            severity,
            message: "Missing title tag".to_string(),
            evidence: None,
        }
    }

    #[test]
    fn test_warnings_alone_are_not_issues() {
        let mut report = Report::new("example.com");
        report.findings.push(finding(Severity::Warning));
        report.findings.push(finding(Severity::Info));
        assert!(!report.has_issues());

        report.findings.push(finding(Severity::Error));
        assert!(report.has_issues());
        assert_eq!(report.count(Severity::Warning), 1);
    }

    #[test]
    fn test_broken_link_is_an_issue() {
        let mut report = Report::new("example.com");
        report.broken_links.push(BrokenLink {
            source: "https://example.com/".to_string(),
            target: "https://example.com/gone".to_string(),
            cause: FetchFailure::ClientError(404),
        });
        assert!(report.has_issues());
    }

    #[test]
    fn test_report_json_shape() {
        let mut report = Report::new("example.com");
        report.status = CrawlStatus::Aborted("seed unreachable".to_string());
        report.findings.push(finding(Severity::Error));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"]["state"], "aborted");
        assert_eq!(json["findings"][0]["rule"], "title");
        assert_eq!(json["findings"][0]["severity"], "error");
        assert!(json["findings"][0].get("evidence").is_none());
    }
}
