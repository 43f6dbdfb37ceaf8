// src/audit/rules.rs
// =============================================================================
// The SEO rule engine.
//
// A fixed, ordered list of rules, each one a plain function from a PageModel
// to zero or more findings. Rules never look at other pages and never touch
// shared state, so pages can be evaluated in any order and on any worker.
//
// Rules (in evaluation order):
//   title             Error: missing/empty   Warning: <10 or >60 chars
//   meta_description  Error: missing/empty   Warning: <50 or >160 chars
//   headings          Error: no h1   Warning: several h1s, skipped levels
//   image_alt         Warning per <img> without alt text
//   link_href         Warning per empty or malformed href
//   external_links    Info when a page links out more than 10 times
//
// Broken links are NOT a rule: the scheduler records them from fetch results.
// =============================================================================

use tracing::debug;

use super::parser::{LinkTarget, PageModel};
use crate::crawl::Rejected;
use crate::report::{Finding, RuleId, Severity};

const TITLE_MIN: usize = 10;
const TITLE_MAX: usize = 60;
const META_MIN: usize = 50;
const META_MAX: usize = 160;
const EXTERNAL_LINK_LIMIT: usize = 10;

type Rule = fn(&PageModel, &mut Vec<Finding>);

const RULES: [Rule; 6] = [
    title_rule,
    meta_description_rule,
    heading_rule,
    image_alt_rule,
    link_href_rule,
    external_links_rule,
];

// Runs every rule against the page, in order
//
// Same PageModel in, same Vec<Finding> out: rules are deterministic.
pub fn evaluate(page: &PageModel) -> Vec<Finding> {
    let mut findings = Vec::new();
    for rule in RULES {
        rule(page, &mut findings);
    }

    for finding in &findings {
        debug!(
            url = %finding.url,
            rule = finding.rule.as_str(),
            severity = %finding.severity,
            "{}",
            finding.message
        );
    }

    findings
}

fn finding(
    page: &PageModel,
    rule: RuleId,
    severity: Severity,
    message: impl Into<String>,
    evidence: Option<String>,
) -> Finding {
    Finding {
        url: page.url.to_string(),
        rule,
        severity,
        message: message.into(),
        evidence,
    }
}

fn title_rule(page: &PageModel, out: &mut Vec<Finding>) {
    match page.title.as_deref().map(str::trim) {
        None | Some("") => out.push(finding(
            page,
            RuleId::Title,
            Severity::Error,
            "Missing title tag",
            None,
        )),
        Some(title) => {
            let len = title.chars().count();
            if !(TITLE_MIN..=TITLE_MAX).contains(&len) {
                out.push(finding(
                    page,
                    RuleId::Title,
                    Severity::Warning,
                    format!(
                        "Title tag length issue ({} chars, recommended {}-{})",
                        len, TITLE_MIN, TITLE_MAX
                    ),
                    Some(title.to_string()),
                ));
            }
        }
    }
}

fn meta_description_rule(page: &PageModel, out: &mut Vec<Finding>) {
    match page.meta_description.as_deref().map(str::trim) {
        None => out.push(finding(
            page,
            RuleId::MetaDescription,
            Severity::Error,
            "Missing meta description",
            None,
        )),
        Some("") => out.push(finding(
            page,
            RuleId::MetaDescription,
            Severity::Error,
            "Empty meta description",
            None,
        )),
        Some(description) => {
            let len = description.chars().count();
            if !(META_MIN..=META_MAX).contains(&len) {
                out.push(finding(
                    page,
                    RuleId::MetaDescription,
                    Severity::Warning,
                    format!(
                        "Meta description length issue ({} chars, recommended {}-{})",
                        len, META_MIN, META_MAX
                    ),
                    Some(description.to_string()),
                ));
            }
        }
    }
}

fn heading_rule(page: &PageModel, out: &mut Vec<Finding>) {
    let h1_count = page.headings.iter().filter(|h| h.level == 1).count();

    if h1_count == 0 {
        out.push(finding(
            page,
            RuleId::Headings,
            Severity::Error,
            "No h1 tag found",
            None,
        ));
    } else if h1_count > 1 {
        out.push(finding(
            page,
            RuleId::Headings,
            Severity::Warning,
            format!("Multiple h1 tags ({})", h1_count),
            None,
        ));
    }

    // Going deeper by more than one level skips a level; going back up
    // (h3 -> h2, h4 -> h1) is always fine
    for pair in page.headings.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.level > prev.level + 1 {
            out.push(finding(
                page,
                RuleId::Headings,
                Severity::Warning,
                format!(
                    "Heading level skipped: h{} -> h{} (missing h{})",
                    prev.level,
                    next.level,
                    prev.level + 1
                ),
                Some(next.text.clone()),
            ));
        }
    }
}

fn image_alt_rule(page: &PageModel, out: &mut Vec<Finding>) {
    for image in &page.images {
        let alt_missing = !image.has_alt
            || image
                .alt_text
                .as_deref()
                .map_or(true, |alt| alt.trim().is_empty());

        if alt_missing {
            out.push(finding(
                page,
                RuleId::ImageAlt,
                Severity::Warning,
                "Image missing alt text",
                Some(image.src.clone().unwrap_or_else(|| "(no src)".to_string())),
            ));
        }
    }
}

fn link_href_rule(page: &PageModel, out: &mut Vec<Finding>) {
    for link in &page.links {
        let message = match &link.target {
            _ if link.href.trim().is_empty() => "Empty href",
            LinkTarget::Unfollowable(Rejected::Malformed(_)) => "Malformed href",
            _ => continue,
        };
        out.push(finding(
            page,
            RuleId::LinkHref,
            Severity::Warning,
            message,
            Some(link.href.clone()),
        ));
    }
}

fn external_links_rule(page: &PageModel, out: &mut Vec<Finding>) {
    let external = page
        .links
        .iter()
        .filter(|link| link.target == LinkTarget::External)
        .count();

    if external > EXTERNAL_LINK_LIMIT {
        out.push(finding(
            page,
            RuleId::ExternalLinks,
            Severity::Info,
            format!("High number of external links ({})", external),
            None,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::parser::{parse, Heading};
    use crate::crawl::CrawlScope;
    use url::Url;

    fn page(html: &str) -> PageModel {
        let seed = Url::parse("https://example.com/").unwrap();
        let (scope, url) = CrawlScope::seed(&seed, false).unwrap();
        parse(&url, html, Some("text/html"), &scope).unwrap()
    }

    // A page that passes every rule, for tests to break one thing at a time
    fn clean_page() -> PageModel {
        page(
            r#"<html><head>
                <title>A perfectly sized title</title>
                <meta name="description" content="A meta description that is comfortably longer than fifty characters.">
            </head><body>
                <h1>Main</h1><h2>Section</h2><h3>Sub</h3><h2>Another</h2>
                <img src="/logo.png" alt="Logo">
                <a href="/about">About</a>
            </body></html>"#,
        )
    }

    fn rules_of(findings: &[Finding]) -> Vec<(RuleId, Severity)> {
        findings.iter().map(|f| (f.rule, f.severity)).collect()
    }

    #[test]
    fn test_clean_page_has_no_findings() {
        assert!(evaluate(&clean_page()).is_empty());
    }

    #[test]
    fn test_empty_title_and_missing_meta_are_errors() {
        let findings = evaluate(&page("<html><head><title></title></head><body><h1>Hi</h1></body></html>"));
        assert_eq!(
            rules_of(&findings),
            vec![
                (RuleId::Title, Severity::Error),
                (RuleId::MetaDescription, Severity::Error),
            ]
        );
        assert!(findings.iter().all(|f| f.url == "https://example.com/"));
    }

    #[test]
    fn test_title_length_warnings() {
        let mut short = clean_page();
        short.title = Some("Home".to_string());
        let findings = evaluate(&short);
        assert_eq!(rules_of(&findings), vec![(RuleId::Title, Severity::Warning)]);
        assert_eq!(findings[0].evidence.as_deref(), Some("Home"));

        let mut long = clean_page();
        long.title = Some("x".repeat(61));
        assert_eq!(rules_of(&evaluate(&long)), vec![(RuleId::Title, Severity::Warning)]);

        // boundaries are inclusive
        let mut edge = clean_page();
        edge.title = Some("x".repeat(60));
        assert!(evaluate(&edge).is_empty());
    }

    #[test]
    fn test_meta_description_rules() {
        let mut empty = clean_page();
        empty.meta_description = Some(String::new());
        let findings = evaluate(&empty);
        assert_eq!(rules_of(&findings), vec![(RuleId::MetaDescription, Severity::Error)]);
        assert_eq!(findings[0].message, "Empty meta description");

        let mut short = clean_page();
        short.meta_description = Some("Too short".to_string());
        assert_eq!(
            rules_of(&evaluate(&short)),
            vec![(RuleId::MetaDescription, Severity::Warning)]
        );

        let mut long = clean_page();
        long.meta_description = Some("d".repeat(161));
        assert_eq!(
            rules_of(&evaluate(&long)),
            vec![(RuleId::MetaDescription, Severity::Warning)]
        );
    }

    #[test]
    fn test_missing_and_multiple_h1() {
        let mut none = clean_page();
        none.headings = vec![Heading { level: 2, text: "Only h2".to_string() }];
        assert_eq!(rules_of(&evaluate(&none)), vec![(RuleId::Headings, Severity::Error)]);

        let mut many = clean_page();
        many.headings = vec![
            Heading { level: 1, text: "One".to_string() },
            Heading { level: 1, text: "Two".to_string() },
        ];
        let findings = evaluate(&many);
        assert_eq!(rules_of(&findings), vec![(RuleId::Headings, Severity::Warning)]);
        assert_eq!(findings[0].message, "Multiple h1 tags (2)");
    }

    #[test]
    fn test_h1_then_h3_is_one_skip_warning() {
        let mut p = clean_page();
        p.headings = vec![
            Heading { level: 1, text: "Title".to_string() },
            Heading { level: 3, text: "Deep".to_string() },
        ];
        let findings = evaluate(&p);
        assert_eq!(rules_of(&findings), vec![(RuleId::Headings, Severity::Warning)]);
        assert!(findings[0].message.contains("missing h2"));
        assert_eq!(findings[0].evidence.as_deref(), Some("Deep"));
    }

    #[test]
    fn test_images_without_alt() {
        let mut p = clean_page();
        p.images = page(r#"<img src="/a.png"><img src="/b.png" alt="  "><img alt="ok" src="/c.png"><img>"#).images;
        let findings = evaluate(&p);
        let evidence: Vec<_> = findings.iter().map(|f| f.evidence.as_deref().unwrap()).collect();
        assert_eq!(evidence, vec!["/a.png", "/b.png", "(no src)"]);
        assert!(findings.iter().all(|f| f.rule == RuleId::ImageAlt && f.severity == Severity::Warning));
    }

    #[test]
    fn test_empty_and_malformed_hrefs() {
        let mut p = clean_page();
        p.links = page(r#"<a href="">x</a><a href="http://[::1">y</a><a href="/ok">z</a>"#).links;
        let findings = evaluate(&p);
        let messages: Vec<_> = findings.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(messages, vec!["Empty href", "Malformed href"]);
    }

    #[test]
    fn test_many_external_links_is_info() {
        let html: String = (0..11)
            .map(|i| format!(r#"<a href="https://site{}.org/">x</a>"#, i))
            .collect();
        let mut p = clean_page();
        p.links = page(&html).links;
        assert_eq!(rules_of(&evaluate(&p)), vec![(RuleId::ExternalLinks, Severity::Info)]);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let p = page("<title>x</title><h1>a</h1><h4>b</h4><img src=/i.png><a href=''>e</a>");
        assert_eq!(evaluate(&p), evaluate(&p));
    }
}
