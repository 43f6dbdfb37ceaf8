// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Validate them into a crawl plan (bad input stops us before any request)
// 3. Run the crawl, with Ctrl-C wired to stop it gracefully and a live
//    progress bar on stderr
// 4. Print the report as a table or JSON
// 5. Exit with proper code (0 = clean, 1 = issues found, 2 = error/aborted)
//
// Rust concepts used:
// - async/await: The crawl workers all run on one tokio runtime
// - Arc<dyn Trait>: The fetcher is shared by every worker behind a trait
// - anyhow::Context: Adds a human-readable line to errors on their way out
// =============================================================================

// Module declarations - tells Rust about our other source files
mod audit;         // src/audit/ - page parsing and SEO rules
mod cli;           // src/cli.rs - command-line parsing
mod config;        // src/config.rs - validated crawl settings
mod crawl;         // src/crawl/ - normalizer, fetcher, scheduler
mod progress;      // src/progress.rs - live progress bar
mod report;        // src/report.rs - findings and the final report

// anyhow::Result lets us return any error type with the ? operator
use anyhow::{Context, Result};
use clap::Parser;  // Parser trait enables the parse() method
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use cli::Cli;
use crawl::{Crawler, Fetch, HttpFetcher};
use progress::CrawlProgressBar;
use report::{CrawlStatus, Finding, Report, Severity};

// #[tokio::main] builds the runtime and runs our async main inside it
#[tokio::main]
async fn main() {
    // Everything that can fail lives in run(); main only maps it to a code
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole context chain on one line
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Returns:
//   Ok(0) = no errors and no broken links
//   Ok(1) = SEO errors or broken links found
//   Ok(2) = crawl aborted
//   Err   = bad configuration or setup failure
async fn run() -> Result<i32> {
    // Parse command-line arguments into our Cli struct
    // This will automatically handle --help, --version, etc.
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    // Turn raw flags into a checked plan; nothing is fetched if this fails
    let plan = cli
        .crawl_config()
        .validate()
        .context("invalid configuration")?;

    // One HTTP client for the whole run, shared by all workers
    let fetcher: Arc<dyn Fetch> =
        Arc::new(HttpFetcher::new(&plan.fetch).context("failed to build HTTP client")?);

    if !cli.json {
        println!("🔍 Auditing: {}", plan.seed);
        println!(
            "📊 Max depth: {}, max pages: {}, workers: {}",
            plan.max_depth, plan.max_pages, plan.concurrency
        );
    }

    // No bar in JSON mode
    let progress = (!cli.json).then(|| CrawlProgressBar::new(plan.max_pages));

    let mut crawler = Crawler::new(plan, fetcher);
    if let Some(bar) = &progress {
        crawler = crawler.on_progress(bar.observer());
    }

    // Ctrl-C stops the crawl; pages already in flight still finish
    let stop = crawler.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping crawl");
            stop.stop();
        }
    });

    let report = crawler.run().await;

    if let Some(bar) = &progress {
        bar.finish();
    }

    print_report(&report, cli.json)?;

    // Aborted takes precedence over issues
    Ok(if report.is_aborted() {
        2
    } else if report.has_issues() {
        1
    } else {
        0
    })
}

// Logs go to stderr so they never mix with the report on stdout
fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn print_report(report: &Report, json: bool) -> Result<()> {
    if json {
        // Pretty-printed, one document on stdout
        let json_output = serde_json::to_string_pretty(report)?;
        println!("{}", json_output);
    } else {
        print_table(report);
    }
    Ok(())
}

// Prints findings grouped by page, then broken links, then a summary
fn print_table(report: &Report) {
    // BTreeMap keeps pages in a stable, sorted order
    let mut by_page: BTreeMap<&str, Vec<&Finding>> = BTreeMap::new();
    for finding in &report.findings {
        by_page.entry(finding.url.as_str()).or_default().push(finding);
    }

    println!();
    if by_page.is_empty() {
        println!("✅ No SEO issues found");
    }

    for (url, findings) in &by_page {
        println!("URL: {}", url);
        for finding in findings {
            // Evidence is optional; show it in brackets when present
            let evidence = finding
                .evidence
                .as_deref()
                .map(|e| format!(" [{}]", truncate(e, 60)))
                .unwrap_or_default();
            println!(
                "  {:<9} {:<17} {}{}",
                format_severity(finding.severity),
                finding.rule.as_str(),
                finding.message,
                evidence
            );
        }
        println!();
    }

    // One row per (page, target) pair, so a target linked from several
    // pages shows up several times
    if !report.broken_links.is_empty() {
        println!("🔗 Broken links:");
        println!("{:<50} {:<50} {:<20}", "FOUND ON", "TARGET", "CAUSE");
        println!("{}", "=".repeat(120));
        for link in &report.broken_links {
            println!(
                "{:<50} {:<50} {}",
                truncate(&link.source, 47),
                truncate(&link.target, 47),
                link.cause
            );
        }
        println!();
    }

    println!("📊 Summary for {}:", report.target_domain);
    println!("   📄 Pages analyzed: {}", report.pages_visited);
    println!("   ⚠️  Pages failed: {}", report.pages_failed);
    println!("   ❌ Errors: {}", report.count(Severity::Error));
    println!("   🟡 Warnings: {}", report.count(Severity::Warning));
    println!("   ℹ️  Info: {}", report.count(Severity::Info));
    println!("   🔗 Broken links: {}", report.broken_links.len());
    if let CrawlStatus::Aborted(reason) = &report.status {
        println!("   🛑 Crawl aborted: {}", reason);
    }
}

fn format_severity(severity: Severity) -> String {
    match severity {
        Severity::Error => "❌ ERROR".to_string(),
        Severity::Warning => "🟡 WARN".to_string(),
        Severity::Info => "ℹ️  INFO".to_string(),
    }
}

// Shortens long URLs/evidence for the table, on a char boundary
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Where does output go?
//    - The report (table or JSON) goes to stdout
//    - Logs and the progress bar go to stderr
//    - So `seo-auditor example.com --json > report.json` stays valid JSON
//
// 2. Why std::process::exit() instead of returning from main?
//    - main() returning () always exits with 0
//    - Our exit code carries the result (clean / issues / aborted)
//
// 3. What does bool::then() do?
//    - (!cli.json).then(|| ...) is Some(value) when the condition is true
//    - and None otherwise, without an if/else block
// -----------------------------------------------------------------------------
