// src/progress.rs
// =============================================================================
// This module draws the live "pages crawled" bar while a crawl runs.
//
// We use the `indicatif` crate which:
// - Draws a progress bar on stderr, so it never mixes with the report
// - Redraws at a limited rate, so calling it after every page is fine
// - Hides itself when stderr is not a terminal
//
// The crawler knows nothing about terminals. It calls a ProgressFn after
// every page, and this module turns those calls into bar updates.
//
// Rust concepts:
// - Closures: observer() returns a closure that owns a clone of the bar
// - Arc<dyn Fn>: The closure is shared with every crawl worker
// =============================================================================

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use crate::crawl::{CrawlProgress, ProgressFn};

pub struct CrawlProgressBar {
    bar: ProgressBar,
}

impl CrawlProgressBar {
    // The bar's length is the page budget; a crawl that runs out of links
    // first just finishes short of it
    pub fn new(max_pages: usize) -> Self {
        let bar = ProgressBar::new(max_pages as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }

    // Callback to hand to Crawler::on_progress
    pub fn observer(&self) -> ProgressFn {
        // ProgressBar is a handle; clones draw to the same bar
        let bar = self.bar.clone();
        Arc::new(move |progress: CrawlProgress| {
            bar.set_position(progress.pages_done() as u64);
            bar.set_message(format!(
                "({} failed, {} queued)",
                progress.pages_failed, progress.queued
            ));
        })
    }

    // Removes the bar so the report starts on a clean line
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_moves_the_bar() {
        let progress = CrawlProgressBar {
            bar: ProgressBar::hidden(),
        };
        let observe = progress.observer();

        observe(CrawlProgress {
            pages_visited: 3,
            pages_failed: 1,
            queued: 7,
        });

        assert_eq!(progress.bar.position(), 4);
        assert_eq!(progress.bar.message(), "(1 failed, 7 queued)");

        progress.finish();
        assert!(progress.bar.is_finished());
    }
}
