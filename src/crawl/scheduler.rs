// src/crawl/scheduler.rs
// =============================================================================
// This module runs a crawl: it owns the frontier, the visited set and the
// report, and drives a fixed pool of workers over them.
//
// How it works:
// 1. The seed URL goes on the frontier at depth 0 and into the visited set
// 2. `concurrency` workers each loop: take a target, fetch it, parse it,
//    run the rules, then hand the results back
// 3. Internal links found on a page go on the frontier at depth + 1 if they
//    are within max_depth and have never been seen before
// 4. The run ends when the frontier is empty and nothing is in flight, when
//    max_pages targets have been dispatched, or when the run is stopped
//
// Shared state:
// - Frontier, visited set, counters and report live in ONE RunState behind
//   ONE mutex. Marking a URL visited and appending results are therefore
//   atomic with respect to each other: two workers can never both claim
//   the same URL.
// - A URL is marked visited when it is queued, so re-discovering it from
//   another page only adds that page to the URL's list of referrers.
// - Workers with nothing to do wait on a Notify and are woken whenever a
//   target finishes or the run is stopped.
//
// The frontier is FIFO, so with concurrency = 1 the visit order is exactly
// breadth-first in the order links appear on each page.
//
// Rust concepts:
// - Arc<T>: One CrawlRun shared by every worker task
// - tokio::sync::Mutex: A lock that can be held across .await points
// - Notify: Lets idle workers sleep until there is something to do
// - catch_unwind: Turns a panic inside one page into a failed page
// =============================================================================

use futures::future::join_all;
use futures::FutureExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};
use url::Url;

use super::fetch::{Fetch, FetchFailure, FetchResult};
use super::normalize::{normalize, NormalizedUrl, Rejected};
use crate::audit::{self, ParseError};
use crate::config::CrawlPlan;
use crate::report::{BrokenLink, CrawlStatus, Finding, Report};

// Links to these are files, not pages, and are never queued
const ASSET_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".css", ".js", ".ico", ".zip",
];

// One unit of work on the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    pub url: NormalizedUrl,
    pub depth: usize,
    /// The page this URL was discovered on; None for the seed
    pub referrer: Option<NormalizedUrl>,
}

// Lets someone outside the run (Ctrl-C handler, a test) stop it
//
// Stopping does not cancel in-flight fetches; they finish or time out and
// their results still make it into the report.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Counters after each finished page, for progress display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlProgress {
    pub pages_visited: usize,
    pub pages_failed: usize,
    /// Targets still waiting on the frontier
    pub queued: usize,
}

impl CrawlProgress {
    pub fn pages_done(&self) -> usize {
        self.pages_visited + self.pages_failed
    }
}

/// Called once per finished page, outside the state lock
pub type ProgressFn = Arc<dyn Fn(CrawlProgress) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Completed,
    Aborted(String),
}

// What happened to one dispatched target
enum PageOutcome {
    Analyzed {
        findings: Vec<Finding>,
        links: Vec<NormalizedUrl>,
    },
    // Redirected to a host outside the crawl scope
    OffSite(Url),
    ParseFailed(ParseError),
    FetchFailed(FetchFailure),
    Crashed,
}

struct RunState {
    phase: Phase,
    frontier: VecDeque<CrawlTarget>,
    visited: HashSet<NormalizedUrl>,
    // Every page seen linking to a queued URL, in discovery order
    referrers: HashMap<NormalizedUrl, Vec<NormalizedUrl>>,
    // URLs whose fetch failed, so later referrers can be reported too
    failed: HashMap<NormalizedUrl, FetchFailure>,
    dispatched: usize,
    in_flight: usize,
    report: Report,
}

impl RunState {
    fn finish(&mut self, phase: Phase) {
        // The first terminal phase wins
        if matches!(self.phase, Phase::Idle | Phase::Running) {
            self.phase = phase;
        }
        self.frontier.clear();
    }

    // Notes another page linking to a URL that is already queued or done.
    // If that URL already failed, the new page gets its own broken link.
    fn add_referrer(&mut self, link: &NormalizedUrl, source: &NormalizedUrl) {
        let sources = self.referrers.entry(link.clone()).or_default();
        if sources.contains(source) {
            return;
        }
        sources.push(source.clone());

        if let Some(cause) = self.failed.get(link) {
            self.report.broken_links.push(BrokenLink {
                source: source.to_string(),
                target: link.to_string(),
                cause: cause.clone(),
            });
        }
    }

    fn progress(&self) -> CrawlProgress {
        CrawlProgress {
            pages_visited: self.report.pages_visited,
            pages_failed: self.report.pages_failed,
            queued: self.frontier.len(),
        }
    }
}

// Everything one crawl run owns; shared by its workers through an Arc
struct CrawlRun {
    plan: CrawlPlan,
    fetcher: Arc<dyn Fetch>,
    stop: StopHandle,
    progress: Option<ProgressFn>,
    state: Mutex<RunState>,
}

pub struct Crawler {
    plan: CrawlPlan,
    fetcher: Arc<dyn Fetch>,
    stop: StopHandle,
    progress: Option<ProgressFn>,
}

impl Crawler {
    pub fn new(plan: CrawlPlan, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            plan,
            fetcher,
            stop: StopHandle::default(),
            progress: None,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    // Registers a callback that sees the counters after every page
    pub fn on_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    // Crawls the site and returns the finished report
    //
    // Never fails: an unreachable seed or an interrupt ends the run as
    // Aborted, and the report still holds whatever was collected.
    pub async fn run(self) -> Report {
        // Arc so every spawned worker can hold the same run
        let run = Arc::new(CrawlRun::new(self.plan, self.fetcher, self.stop, self.progress));
        run.start().await;

        info!(
            seed = %run.plan.seed,
            max_depth = run.plan.max_depth,
            max_pages = run.plan.max_pages,
            concurrency = run.plan.concurrency,
            "starting crawl"
        );

        // One task per worker; each gets its own clone of the Arc
        let workers = (0..run.plan.concurrency).map(|id| {
            let run = Arc::clone(&run);
            tokio::spawn(async move { run.work(id).await })
        });

        // A JoinError here means the task itself died, not just one page
        for (id, joined) in join_all(workers).await.into_iter().enumerate() {
            if let Err(e) = joined {
                error!(worker = id, "worker task failed: {}", e);
                run.state
                    .lock()
                    .await
                    .finish(Phase::Aborted(format!("worker {} failed: {}", id, e)));
            }
        }

        run.freeze_report().await
    }
}

impl CrawlRun {
    fn new(
        plan: CrawlPlan,
        fetcher: Arc<dyn Fetch>,
        stop: StopHandle,
        progress: Option<ProgressFn>,
    ) -> Self {
        let seed = CrawlTarget {
            url: plan.seed.clone(),
            depth: 0,
            referrer: None,
        };

        // The seed counts as visited before anything is fetched, so a page
        // linking back to it never queues it again
        let mut visited = HashSet::new();
        visited.insert(seed.url.clone());

        let state = RunState {
            phase: Phase::Idle,
            frontier: VecDeque::from([seed]),
            visited,
            referrers: HashMap::new(),
            failed: HashMap::new(),
            dispatched: 0,
            in_flight: 0,
            report: Report::new(plan.scope.host()),
        };

        Self {
            plan,
            fetcher,
            stop,
            progress,
            state: Mutex::new(state),
        }
    }

    async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.phase == Phase::Idle {
            state.phase = Phase::Running;
        }
    }

    async fn work(&self, id: usize) {
        while let Some(target) = self.next_target().await {
            debug!(worker = id, url = %target.url, depth = target.depth, "dispatching");

            // A panic while handling one page must not take the worker down
            let outcome = AssertUnwindSafe(self.process(&target))
                .catch_unwind()
                .await
                .unwrap_or(PageOutcome::Crashed);

            self.record(target, outcome).await;
        }
        debug!(worker = id, "worker finished");
    }

    // Takes the next target off the frontier, waiting while other workers
    // may still produce more. None means the run is over.
    async fn next_target(&self) -> Option<CrawlTarget> {
        loop {
            // Registered before the state check so a wake-up between the
            // check and the await is not lost
            let woken = self.stop.wake.notified();

            {
                let mut state = self.state.lock().await;
                if state.phase != Phase::Running {
                    return None;
                }

                if self.stop.is_stopped() {
                    info!("crawl interrupted");
                    state.finish(Phase::Aborted("interrupted".to_string()));
                    self.stop.wake.notify_waiters();
                    return None;
                }

                while let Some(target) = state.frontier.pop_front() {
                    // Checked again here: the frontier is shared and the
                    // page budget may have run out since this was queued
                    if target.depth > self.plan.max_depth {
                        continue;
                    }
                    if state.dispatched >= self.plan.max_pages {
                        debug!(discarded = state.frontier.len() + 1, "page limit reached");
                        state.frontier.clear();
                        break;
                    }
                    state.dispatched += 1;
                    state.in_flight += 1;
                    return Some(target);
                }

                // Empty frontier and nobody working: nothing can ever be
                // queued again
                if state.in_flight == 0 {
                    state.finish(Phase::Completed);
                    self.stop.wake.notify_waiters();
                    return None;
                }
            } // lock released here, before we sleep

            woken.await;
        }
    }

    // Fetch, parse, evaluate. Runs without holding the state lock.
    async fn process(&self, target: &CrawlTarget) -> PageOutcome {
        let result = self.fetch_with_retry(&target.url).await;

        let page = match result.outcome {
            Ok(page) => page,
            Err(failure) => return PageOutcome::FetchFailed(failure),
        };

        // After redirects the body may belong to another URL, or another site
        let landed = match self.landing_url(&target.url, &page.final_url) {
            Ok(url) => url,
            Err(_) => return PageOutcome::OffSite(page.final_url),
        };

        if landed == target.url {
            info!(url = %result.url, depth = target.depth, status = page.status, "page fetched");
        } else {
            info!(url = %result.url, landed = %landed, depth = target.depth, status = page.status, "page fetched after redirect");
        }

        // Links on the page resolve against where it was actually served
        match audit::parse(&landed, &page.body, page.content_type(), &self.plan.scope) {
            Ok(model) => {
                let findings = audit::evaluate(&model);
                let links = model.internal_links().cloned().collect();
                PageOutcome::Analyzed { findings, links }
            }
            Err(e) => PageOutcome::ParseFailed(e),
        }
    }

    // The in-scope URL a response was served from
    fn landing_url(&self, requested: &NormalizedUrl, final_url: &Url) -> Result<NormalizedUrl, Rejected> {
        if final_url == requested.as_url() {
            return Ok(requested.clone());
        }
        normalize(final_url, final_url.as_str(), &self.plan.scope)
    }

    // At most one retry, and only for failures that might be transient
    async fn fetch_with_retry(&self, url: &NormalizedUrl) -> FetchResult {
        let first = self.fetcher.fetch(url).await;
        match &first.outcome {
            Err(failure) if failure.is_retryable() => {
                warn!(url = %url, %failure, "fetch failed, retrying once");
                self.fetcher.fetch(url).await
            }
            _ => first,
        }
    }

    // Folds one target's outcome into the shared state and queues new links
    async fn record(&self, target: CrawlTarget, outcome: PageOutcome) {
        let progress = {
            let mut state = self.state.lock().await;
            state.in_flight -= 1;

            match outcome {
                PageOutcome::Analyzed { findings, links } => {
                    state.report.pages_visited += 1;
                    state.report.findings.extend(findings);

                    let depth = target.depth + 1;
                    if depth <= self.plan.max_depth && state.phase == Phase::Running {
                        let mut queued = 0;
                        for link in links {
                            if is_asset(&link) {
                                continue;
                            }
                            // insert() is the test-and-set: false means some
                            // page already queued this URL
                            if state.visited.insert(link.clone()) {
                                state.referrers.insert(link.clone(), vec![target.url.clone()]);
                                state.frontier.push_back(CrawlTarget {
                                    url: link,
                                    depth,
                                    referrer: Some(target.url.clone()),
                                });
                                queued += 1;
                            } else {
                                state.add_referrer(&link, &target.url);
                            }
                        }
                        debug!(url = %target.url, queued, "links queued");
                    }
                }
                PageOutcome::OffSite(landed) => {
                    warn!(url = %target.url, %landed, "redirected off-site, not audited");
                    state.report.pages_failed += 1;
                }
                PageOutcome::ParseFailed(e) => {
                    warn!(url = %target.url, "page failed: {}", e);
                    state.report.pages_failed += 1;
                }
                PageOutcome::FetchFailed(failure) => {
                    warn!(url = %target.url, %failure, "page failed");
                    state.report.pages_failed += 1;

                    if target.referrer.is_none() {
                        error!(seed = %target.url, %failure, "seed unreachable, aborting");
                        state.finish(Phase::Aborted(format!(
                            "seed {} unreachable: {}",
                            target.url, failure
                        )));
                    } else {
                        // One broken link per page known to link here so far;
                        // add_referrer() covers pages discovered later
                        let sources = state
                            .referrers
                            .get(&target.url)
                            .cloned()
                            .unwrap_or_else(|| target.referrer.iter().cloned().collect());
                        for source in sources {
                            state.report.broken_links.push(BrokenLink {
                                source: source.to_string(),
                                target: target.url.to_string(),
                                cause: failure.clone(),
                            });
                        }
                        state.failed.insert(target.url.clone(), failure);
                    }
                }
                PageOutcome::Crashed => {
                    error!(url = %target.url, "page analysis panicked");
                    state.report.pages_failed += 1;
                }
            }

            state.progress()
        };

        self.stop.wake.notify_waiters();

        // Outside the lock: the callback may draw to the terminal
        if let Some(report_progress) = &self.progress {
            report_progress(progress);
        }
    }

    // Freezes the report once every worker has returned
    async fn freeze_report(&self) -> Report {
        let mut state = self.state.lock().await;
        let status = match &state.phase {
            Phase::Aborted(reason) => CrawlStatus::Aborted(reason.clone()),
            _ => CrawlStatus::Completed,
        };

        // Take the report out of the state; the run is over
        let mut report = std::mem::replace(&mut state.report, Report::new(self.plan.scope.host()));
        report.status = status;

        info!(
            visited = report.pages_visited,
            failed = report.pages_failed,
            findings = report.findings.len(),
            broken_links = report.broken_links.len(),
            "crawl finished"
        );
        report
    }
}

fn is_asset(url: &NormalizedUrl) -> bool {
    let path = url.path().to_ascii_lowercase();
    ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why tokio::sync::Mutex and not std::sync::Mutex?
//    - next_target() and record() lock the state inside async functions
//    - The tokio version yields to other tasks while waiting for the lock
//    - Nothing slow happens under the lock: fetching and parsing run
//      in process(), which never touches the state
//
// 2. What does notified() before the lock buy us?
//    - Notify::notify_waiters() only wakes futures that already exist
//    - Creating the Notified future first means a wake-up that arrives
//      while we hold the lock is still seen by woken.await
//
// 3. Why AssertUnwindSafe?
//    - catch_unwind() requires the future to be UnwindSafe
//    - &self holds a Mutex, which is not, so we assert it
//    - A panic inside process() never runs while the state lock is held
//
// 4. Redirects:
//    - reqwest follows them inside fetch(); FetchedPage::final_url says
//      where the body came from
//    - A landing URL outside the crawl scope is a failed page: no findings,
//      no links queued
// -----------------------------------------------------------------------------
