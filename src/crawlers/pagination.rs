//! Sequential page traversal with end-of-results detection.
//!
//! The catalog exposes no page count, so the controller decides when to stop
//! from the pages themselves. Strong signals (an empty page, an explicit "no
//! results" marker, a redirect to another page, a load failure) stop at
//! once. A short page is only a weak signal: it has to repeat on
//! `stop_confirmations` consecutive pages, or be followed by an empty page,
//! before the result counts as exhausted. A redirect or load failure never
//! counts as confirmation.

use crate::config::{CrawlConfig, Selectors};
use crate::crawlers::crawler::{Browser, PageLoad};
use crate::error::{CrawlError, Result};
use crate::events::{CrawlEvent, CrawlObserver};
use crate::monitor;
use crate::parsers::detail::{DetailExtraction, extract_detail, section_page_record};
use crate::parsers::node::Node;
use crate::parsers::summary::parse_summary;
use crate::parsers::{Document, PageType};
use crate::results::{CrawlOutcome, Record, RecordBuilder, StopReason};
use crate::utils::build_page_url;
use scraper::ElementRef;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{Instant, sleep};
use url::Url;

/// Traversal state, advanced one page at a time
#[derive(Debug, Clone)]
pub struct CrawlState {
    pub page_number: u32,
    pub accumulated: Vec<Record>,
    /// Consecutive pages that carried a weak stop signal
    pub consecutive_stop_signals: u32,
    /// Items seen on listing pages, including ones that failed to parse
    pub total_count: usize,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self {
            page_number: 1,
            accumulated: Vec::new(),
            consecutive_stop_signals: 0,
            total_count: 0,
        }
    }
}

/// What a detail visit produced for one item
enum DetailVisit {
    Extracted(DetailExtraction),
    Empty,
}

/// Drives page fetch, validation, extraction and the stop decision
pub struct Paginator<B: Browser, O: CrawlObserver> {
    browser: B,
    observer: O,
    config: CrawlConfig,
    selectors: Selectors,
    interrupt: Arc<AtomicBool>,
    last_fetch: Option<Instant>,
}

impl<B: Browser, O: CrawlObserver> Paginator<B, O> {
    /// Validates the configuration; an invalid one is fatal before any fetch
    pub fn new(browser: B, observer: O, config: CrawlConfig) -> Result<Self> {
        let selectors = config.compile()?;
        Url::parse(&config.start_url)?;
        Ok(Self {
            browser,
            observer,
            config,
            selectors,
            interrupt: Arc::new(AtomicBool::new(false)),
            last_fetch: None,
        })
    }

    /// Share a flag that stops the crawl at the next safe point once set
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn into_parts(self) -> (B, O) {
        (self.browser, self.observer)
    }

    fn emit(&mut self, event: CrawlEvent) {
        self.observer.on_event(&event);
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Crawls listing pages until a stop condition fires.
    ///
    /// Only a failure before the first page could be navigated is returned
    /// as an error; every later problem ends the crawl with what was
    /// accumulated, marked as possibly incomplete where appropriate.
    pub async fn run(&mut self) -> Result<CrawlOutcome> {
        let mut state = CrawlState::default();
        let mut pages_fetched = 0;

        let reason = loop {
            let page = state.page_number;

            if self.interrupted() {
                break StopReason::Interrupted { page };
            }
            if let Some(limit) = self.config.max_pages {
                if page > limit {
                    break StopReason::PageCap { limit };
                }
            }

            let url = build_page_url(&self.config.start_url, page, self.config.page_size)?;
            self.emit(CrawlEvent::PageRequested {
                page,
                url: url.clone(),
            });

            let load = match self.fetch_listing(&url, page).await {
                Ok(load) => load,
                Err(e) if pages_fetched == 0 => return Err(e),
                Err(_) => break StopReason::PageLoadFailed { page },
            };
            pages_fetched += 1;

            if let Some(reported) = self.browser.current_page_identity().await.ok().flatten() {
                if reported != page {
                    self.emit(CrawlEvent::SessionDesync {
                        requested: page,
                        reported,
                    });
                    break StopReason::SessionDesync {
                        requested: page,
                        reported,
                    };
                }
            }

            let document = load.document;
            let root = document.root();
            let items = if load.ready {
                root.find_all(&self.selectors.listing_item)
            } else {
                Vec::new()
            };
            state.total_count += items.len();

            if load.ready {
                self.emit(CrawlEvent::PageLoaded {
                    page,
                    items: items.len(),
                });
            }

            let full_page = items.len() >= self.config.page_size as usize;
            if !full_page && self.selectors.no_results.is_match(&document.text()) {
                break StopReason::NoResultsMarker { page };
            }
            if !load.ready {
                break StopReason::PageLoadFailed { page };
            }
            if items.is_empty() {
                break confirm(&state, StopReason::NoItems { page });
            }

            let (records, halted) = self.extract_page(&document, &items, &state).await;
            state.accumulated.extend(records);

            if let Some(every) = self.config.status_report_every {
                if every > 0 && page % every == 0 {
                    self.emit(CrawlEvent::StatusSnapshot {
                        page,
                        total: state.accumulated.len(),
                        histogram: monitor::histogram(&state.accumulated),
                    });
                }
            }

            if let Some(reason) = halted {
                break reason;
            }
            if state.accumulated.len() >= self.config.max_records {
                break StopReason::RecordCap {
                    limit: self.config.max_records,
                };
            }

            if full_page {
                state.consecutive_stop_signals = 0;
            } else {
                state.consecutive_stop_signals += 1;
                self.emit(CrawlEvent::WeakStopSignal {
                    page,
                    items: items.len(),
                    count: state.consecutive_stop_signals,
                    threshold: self.config.stop_confirmations,
                });
                if state.consecutive_stop_signals >= self.config.stop_confirmations.max(1) {
                    break StopReason::ShortPages {
                        page,
                        confirmations: state.consecutive_stop_signals,
                    };
                }
            }

            state.page_number += 1;
        };

        self.emit(CrawlEvent::Stopped {
            reason: reason.clone(),
            records: state.accumulated.len(),
            items_seen: state.total_count,
        });

        Ok(CrawlOutcome::new(state.accumulated, pages_fetched, reason))
    }

    /// Scrapes a single page that is itself a sectioned document
    pub async fn scrape_section_page(&mut self, url: &str) -> Result<Record> {
        let ready = self.config.selectors.detail_ready.clone();
        let load = self.polite_fetch(url, &ready).await?;
        let document = if load.ready {
            self.reveal().await;
            self.browser.snapshot().await?
        } else {
            load.document
        };
        section_page_record(
            &document.root(),
            url,
            &self.selectors,
            self.config.merge_precedence,
        )
    }

    /// Fetches a listing page, retrying failed loads
    async fn fetch_listing(&mut self, url: &str, page: u32) -> Result<PageLoad> {
        let ready = self.config.selectors.listing_ready.clone();
        let mut last: Option<Result<PageLoad>> = None;

        for attempt in 1..=self.config.load_retries + 1 {
            let reason = match self.polite_fetch(url, &ready).await {
                Ok(load) if load.ready => return Ok(load),
                Ok(load) => {
                    last = Some(Ok(load));
                    "not ready within the wait budget".to_string()
                }
                Err(e) => {
                    let reason = e.to_string();
                    last = Some(Err(e));
                    reason
                }
            };
            self.emit(CrawlEvent::PageLoadFailed {
                page,
                attempt,
                reason,
            });
        }

        last.unwrap_or_else(|| Err(CrawlError::MissingRegion(ready)))
    }

    /// Fetches while keeping the minimum delay since the previous fetch
    async fn polite_fetch(&mut self, url: &str, ready: &str) -> Result<PageLoad> {
        if let Some(last) = self.last_fetch {
            let wait = self.config.page_delay().saturating_sub(last.elapsed());
            if !wait.is_zero() {
                sleep(wait).await;
            }
        }
        self.last_fetch = Some(Instant::now());
        self.browser.fetch(url, ready).await
    }

    /// Extracts every item of a listing page.
    ///
    /// Returns the records produced and, when the crawl has to stop before
    /// the page was finished, the reason.
    async fn extract_page(
        &mut self,
        document: &Document,
        items: &[ElementRef<'_>],
        state: &CrawlState,
    ) -> (Vec<Record>, Option<StopReason>) {
        let page = state.page_number;
        let base = document.base_url();
        let (start, end) = match self.config.item_window {
            Some(window) => window.bounds(items.len()),
            None => (0, items.len()),
        };

        let mut records = Vec::new();
        for (index, item) in items.iter().enumerate().take(end).skip(start) {
            if state.accumulated.len() + records.len() >= self.config.max_records {
                break;
            }

            match self.extract_item(page, index, item, base.as_ref()).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    self.emit(CrawlEvent::ContextLost {
                        page,
                        reason: e.to_string(),
                    });
                    return (records, Some(StopReason::ContextLost { page }));
                }
            }

            if self.interrupted() {
                return (records, Some(StopReason::Interrupted { page }));
            }
        }

        (records, None)
    }

    /// Builds one record from a listing item and its detail page.
    ///
    /// `Ok(None)` means the item was skipped; an error means the browser
    /// could not be returned to the listing.
    async fn extract_item(
        &mut self,
        page: u32,
        index: usize,
        item: &ElementRef<'_>,
        base: Option<&Url>,
    ) -> Result<Option<Record>> {
        let Some(summary) = parse_summary(item, &self.selectors, base) else {
            self.emit(CrawlEvent::ItemSkipped {
                page,
                index,
                reason: "no title link".to_string(),
            });
            return Ok(None);
        };

        let mut page_type = None;
        let mut sections = Vec::new();
        if self.config.visit_details && !summary.link.is_empty() {
            match self.visit_detail(&summary.link).await {
                Ok(DetailVisit::Extracted(extraction)) => {
                    if extraction.page_type == PageType::Ambiguous {
                        self.emit(CrawlEvent::AmbiguousPageType {
                            url: summary.link.clone(),
                        });
                    }
                    page_type = Some(extraction.page_type);
                    sections = extraction.sections;
                }
                Ok(DetailVisit::Empty) => self.emit(CrawlEvent::DetailFailed {
                    page,
                    index,
                    url: summary.link.clone(),
                    reason: "not ready within the wait budget".to_string(),
                }),
                Err(e @ CrawlError::ScopeTeardown(_)) => return Err(e),
                Err(e) => self.emit(CrawlEvent::DetailFailed {
                    page,
                    index,
                    url: summary.link.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        let mut record = RecordBuilder::new(self.config.merge_precedence);
        let merged = summary
            .write_into(&mut record)
            .and_then(|_| sections.into_iter().try_for_each(|s| record.section(s)));
        if let Err(e) = merged {
            self.emit(CrawlEvent::ItemSkipped {
                page,
                index,
                reason: e.to_string(),
            });
            return Ok(None);
        }

        let record = record.build();
        self.emit(CrawlEvent::RecordAssembled {
            page,
            index,
            title: record.title().to_string(),
            page_type,
        });
        Ok(Some(record))
    }

    /// Visits a detail page inside a scoped context.
    ///
    /// The scope is closed on every path out of the visit; a failure to close
    /// it is returned as [`CrawlError::ScopeTeardown`].
    async fn visit_detail(&mut self, url: &str) -> Result<DetailVisit> {
        let scope = self.browser.open_scope(url).await?;
        let loaded = self.load_in_scope().await;
        self.browser.close_scope(scope).await.map_err(|e| match e {
            CrawlError::ScopeTeardown(_) => e,
            other => CrawlError::ScopeTeardown(other.to_string()),
        })?;

        Ok(match loaded? {
            Some(document) => {
                DetailVisit::Extracted(extract_detail(&document.root(), &self.selectors))
            }
            None => DetailVisit::Empty,
        })
    }

    async fn load_in_scope(&mut self) -> Result<Option<Document>> {
        let ready = self.config.selectors.detail_ready.clone();
        if !self.browser.wait_ready(&ready).await? {
            return Ok(None);
        }
        let settle = self.config.settle_delay();
        if !settle.is_zero() {
            sleep(settle).await;
        }
        self.reveal().await;
        Ok(Some(self.browser.snapshot().await?))
    }

    /// Expands collapsed content; controls that cannot be triggered are ignored
    async fn reveal(&mut self) {
        let scope = self.config.reveal_scope();
        let controls = self.config.selectors.reveal_controls.clone();
        if let Err(e) = self.browser.reveal_collapsed(&scope, &controls).await {
            self.emit(CrawlEvent::RevealFailed {
                reason: e.to_string(),
            });
        }
    }
}

/// An empty page right after a short page confirms that page was the last
fn confirm(state: &CrawlState, reason: StopReason) -> StopReason {
    match reason {
        StopReason::NoItems { page } if state.consecutive_stop_signals > 0 => {
            StopReason::ShortPages {
                page,
                confirmations: state.consecutive_stop_signals + 1,
            }
        }
        other => other,
    }
}
