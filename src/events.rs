use crate::parsers::PageType;
use crate::results::StopReason;
use serde::Serialize;
use std::collections::BTreeMap;

/// Something that happened during a crawl.
///
/// The crawl core reports progress only through these values; what happens
/// to them is up to the injected [`CrawlObserver`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CrawlEvent {
    PageRequested { page: u32, url: String },
    PageLoaded { page: u32, items: usize },
    PageLoadFailed { page: u32, attempt: u32, reason: String },
    SessionDesync { requested: u32, reported: u32 },
    ItemSkipped { page: u32, index: usize, reason: String },
    DetailFailed { page: u32, index: usize, url: String, reason: String },
    AmbiguousPageType { url: String },
    RecordAssembled { page: u32, index: usize, title: String, page_type: Option<PageType> },
    WeakStopSignal { page: u32, items: usize, count: u32, threshold: u32 },
    RevealFailed { reason: String },
    ContextLost { page: u32, reason: String },
    StatusSnapshot { page: u32, total: usize, histogram: BTreeMap<String, usize> },
    Stopped { reason: StopReason, records: usize, items_seen: usize },
}

/// Receives crawl events as they happen
pub trait CrawlObserver {
    fn on_event(&mut self, event: &CrawlEvent);
}

/// Forwards events to the `log` facade
#[derive(Debug, Default)]
pub struct LogObserver;

impl CrawlObserver for LogObserver {
    fn on_event(&mut self, event: &CrawlEvent) {
        match event {
            CrawlEvent::PageRequested { page, url } => {
                ::log::info!("Scraping page {}: {}", page, url);
            }
            CrawlEvent::PageLoaded { page, items } => {
                ::log::info!("Found {} items on page {}", items, page);
            }
            CrawlEvent::PageLoadFailed {
                page,
                attempt,
                reason,
            } => {
                ::log::warn!("Page {} failed to load (attempt {}): {}", page, attempt, reason);
            }
            CrawlEvent::SessionDesync {
                requested,
                reported,
            } => {
                ::log::error!(
                    "Requested page {} but the browser is on page {}; stopping",
                    requested,
                    reported
                );
            }
            CrawlEvent::ItemSkipped {
                page,
                index,
                reason,
            } => {
                ::log::warn!("Skipping item {} on page {}: {}", index + 1, page, reason);
            }
            CrawlEvent::DetailFailed {
                page,
                index,
                url,
                reason,
            } => {
                ::log::warn!(
                    "Detail page {} for item {} on page {} yielded nothing: {}",
                    url,
                    index + 1,
                    page,
                    reason
                );
            }
            CrawlEvent::AmbiguousPageType { url } => {
                ::log::warn!("Could not detect page type of {}, defaulting to cards", url);
            }
            CrawlEvent::RecordAssembled {
                page,
                index,
                title,
                ..
            } => {
                ::log::debug!("Processed item {} on page {}: {}", index + 1, page, title);
            }
            CrawlEvent::WeakStopSignal {
                page,
                items,
                count,
                threshold,
            } => {
                ::log::info!(
                    "Page {} returned only {} items ({}/{} before stopping)",
                    page,
                    items,
                    count,
                    threshold
                );
            }
            CrawlEvent::RevealFailed { reason } => {
                ::log::debug!("Could not reveal collapsed content: {}", reason);
            }
            CrawlEvent::ContextLost { page, reason } => {
                ::log::error!("Lost the listing context on page {}: {}", page, reason);
            }
            CrawlEvent::StatusSnapshot {
                page,
                total,
                histogram,
            } => {
                ::log::info!(
                    "Status distribution after page {} ({} records): {:?}",
                    page,
                    total,
                    histogram
                );
            }
            CrawlEvent::Stopped {
                reason,
                records,
                items_seen,
            } => {
                if reason.possibly_incomplete() {
                    ::log::warn!(
                        "Crawl stopped early ({:?}) with {} records from {} listed items; results may be incomplete",
                        reason,
                        records,
                        items_seen
                    );
                } else {
                    ::log::info!(
                        "Crawl complete ({:?}) with {} records from {} listed items",
                        reason,
                        records,
                        items_seen
                    );
                }
            }
        }
    }
}

/// Keeps every event, for inspection after the crawl
#[derive(Debug, Default)]
pub struct EventLog {
    pub events: Vec<CrawlEvent>,
}

impl CrawlObserver for EventLog {
    fn on_event(&mut self, event: &CrawlEvent) {
        self.events.push(event.clone());
    }
}
