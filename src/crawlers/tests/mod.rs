use crate::config::{CrawlConfig, ItemWindow, MIN_PAGE_DELAY, parse_selector};
use crate::crawlers::crawler::{Browser, PageLoad};
use crate::crawlers::pagination::Paginator;
use crate::error::{CrawlError, Result};
use crate::events::{CrawlEvent, EventLog};
use crate::parsers::Document;
use crate::parsers::node::Node;
use crate::results::{FieldValue, StopReason};
use crate::utils::page_number_from_url;
use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::time::Instant;

const LISTING_URL: &str = "https://catalog.test/search?status=open";

/// Results container, rendered even when a page has no items
const RESULTS_READY: &str = ".search-results";

/// In-memory browser serving canned listing and detail pages
#[derive(Default)]
struct FakeBrowser {
    listings: HashMap<u32, String>,
    details: HashMap<String, String>,
    failing_details: HashSet<String>,
    redirects: HashMap<u32, u32>,
    failing_pages: HashSet<u32>,
    /// Pages whose results container never renders
    unready_pages: HashSet<u32>,
    failing_snapshots: HashSet<String>,
    broken_teardown: bool,
    /// Open contexts, the listing context first
    contexts: Vec<String>,
    max_open: usize,
    /// Open contexts seen by every `open_scope`, before it opens its own
    depths_at_open: Vec<usize>,
    closed_scopes: usize,
    current_page: Option<u32>,
    fetched: Vec<String>,
    fetch_times: Vec<Instant>,
}

impl FakeBrowser {
    fn with_pages(counts: &[usize]) -> Self {
        let mut browser = FakeBrowser::default();
        for (i, count) in counts.iter().enumerate() {
            browser.add_page(i as u32 + 1, *count);
        }
        browser
    }

    fn add_page(&mut self, page: u32, count: usize) {
        let items: String = (1..=count).map(|i| listing_item(page, i)).collect();
        self.listings
            .insert(page, results_page(&items));
        for i in 1..=count {
            self.details.insert(
                detail_url(page, i),
                format!(
                    "<html><body><eui-card>\
                     <eui-card-header-title class=\"eui-card-header__title-container-title\">Description</eui-card-header-title>\
                     <eui-card-content><p>Detail body for item {}-{}</p></eui-card-content>\
                     </eui-card></body></html>",
                    page, i
                ),
            );
        }
    }

    fn active_html(&self) -> String {
        let active = self.contexts.last().cloned().unwrap_or_default();
        if let Some(html) = self.details.get(&active) {
            return html.clone();
        }
        let Some(page) = self.current_page else {
            return "<html><body></body></html>".to_string();
        };
        if self.unready_pages.contains(&page) {
            return "<html><body><p>Loading</p></body></html>".to_string();
        }
        self.listings
            .get(&page)
            .cloned()
            .unwrap_or_else(|| results_page(""))
    }

    fn active_url(&self) -> String {
        self.contexts.last().cloned().unwrap_or_default()
    }
}

fn results_page(items: &str) -> String {
    format!(
        "<html><body><div class=\"search-results\">{}</div></body></html>",
        items
    )
}

fn listing_item(page: u32, i: usize) -> String {
    format!(
        "<eui-card-header>\
         <a class=\"eui-u-text-link\" href=\"/detail/{page}-{i}\">Item {page}-{i}</a>\
         <div class=\"eui-card-header__title-container-subtitle\">\
         <span>CODE-{page}-{i}</span><span>|</span><span>Grant</span><span>Single-stage</span>\
         <strong>15 March 2024</strong><strong>1 April 2024</strong>\
         </div>\
         <span class=\"eui-label\">Open</span>\
         </eui-card-header>"
    )
}

fn detail_url(page: u32, i: usize) -> String {
    format!("https://catalog.test/detail/{}-{}", page, i)
}

fn has_ready(html: &str, url: &str, ready: &str) -> Result<bool> {
    let selector = parse_selector(ready)?;
    let document = Document::parse(url, html);
    Ok(document.root().find_first(&selector).is_some())
}

impl Browser for FakeBrowser {
    type Scope = usize;

    async fn fetch(&mut self, url: &str, ready: &str) -> Result<PageLoad> {
        self.fetched.push(url.to_string());
        self.fetch_times.push(Instant::now());
        self.contexts = vec![url.to_string()];

        if !self.details.contains_key(url) {
            let page = page_number_from_url(url).unwrap_or(1);
            if self.failing_pages.contains(&page) {
                return Err(CrawlError::MissingRegion("listing".to_string()));
            }
            self.current_page = Some(page);
        }

        let html = self.active_html();
        Ok(PageLoad {
            ready: has_ready(&html, url, ready)?,
            document: Document::parse(url, &html),
        })
    }

    async fn current_page_identity(&mut self) -> Result<Option<u32>> {
        Ok(self
            .current_page
            .map(|page| self.redirects.get(&page).copied().unwrap_or(page)))
    }

    async fn open_scope(&mut self, url: &str) -> Result<usize> {
        if self.failing_details.contains(url) {
            return Err(CrawlError::MissingRegion("window".to_string()));
        }
        let depth = self.contexts.len();
        self.depths_at_open.push(depth);
        self.contexts.push(url.to_string());
        self.max_open = self.max_open.max(self.contexts.len());
        Ok(depth)
    }

    async fn close_scope(&mut self, depth: usize) -> Result<()> {
        if self.broken_teardown {
            return Err(CrawlError::ScopeTeardown("window is gone".to_string()));
        }
        self.contexts.truncate(depth);
        self.closed_scopes += 1;
        Ok(())
    }

    async fn wait_ready(&mut self, ready: &str) -> Result<bool> {
        let url = self.active_url();
        match self.details.get(&url) {
            Some(html) => has_ready(html, &url, ready),
            None => Ok(false),
        }
    }

    async fn reveal_collapsed(&mut self, _scope: &str, _controls: &[String]) -> Result<usize> {
        Ok(0)
    }

    async fn snapshot(&mut self) -> Result<Document> {
        if self.failing_snapshots.contains(&self.active_url()) {
            return Err(CrawlError::MissingRegion("page source".to_string()));
        }
        Ok(Document::parse(self.active_url(), &self.active_html()))
    }
}

fn test_config(page_size: u32) -> CrawlConfig {
    let mut config = CrawlConfig::new(LISTING_URL);
    config.page_size = page_size;
    config.page_delay_ms = 0;
    config.settle_delay_ms = 0;
    config.load_retries = 0;
    config.status_report_every = None;
    config.selectors.listing_ready = RESULTS_READY.to_string();
    config
}

fn paginator(browser: FakeBrowser, config: CrawlConfig) -> Paginator<FakeBrowser, EventLog> {
    Paginator::new(browser, EventLog::default(), config).unwrap()
}

#[tokio::test]
async fn test_short_page_followed_by_empty_page_completes() {
    let mut crawl = paginator(FakeBrowser::with_pages(&[50, 12]), test_config(50));
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 62);
    assert_eq!(outcome.pages_fetched, 3);
    assert_eq!(
        outcome.stop_reason,
        StopReason::ShortPages {
            page: 3,
            confirmations: 2
        }
    );
    assert!(!outcome.possibly_incomplete);
    assert_eq!(outcome.records[0].title(), "Item 1-1");
    assert_eq!(outcome.records[61].title(), "Item 2-12");
}

#[tokio::test]
async fn test_partial_last_page_is_included() {
    let mut crawl = paginator(FakeBrowser::with_pages(&[50, 50, 3]), test_config(50));
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 103);
    assert_eq!(outcome.pages_fetched, 4);
    assert!(!outcome.possibly_incomplete);
}

#[tokio::test]
async fn test_consecutive_short_pages_stop_without_extra_fetch() {
    let mut crawl = paginator(FakeBrowser::with_pages(&[49, 49, 49]), test_config(50));
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 98);
    assert_eq!(outcome.pages_fetched, 2);
    assert_eq!(
        outcome.stop_reason,
        StopReason::ShortPages {
            page: 2,
            confirmations: 2
        }
    );

    let weak = crawl
        .observer()
        .events
        .iter()
        .filter(|e| matches!(e, CrawlEvent::WeakStopSignal { .. }))
        .count();
    assert_eq!(weak, 2);
}

#[tokio::test]
async fn test_session_desync_stops_with_records_so_far() {
    let mut browser = FakeBrowser::with_pages(&[2, 2, 2, 2, 2]);
    browser.redirects.insert(3, 1);
    let mut crawl = paginator(browser, test_config(2));
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 4);
    assert_eq!(
        outcome.stop_reason,
        StopReason::SessionDesync {
            requested: 3,
            reported: 1
        }
    );
    assert!(outcome.possibly_incomplete);
    assert!(
        crawl
            .observer()
            .events
            .contains(&CrawlEvent::SessionDesync {
                requested: 3,
                reported: 1
            })
    );
}

#[tokio::test]
async fn test_failed_detail_keeps_summary_and_restores_context() {
    let mut browser = FakeBrowser::with_pages(&[3]);
    browser.failing_details.insert(detail_url(1, 1));
    browser.details.remove(&detail_url(1, 2));
    let mut crawl = paginator(browser, test_config(50));
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.records[0].title(), "Item 1-1");
    assert!(outcome.records[0].get("Description").is_none());
    assert!(outcome.records[1].get("Description").is_none());
    assert!(outcome.records[2].get("Description").is_some());

    let failures = crawl
        .observer()
        .events
        .iter()
        .filter(|e| matches!(e, CrawlEvent::DetailFailed { .. }))
        .count();
    assert_eq!(failures, 2);

    let browser = crawl.browser();
    assert_eq!(browser.contexts.len(), 1);
    assert_eq!(browser.max_open, 2);
}

#[tokio::test]
async fn test_broken_teardown_stops_the_crawl() {
    let mut browser = FakeBrowser::with_pages(&[5, 5]);
    browser.broken_teardown = true;
    let mut crawl = paginator(browser, test_config(5));
    let outcome = crawl.run().await.unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.stop_reason, StopReason::ContextLost { page: 1 });
    assert!(outcome.possibly_incomplete);
    assert!(
        crawl
            .observer()
            .events
            .iter()
            .any(|e| matches!(e, CrawlEvent::ContextLost { page: 1, .. }))
    );
}

#[tokio::test]
async fn test_record_cap_truncates_exactly() {
    let mut config = test_config(5);
    config.max_records = 7;
    let mut crawl = paginator(FakeBrowser::with_pages(&[5, 5, 5]), config);
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 7);
    assert_eq!(outcome.stop_reason, StopReason::RecordCap { limit: 7 });
    assert!(outcome.possibly_incomplete);
    assert_eq!(outcome.records[6].title(), "Item 2-2");
}

#[tokio::test]
async fn test_page_cap() {
    let mut config = test_config(5);
    config.max_pages = Some(2);
    let mut crawl = paginator(FakeBrowser::with_pages(&[5, 5, 5]), config);
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 10);
    assert_eq!(outcome.pages_fetched, 2);
    assert_eq!(outcome.stop_reason, StopReason::PageCap { limit: 2 });
}

#[tokio::test]
async fn test_no_results_marker_is_a_strong_signal() {
    let mut browser = FakeBrowser::with_pages(&[5]);
    browser.listings.insert(
        2,
        "<html><body><p>No results found for this search</p></body></html>".to_string(),
    );
    let mut crawl = paginator(browser, test_config(5));
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 5);
    assert_eq!(outcome.stop_reason, StopReason::NoResultsMarker { page: 2 });
    assert!(!outcome.possibly_incomplete);
}

#[tokio::test]
async fn test_first_page_failure_is_fatal() {
    let mut browser = FakeBrowser::with_pages(&[5]);
    browser.failing_pages.insert(1);
    let mut crawl = paginator(browser, test_config(5));

    assert!(crawl.run().await.is_err());
}

#[tokio::test]
async fn test_later_page_failure_is_retried_then_reported() {
    let mut browser = FakeBrowser::with_pages(&[5, 5]);
    browser.failing_pages.insert(2);
    let mut config = test_config(5);
    config.load_retries = 1;
    let mut crawl = paginator(browser, config);
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 5);
    assert_eq!(outcome.stop_reason, StopReason::PageLoadFailed { page: 2 });
    assert!(outcome.possibly_incomplete);

    let attempts: Vec<u32> = crawl
        .observer()
        .events
        .iter()
        .filter_map(|e| match e {
            CrawlEvent::PageLoadFailed { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2]);
}

#[tokio::test]
async fn test_interrupt_before_first_page() {
    let interrupt = Arc::new(AtomicBool::new(true));
    let mut crawl =
        paginator(FakeBrowser::with_pages(&[5]), test_config(5)).with_interrupt(interrupt);
    let outcome = crawl.run().await.unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.stop_reason, StopReason::Interrupted { page: 1 });
    assert!(crawl.browser().fetched.is_empty());
}

#[tokio::test]
async fn test_record_merges_summary_then_detail() {
    let mut crawl = paginator(FakeBrowser::with_pages(&[1]), test_config(5));
    let outcome = crawl.run().await.unwrap();
    let record = &outcome.records[0];

    assert_eq!(
        record.keys().collect::<Vec<_>>(),
        vec![
            "title",
            "link",
            "code",
            "type",
            "opening_date",
            "deadline_date",
            "stage",
            "status",
            "Description",
        ]
    );
    assert_eq!(record.text("link"), detail_url(1, 1));
    assert_eq!(record.text("code"), "CODE-1-1");
    assert_eq!(record.text("type"), "Grant");
    assert_eq!(record.text("opening_date"), "2024-03-15");
    assert_eq!(record.text("deadline_date"), "2024-04-01");
    assert_eq!(record.text("stage"), "Single-stage");
    assert_eq!(record.status(), "Open");
    assert_eq!(
        record.get("Description"),
        Some(&FieldValue::Lines(vec!["Detail body for item 1-1".to_string()]))
    );
}

#[tokio::test]
async fn test_summary_only_crawl_skips_details() {
    let mut config = test_config(5);
    config.visit_details = false;
    let mut crawl = paginator(FakeBrowser::with_pages(&[2]), config);
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.records[0].len(), 8);
    assert_eq!(crawl.browser().max_open, 0);
}

#[tokio::test]
async fn test_item_window_limits_processed_items() {
    let mut config = test_config(5);
    config.item_window = Some(ItemWindow {
        start: 1,
        end: Some(3),
    });
    let mut crawl = paginator(FakeBrowser::with_pages(&[5, 2]), config);
    let outcome = crawl.run().await.unwrap();

    let titles: Vec<&str> = outcome.records.iter().map(|r| r.title()).collect();
    assert_eq!(titles, vec!["Item 1-2", "Item 1-3", "Item 2-2"]);

    let stopped = crawl.observer().events.last().cloned();
    assert!(matches!(
        stopped,
        Some(CrawlEvent::Stopped {
            records: 3,
            items_seen: 7,
            ..
        })
    ));
}

#[tokio::test]
async fn test_status_snapshots_every_page() {
    let mut config = test_config(5);
    config.status_report_every = Some(1);
    let mut crawl = paginator(FakeBrowser::with_pages(&[5, 1]), config);
    crawl.run().await.unwrap();

    let totals: Vec<usize> = crawl
        .observer()
        .events
        .iter()
        .filter_map(|e| match e {
            CrawlEvent::StatusSnapshot {
                total, histogram, ..
            } => {
                assert_eq!(histogram.get("Open"), Some(total));
                Some(*total)
            }
            _ => None,
        })
        .collect();
    assert_eq!(totals, vec![5, 6]);
}

#[tokio::test]
async fn test_listing_filters_survive_pagination() {
    let mut crawl = paginator(FakeBrowser::with_pages(&[5]), test_config(5));
    crawl.run().await.unwrap();

    let fetched = &crawl.browser().fetched;
    assert_eq!(
        fetched[0],
        "https://catalog.test/search?pageNumber=1&pageSize=5&status=open"
    );
    assert_eq!(
        fetched[1],
        "https://catalog.test/search?pageNumber=2&pageSize=5&status=open"
    );
}

#[tokio::test]
async fn test_invalid_selector_is_rejected_up_front() {
    let mut config = test_config(5);
    config.selectors.listing_item = "[[".to_string();
    let result = Paginator::new(FakeBrowser::default(), EventLog::default(), config);
    assert!(matches!(result, Err(CrawlError::InvalidSelector { .. })));
}

#[tokio::test]
async fn test_scrape_section_page() {
    let url = "https://catalog.test/guide";
    let mut browser = FakeBrowser::default();
    browser.details.insert(
        url.to_string(),
        "<html><head><title>Guide</title></head><body>\
         <section id=\"scroll-scope\"><h2>Scope</h2><p>Covers every region of the programme</p></section>\
         </body></html>"
            .to_string(),
    );
    let mut crawl = paginator(browser, test_config(5));
    let record = crawl.scrape_section_page(url).await.unwrap();

    assert_eq!(record.title(), "Guide");
    assert_eq!(record.text("link"), url);
    assert_eq!(record.text("type"), "section-based");
    assert!(record.get("Scope").is_some());
}

#[tokio::test]
async fn test_desync_after_short_page_is_not_a_confirmation() {
    let mut browser = FakeBrowser::with_pages(&[5, 3, 5]);
    browser.redirects.insert(3, 1);
    let mut crawl = paginator(browser, test_config(5));
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 8);
    assert_eq!(
        outcome.stop_reason,
        StopReason::SessionDesync {
            requested: 3,
            reported: 1
        }
    );
    assert!(outcome.possibly_incomplete);
}

#[tokio::test]
async fn test_load_failure_after_short_page_is_not_a_confirmation() {
    let mut browser = FakeBrowser::with_pages(&[5, 3]);
    browser.unready_pages.insert(3);
    let mut crawl = paginator(browser, test_config(5));
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 8);
    assert_eq!(outcome.stop_reason, StopReason::PageLoadFailed { page: 3 });
    assert!(outcome.possibly_incomplete);
}

#[tokio::test]
async fn test_scope_is_closed_when_extraction_fails_inside_it() {
    let mut browser = FakeBrowser::with_pages(&[2]);
    browser.failing_snapshots.insert(detail_url(1, 1));
    let mut crawl = paginator(browser, test_config(5));
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert!(outcome.records[0].get("Description").is_none());
    assert!(outcome.records[1].get("Description").is_some());
    assert!(crawl.observer().events.iter().any(|e| matches!(
        e,
        CrawlEvent::DetailFailed { index: 0, url, .. } if *url == detail_url(1, 1)
    )));

    let browser = crawl.browser();
    assert_eq!(browser.closed_scopes, 2);
    assert_eq!(browser.depths_at_open, vec![1, 1]);
    assert_eq!(browser.contexts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fetches_and_retries_respect_the_minimum_delay() {
    let mut browser = FakeBrowser::with_pages(&[5, 5]);
    browser.failing_pages.insert(3);
    let mut config = test_config(5);
    config.load_retries = 1;
    let mut crawl = paginator(browser, config);
    let outcome = crawl.run().await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::PageLoadFailed { page: 3 });
    let times = &crawl.browser().fetch_times;
    assert_eq!(times.len(), 4);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= MIN_PAGE_DELAY);
    }
}
