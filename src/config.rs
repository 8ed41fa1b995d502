use crate::error::{CrawlError, Result};
use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Politeness floor between successive listing page fetches.
pub const MIN_PAGE_DELAY: Duration = Duration::from_millis(200);

/// How a detail section heading that equals an existing field is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePrecedence {
    /// The later write wins.
    #[default]
    Overwrite,
    /// The first write wins and the section is dropped.
    KeepExisting,
    /// The collision fails the item.
    Reject,
}

/// Half-open range `[start, end)` of items to process on every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemWindow {
    pub start: usize,
    pub end: Option<usize>,
}

impl ItemWindow {
    /// Clamp the window to `len` items.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let end = self.end.unwrap_or(len).min(len);
        (self.start.min(end), end)
    }
}

/// Markup conventions of the catalog being crawled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Present once a listing page has rendered its items
    pub listing_ready: String,
    /// One summary item on a listing page
    pub listing_item: String,
    /// Primary title anchor inside a summary item
    pub item_title_link: String,
    /// Subtitle container holding code, type, dates and stage
    pub item_subtitle: String,
    /// Short labels inside the subtitle
    pub item_label: String,
    /// Emphasized labels (dates) inside the subtitle
    pub item_emphasis: String,
    /// Status label inside a summary item
    pub item_status: String,
    /// Present once a detail page has rendered
    pub detail_ready: String,
    /// Card container on a detail page
    pub detail_card: String,
    /// Title of a detail card
    pub detail_card_title: String,
    /// Content region of a detail card
    pub detail_card_content: String,
    /// Sub-headers inside a card content region
    pub section_header: String,
    /// Section containers, by id prefix
    pub detail_section: String,
    /// Sub-heading inside a section container
    pub section_title: String,
    /// Content elements inside a section container
    pub section_content: String,
    /// Page title for section-only pages
    pub page_title: String,
    /// "Show more" controls, most specific first
    pub reveal_controls: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            listing_ready: "eui-card-header".to_string(),
            listing_item: "eui-card-header".to_string(),
            item_title_link: "a.eui-u-text-link".to_string(),
            item_subtitle: ".eui-card-header__title-container-subtitle".to_string(),
            item_label: "span".to_string(),
            item_emphasis: "strong".to_string(),
            item_status: "span.eui-label".to_string(),
            detail_ready: "eui-card, section".to_string(),
            detail_card: "eui-card".to_string(),
            detail_card_title: "eui-card-header-title.eui-card-header__title-container-title"
                .to_string(),
            detail_card_content: "eui-card-content".to_string(),
            section_header: ".eui-card-header__title-container-title, h3, h4".to_string(),
            detail_section: "section[id^='scroll-']".to_string(),
            section_title: "h2".to_string(),
            section_content: "div.eui-input-group, div.sedia-base, ol, ul, p, div.row"
                .to_string(),
            page_title: "h1, title".to_string(),
            reveal_controls: vec![
                "sedia-show-more button".to_string(),
                "button[class*='show-more']".to_string(),
                "button[class*='expand']".to_string(),
                ".show-more".to_string(),
                "[data-toggle='collapse']".to_string(),
            ],
        }
    }
}

/// Configuration for a paginated catalog crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Listing URL; its query filters are kept on every page
    #[serde(default)]
    pub start_url: String,

    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Run the browser without a window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Items requested per listing page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Safety cap on the number of accumulated records
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Last page to fetch (unbounded when unset)
    #[serde(default)]
    pub max_pages: Option<u32>,

    /// Delay between listing page fetches, never below [`MIN_PAGE_DELAY`]
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Time a detail page is given to settle after opening
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Pause after each triggered "show more" control
    #[serde(default = "default_reveal_pause_ms")]
    pub reveal_pause_ms: u64,

    /// Time given to expanded content after "show more" controls fired
    #[serde(default = "default_reveal_settle_ms")]
    pub reveal_settle_ms: u64,

    /// Wait budget for a page to become ready
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// Extra attempts for a listing page that failed to load
    #[serde(default = "default_load_retries")]
    pub load_retries: u32,

    /// Consecutive short pages needed before stopping
    #[serde(default = "default_stop_confirmations")]
    pub stop_confirmations: u32,

    /// Whether to open every item's detail page
    #[serde(default = "default_visit_details")]
    pub visit_details: bool,

    /// Restrict processing to a slice of every page's items
    #[serde(default)]
    pub item_window: Option<ItemWindow>,

    /// Emit a status histogram every N pages
    #[serde(default = "default_status_report_every")]
    pub status_report_every: Option<u32>,

    /// Resolution of section headings that collide with existing fields
    #[serde(default)]
    pub merge_precedence: MergePrecedence,

    /// Text pattern marking an explicit "no results" page
    #[serde(default = "default_no_results_pattern")]
    pub no_results_pattern: String,

    /// Markup conventions
    #[serde(default)]
    pub selectors: SelectorConfig,
}

impl CrawlConfig {
    /// Create a new configuration with default values
    pub fn new(start_url: &str) -> Self {
        Self {
            start_url: start_url.to_string(),
            webdriver_url: default_webdriver_url(),
            headless: default_headless(),
            page_size: default_page_size(),
            max_records: default_max_records(),
            max_pages: None,
            page_delay_ms: default_page_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            reveal_pause_ms: default_reveal_pause_ms(),
            reveal_settle_ms: default_reveal_settle_ms(),
            wait_timeout_secs: default_wait_timeout_secs(),
            load_retries: default_load_retries(),
            stop_confirmations: default_stop_confirmations(),
            visit_details: default_visit_details(),
            item_window: None,
            status_report_every: default_status_report_every(),
            merge_precedence: MergePrecedence::default(),
            no_results_pattern: default_no_results_pattern(),
            selectors: SelectorConfig::default(),
        }
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms).max(MIN_PAGE_DELAY)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn reveal_pause(&self) -> Duration {
        Duration::from_millis(self.reveal_pause_ms)
    }

    pub fn reveal_settle(&self) -> Duration {
        Duration::from_millis(self.reveal_settle_ms)
    }

    /// Elements whose collapsed content is revealed on detail pages
    pub fn reveal_scope(&self) -> String {
        format!(
            "{}, {}",
            self.selectors.detail_card_content, self.selectors.detail_section
        )
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    /// Validate selectors and patterns up front.
    pub fn compile(&self) -> Result<Selectors> {
        Selectors::compile(&self.selectors, &self.no_results_pattern)
    }
}

/// Parsed form of [`SelectorConfig`].
#[derive(Debug, Clone)]
pub struct Selectors {
    pub listing_item: Selector,
    pub item_title_link: Selector,
    pub item_subtitle: Selector,
    pub item_label: Selector,
    pub item_emphasis: Selector,
    pub item_status: Selector,
    pub detail_card: Selector,
    pub detail_card_title: Selector,
    pub detail_card_content: Selector,
    pub section_header: Selector,
    pub detail_section: Selector,
    pub section_heading_fallback: Selector,
    pub section_element: Selector,
    pub section_title: Selector,
    pub section_content: Selector,
    pub page_title: Selector,
    pub list_item: Selector,
    pub emphasis: Selector,
    pub no_results: Regex,
}

impl Selectors {
    pub fn compile(config: &SelectorConfig, no_results_pattern: &str) -> Result<Self> {
        Ok(Self {
            listing_item: parse_selector(&config.listing_item)?,
            item_title_link: parse_selector(&config.item_title_link)?,
            item_subtitle: parse_selector(&config.item_subtitle)?,
            item_label: parse_selector(&config.item_label)?,
            item_emphasis: parse_selector(&config.item_emphasis)?,
            item_status: parse_selector(&config.item_status)?,
            detail_card: parse_selector(&config.detail_card)?,
            detail_card_title: parse_selector(&config.detail_card_title)?,
            detail_card_content: parse_selector(&config.detail_card_content)?,
            section_header: parse_selector(&config.section_header)?,
            detail_section: parse_selector(&config.detail_section)?,
            section_heading_fallback: parse_selector(&format!("section {}", config.section_title))?,
            section_element: parse_selector("section")?,
            section_title: parse_selector(&config.section_title)?,
            section_content: parse_selector(&config.section_content)?,
            page_title: parse_selector(&config.page_title)?,
            list_item: parse_selector("li")?,
            emphasis: parse_selector("strong")?,
            no_results: Regex::new(no_results_pattern)?,
        })
    }
}

impl Default for Selectors {
    fn default() -> Self {
        Self::compile(&SelectorConfig::default(), &default_no_results_pattern())
            .expect("Default selectors should be valid")
    }
}

/// Parse a CSS selector, keeping the selector text in the error
pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| CrawlError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Default value for webdriver_url
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_page_size() -> u32 {
    50
}

fn default_max_records() -> usize {
    10_000
}

fn default_page_delay_ms() -> u64 {
    2000
}

fn default_settle_delay_ms() -> u64 {
    3000
}

fn default_reveal_pause_ms() -> u64 {
    1000
}

fn default_reveal_settle_ms() -> u64 {
    2000
}

fn default_wait_timeout_secs() -> u64 {
    10
}

fn default_load_retries() -> u32 {
    1
}

fn default_stop_confirmations() -> u32 {
    2
}

fn default_visit_details() -> bool {
    true
}

fn default_status_report_every() -> Option<u32> {
    Some(5)
}

fn default_no_results_pattern() -> String {
    r"(?i)\bno (results|items|matching records) (found|available)\b".to_string()
}
