// Re-export modules
pub mod config;
pub mod crawlers;
pub mod error;
pub mod events;
pub mod monitor;
pub mod parsers;
pub mod results;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::CrawlConfig;
pub use error::{CrawlError, Result};
pub use events::{CrawlEvent, CrawlObserver, EventLog, LogObserver};
pub use results::{CrawlOutcome, Record, Section, StopReason};

use crawlers::pagination::Paginator;
use crawlers::web::WebBrowser;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Main builder for a crawl of one paginated catalog
pub struct Crawl {
    config: CrawlConfig,
    interrupt: Arc<AtomicBool>,
}

impl Crawl {
    /// Create a new Crawl builder for the given listing URL
    pub fn new(start_url: &str) -> Self {
        Self::with_config(CrawlConfig::new(start_url))
    }

    /// Use a complete configuration
    pub fn with_config(config: CrawlConfig) -> Self {
        Self {
            config,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Load configuration from a file, keeping the given listing URL if set
    pub fn with_config_file(self, path: impl AsRef<std::path::Path>) -> Result<Self> {
        let mut config = CrawlConfig::from_file(path)?;
        if !self.config.start_url.is_empty() {
            config.start_url = self.config.start_url;
        }
        Ok(Self { config, ..self })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.config.page_size = page_size;
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.config.max_pages = Some(max_pages);
        self
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.config.max_records = max_records;
        self
    }

    /// Only collect listing summaries, without visiting detail pages
    pub fn summary_only(mut self) -> Self {
        self.config.visit_details = false;
        self
    }

    /// Stop at the next safe point once `interrupt` is set
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Run the crawl against a WebDriver session
    pub async fn run(self) -> Result<CrawlOutcome> {
        let config = self.resolved_config()?;
        let browser = WebBrowser::connect(&config).await?;
        let mut paginator =
            Paginator::new(browser, LogObserver, config)?.with_interrupt(self.interrupt);

        let outcome = paginator.run().await;
        let (browser, _) = paginator.into_parts();
        browser.close().await;
        outcome
    }

    /// Scrape a single sectioned page instead of crawling a listing
    pub async fn run_section_page(mut self, url: &str) -> Result<Record> {
        if self.config.start_url.is_empty() {
            self.config.start_url = url.to_string();
        }
        let config = self.resolved_config()?;
        let browser = WebBrowser::connect(&config).await?;
        let mut paginator = Paginator::new(browser, LogObserver, config)?;

        let record = paginator.scrape_section_page(url).await;
        let (browser, _) = paginator.into_parts();
        browser.close().await;
        record
    }

    /// Validated configuration with environment overrides applied.
    ///
    /// Runs before a WebDriver session exists, so a bad configuration never
    /// leaves a session behind.
    fn resolved_config(&self) -> Result<CrawlConfig> {
        let mut config = self.config.clone();

        // Override the WebDriver URL with an environment variable if provided
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                config.webdriver_url = webdriver_url;
            }
        }

        config.compile()?;
        url::Url::parse(&config.start_url)?;
        Ok(config)
    }
}
