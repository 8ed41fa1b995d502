use crate::config::CrawlConfig;
use crate::crawlers::crawler::{Browser, PageLoad};
use crate::error::{CrawlError, Result};
use crate::parsers::Document;
use crate::utils::page_number_from_url;
use fantoccini::error::CmdError;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Marks controls that were already triggered so a second pass skips them
const REVEALED_ATTR: &str = "data-revealed";

const CHROME_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-software-rasterizer",
    "--disable-extensions",
    "--disable-logging",
    "--window-size=1920,1080",
];

/// Windows that were open, and the focused one, when a detail scope began
#[derive(Debug, Clone)]
pub struct WindowScope {
    original: Vec<WindowHandle>,
    active: WindowHandle,
}

/// [`Browser`] backed by a WebDriver session
pub struct WebBrowser {
    client: Client,
    wait_timeout: Duration,
    reveal_pause: Duration,
    reveal_settle: Duration,
}

impl WebBrowser {
    /// Connects to the configured WebDriver, falling back to common local ports
    pub async fn connect(config: &CrawlConfig) -> Result<Self> {
        let client = connect_to_webdriver(&config.webdriver_url, config.headless).await?;
        Ok(Self {
            client,
            wait_timeout: config.wait_timeout(),
            reveal_pause: config.reveal_pause(),
            reveal_settle: config.reveal_settle(),
        })
    }

    /// Ends the WebDriver session
    pub async fn close(self) {
        if let Err(e) = self.client.close().await {
            ::log::warn!("Failed to close WebDriver session: {}", e);
        }
    }

    async fn teardown(&mut self, scope: &WindowScope) -> std::result::Result<(), CmdError> {
        for handle in self.client.windows().await? {
            if !scope.original.contains(&handle) {
                self.client.switch_to_window(handle).await?;
                self.client.close_window().await?;
            }
        }
        self.client.switch_to_window(scope.active.clone()).await
    }

    async fn open_in_new_window(&mut self, url: &str) -> std::result::Result<(), CmdError> {
        let window = self.client.new_window(true).await?;
        self.client.switch_to_window(window.handle).await?;
        self.client.goto(url).await
    }

    /// Clicks one control through script so overlays cannot intercept it
    async fn trigger(&mut self, control: &fantoccini::elements::Element) -> Result<bool> {
        if !control.is_displayed().await? || !control.is_enabled().await? {
            return Ok(false);
        }
        let script = format!(
            "arguments[0].setAttribute('{}', '1'); arguments[0].click();",
            REVEALED_ATTR
        );
        self.client
            .execute(&script, vec![serde_json::to_value(control)?])
            .await?;
        Ok(true)
    }
}

impl Browser for WebBrowser {
    type Scope = WindowScope;

    async fn fetch(&mut self, url: &str, ready: &str) -> Result<PageLoad> {
        self.client.goto(url).await?;
        let ready = self.wait_ready(ready).await?;
        let document = self.snapshot().await?;
        Ok(PageLoad { document, ready })
    }

    async fn current_page_identity(&mut self) -> Result<Option<u32>> {
        let url = self.client.current_url().await?;
        Ok(page_number_from_url(url.as_str()))
    }

    async fn open_scope(&mut self, url: &str) -> Result<WindowScope> {
        let scope = WindowScope {
            original: self.client.windows().await?,
            active: self.client.window().await?,
        };

        if let Err(e) = self.open_in_new_window(url).await {
            ::log::warn!("Failed to open {} in a new window: {}", url, e);
            self.teardown(&scope)
                .await
                .map_err(|e| CrawlError::ScopeTeardown(e.to_string()))?;
            return Err(e.into());
        }

        Ok(scope)
    }

    async fn close_scope(&mut self, scope: WindowScope) -> Result<()> {
        self.teardown(&scope)
            .await
            .map_err(|e| CrawlError::ScopeTeardown(e.to_string()))
    }

    async fn wait_ready(&mut self, ready: &str) -> Result<bool> {
        match self
            .client
            .wait()
            .at_most(self.wait_timeout)
            .for_element(Locator::Css(ready))
            .await
        {
            Ok(_) => Ok(true),
            Err(CmdError::WaitTimeout) => {
                ::log::debug!("Timed out waiting for `{}`", ready);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reveal_collapsed(&mut self, scope: &str, controls: &[String]) -> Result<usize> {
        let mut clicked = 0;

        for container in self.client.find_all(Locator::Css(scope)).await? {
            for control in controls {
                let pending = format!("{}:not([{}])", control, REVEALED_ATTR);
                let found = match container.find_all(Locator::Css(&pending)).await {
                    Ok(found) => found,
                    Err(e) => {
                        ::log::debug!("No controls for `{}`: {}", control, e);
                        continue;
                    }
                };

                for button in found {
                    match self.trigger(&button).await {
                        Ok(true) => {
                            clicked += 1;
                            ::log::debug!("Clicked 'Show more' control matching `{}`", control);
                            tokio::time::sleep(self.reveal_pause).await;
                        }
                        Ok(false) => {}
                        Err(e) => ::log::debug!("Couldn't click control `{}`: {}", control, e),
                    }
                }
            }
        }

        if clicked > 0 {
            ::log::info!("Clicked {} show more controls", clicked);
            tokio::time::sleep(self.reveal_settle).await;
        }

        Ok(clicked)
    }

    async fn snapshot(&mut self) -> Result<Document> {
        let url = self.client.current_url().await?;
        let source = self.client.source().await?;
        Ok(Document::parse(url.as_str(), &source))
    }
}

/// Chrome capabilities for a (by default headless) session
fn capabilities(headless: bool) -> Map<String, Value> {
    let mut args: Vec<&str> = CHROME_ARGS.to_vec();
    if headless {
        args.push("--headless");
    }
    let mut caps = Map::new();
    caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
    caps
}

/// Connects to the WebDriver instance
async fn connect_to_webdriver(webdriver_url: &str, headless: bool) -> Result<Client> {
    let mut builder = ClientBuilder::native();
    builder.capabilities(capabilities(headless));

    match builder.connect(webdriver_url).await {
        Ok(client) => {
            ::log::debug!("Connected to WebDriver at {}", webdriver_url);
            return Ok(client);
        }
        Err(e) => {
            ::log::error!("Failed to connect to WebDriver at {}: {}", webdriver_url, e);
        }
    }

    // If we couldn't connect, try with common alternative URLs
    let fallback_urls = [
        "http://localhost:9515", // ChromeDriver default
        "http://127.0.0.1:4444",
    ];

    let mut tried = vec![webdriver_url.to_string()];
    for url in fallback_urls.iter() {
        if *url == webdriver_url {
            continue;
        }

        ::log::info!("Trying fallback WebDriver URL: {}", url);
        tried.push(url.to_string());
        if let Ok(client) = builder.connect(url).await {
            ::log::debug!("Connected to fallback WebDriver at {}", url);
            return Ok(client);
        }
    }

    ::log::error!(
        "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
    );
    Err(CrawlError::Connect(tried.join(", ")))
}
