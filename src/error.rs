use thiserror::Error;

/// Errors surfaced by the crawler.
///
/// Only a few of these ever reach the caller of a crawl: most are absorbed
/// per item or per page and reported as events instead.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("failed to connect to any WebDriver server (tried {0})")]
    Connect(String),

    #[error("WebDriver command failed: {0}")]
    Command(#[from] fantoccini::error::CmdError),

    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field `{0}` is already set on this record")]
    KeyCollision(String),

    #[error("no `{0}` region found")]
    MissingRegion(String),

    #[error("header `{0}` not found in its container")]
    HeaderNotFound(String),

    #[error("failed to restore the original browser context: {0}")]
    ScopeTeardown(String),
}

pub type Result<T> = std::result::Result<T, CrawlError>;
