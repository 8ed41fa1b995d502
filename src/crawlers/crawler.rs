use crate::error::Result;
use crate::parsers::Document;

/// A fetched page and whether it reached its ready state in time.
///
/// A page that timed out still carries whatever had rendered, so the caller
/// can look for end-of-results markers in it.
pub struct PageLoad {
    pub document: Document,
    pub ready: bool,
}

/// Navigation capability the crawl runs against.
///
/// Scopes are secondary contexts (tabs) opened to visit a detail page.
/// `open_scope` must leave the browser in its original context when it
/// fails, and `close_scope` must close everything opened since the scope
/// was created and refocus the original context.
#[allow(async_fn_in_trait)]
pub trait Browser {
    type Scope;

    /// Navigate the active context to `url` and wait for `ready` to appear
    async fn fetch(&mut self, url: &str, ready: &str) -> Result<PageLoad>;

    /// Page number the active context is actually showing, if it can be told
    async fn current_page_identity(&mut self) -> Result<Option<u32>>;

    /// Open `url` in a new context and focus it
    async fn open_scope(&mut self, url: &str) -> Result<Self::Scope>;

    /// Close every context opened since `scope` and refocus the original one
    async fn close_scope(&mut self, scope: Self::Scope) -> Result<()>;

    /// Wait for `ready` to appear in the active context; `false` on timeout
    async fn wait_ready(&mut self, ready: &str) -> Result<bool>;

    /// Trigger "show more" controls under every element matching `scope`
    async fn reveal_collapsed(&mut self, scope: &str, controls: &[String]) -> Result<usize>;

    /// Parse the active context's current markup
    async fn snapshot(&mut self) -> Result<Document>;
}
