pub mod detail;
pub mod node;
pub mod sections;
pub mod summary;
pub mod text;


use crate::config::Selectors;
use node::Node;
use scraper::{ElementRef, Html};
use serde::Serialize;
use url::Url;

/// One fetched page: its URL and a parsed snapshot of its markup.
///
/// Lives only until the page has been extracted.
pub struct Document {
    pub url: String,
    html: Html,
}

impl Document {
    pub fn parse(url: impl Into<String>, source: &str) -> Self {
        Self {
            url: url.into(),
            html: Html::parse_document(source),
        }
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    pub fn base_url(&self) -> Option<Url> {
        Url::parse(&self.url).ok()
    }

    /// Visible text of the whole page
    pub fn text(&self) -> String {
        Node::text(&self.root())
    }
}

/// Extraction strategy for a detail page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    /// The page is made of card containers
    Cards,
    /// The page is made of section containers
    Sections,
    /// Neither was found; handled like cards
    Ambiguous,
}

impl PageType {
    /// Determines the page type from the containers the page exposes
    pub fn classify<N: Node>(root: &N, selectors: &Selectors) -> Self {
        if root.find_first(&selectors.detail_card).is_some() {
            PageType::Cards
        } else if root.find_first(&selectors.detail_section).is_some()
            || root.find_first(&selectors.section_heading_fallback).is_some()
        {
            PageType::Sections
        } else {
            PageType::Ambiguous
        }
    }

    /// The strategy actually used for extraction
    pub fn strategy(&self) -> PageType {
        match self {
            PageType::Sections => PageType::Sections,
            PageType::Cards | PageType::Ambiguous => PageType::Cards,
        }
    }
}
