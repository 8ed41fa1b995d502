use crate::config::Selectors;
use crate::error::Result;
use crate::parsers::node::Node;
use crate::results::RecordBuilder;
use chrono::NaiveDate;
use serde::Serialize;
use url::Url;

/// Date format used by the catalog, e.g. `15 March 2024`
const CATALOG_DATE_FORMAT: &str = "%d %B %Y";

/// Fixed summary fields of one listing item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub title: String,
    pub link: String,
    pub code: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub opening_date: String,
    pub deadline_date: String,
    pub stage: String,
    pub status: String,
}

impl Summary {
    /// Write the summary fields into a record, in their canonical order
    pub fn write_into(&self, record: &mut RecordBuilder) -> Result<()> {
        record.text("title", &self.title)?;
        record.text("link", &self.link)?;
        record.text("code", &self.code)?;
        record.text("type", &self.kind)?;
        record.text("opening_date", &self.opening_date)?;
        record.text("deadline_date", &self.deadline_date)?;
        record.text("stage", &self.stage)?;
        record.text("status", &self.status)?;
        Ok(())
    }
}

/// Parses a catalog date into `YYYY-MM-DD`, or `""` when it does not parse
pub fn parse_catalog_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw.trim(), CATALOG_DATE_FORMAT)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Extracts the summary fields from one listing item.
///
/// Returns `None` only when the item has no title anchor; every other
/// missing piece degrades to an empty string.
pub fn parse_summary<N: Node>(item: &N, selectors: &Selectors, base: Option<&Url>) -> Option<Summary> {
    let anchor = item.find_first(&selectors.item_title_link)?;

    let link = anchor
        .link_target()
        .map(|href| resolve_link(&href, base))
        .unwrap_or_default();

    let (labels, emphasis) = match item.find_first(&selectors.item_subtitle) {
        Some(subtitle) => (
            texts(&subtitle.find_all(&selectors.item_label)),
            texts(&subtitle.find_all(&selectors.item_emphasis)),
        ),
        None => (Vec::new(), Vec::new()),
    };

    let status = item
        .find_first(&selectors.item_status)
        .map(|label| label.text())
        .unwrap_or_default();

    Some(Summary {
        title: anchor.text(),
        link,
        code: labels.first().cloned().unwrap_or_default(),
        kind: labels.get(2).cloned().unwrap_or_default(),
        opening_date: emphasis.first().map(|d| parse_catalog_date(d)).unwrap_or_default(),
        deadline_date: emphasis.get(1).map(|d| parse_catalog_date(d)).unwrap_or_default(),
        stage: labels.last().cloned().unwrap_or_default(),
        status,
    })
}

fn texts<N: Node>(nodes: &[N]) -> Vec<String> {
    nodes.iter().map(Node::text).collect()
}

/// Resolve a possibly relative link against the page it was found on
fn resolve_link(href: &str, base: Option<&Url>) -> String {
    match base.map(|b| b.join(href)) {
        Some(Ok(resolved)) => resolved.to_string(),
        _ => href.to_string(),
    }
}
