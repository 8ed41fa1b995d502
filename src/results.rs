use crate::config::MergePrecedence;
use crate::error::{CrawlError, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Placeholder content for a section that yielded nothing.
pub const NO_CONTENT: &str = "No content found";

/// Heading used when a container has no headers at all.
pub const CONTENT_HEADING: &str = "content";

/// Heading used when a whole container could not be grouped.
pub const ERROR_HEADING: &str = "error";

/// A named, ordered group of formatted content lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    pub content: Vec<String>,
}

impl Section {
    /// Create a section, substituting the sentinel for empty content.
    pub fn new(heading: impl Into<String>, content: Vec<String>) -> Self {
        let content = if content.is_empty() {
            vec![NO_CONTENT.to_string()]
        } else {
            content
        };
        Self {
            heading: heading.into(),
            content,
        }
    }

    /// A section whose heading could be grouped but whose content failed.
    pub fn failed(heading: impl Into<String>, error: &CrawlError) -> Self {
        Self {
            heading: heading.into(),
            content: vec![format!("Error: {}", error)],
        }
    }

    /// Whether the heading is one of the placeholder headings.
    pub fn has_sentinel_heading(&self) -> bool {
        self.heading == CONTENT_HEADING || self.heading == ERROR_HEADING
    }
}

/// Value of a single record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Lines(Vec<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Lines(_) => None,
        }
    }
}

/// One fully assembled crawled item.
///
/// Fields keep their insertion order: summary fields first, then detail
/// sections in the order they were discovered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Text value of a field, or `""` when absent or not text.
    pub fn text(&self, key: &str) -> &str {
        self.get(key).and_then(FieldValue::as_text).unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.text("title")
    }

    pub fn status(&self) -> &str {
        self.text("status")
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Assembles a [`Record`] field by field.
#[derive(Debug)]
pub struct RecordBuilder {
    precedence: MergePrecedence,
    fields: Vec<(String, FieldValue)>,
}

impl RecordBuilder {
    pub fn new(precedence: MergePrecedence) -> Self {
        Self {
            precedence,
            fields: Vec::new(),
        }
    }

    /// Insert a field, resolving a key collision according to the precedence.
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) -> Result<()> {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            None => self.fields.push((key, value)),
            Some((_, existing)) => match self.precedence {
                MergePrecedence::Overwrite => *existing = value,
                MergePrecedence::KeepExisting => {}
                MergePrecedence::Reject => return Err(CrawlError::KeyCollision(key)),
            },
        }
        Ok(())
    }

    pub fn text(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.insert(key, FieldValue::Text(value.into()))
    }

    pub fn section(&mut self, section: Section) -> Result<()> {
        self.insert(section.heading, FieldValue::Lines(section.content))
    }

    pub fn build(self) -> Record {
        Record {
            fields: self.fields,
        }
    }
}

/// Why a crawl stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// A page loaded but contained no items.
    NoItems { page: u32 },
    /// The page carried an explicit "no results" marker.
    NoResultsMarker { page: u32 },
    /// Enough consecutive short pages (or a short page followed by an
    /// empty / redirected one) confirmed the last page.
    ShortPages { page: u32, confirmations: u32 },
    /// The record safety cap was reached.
    RecordCap { limit: usize },
    /// The configured page limit was reached.
    PageCap { limit: u32 },
    /// A page never became ready.
    PageLoadFailed { page: u32 },
    /// The browser reported a different page than was requested.
    SessionDesync { requested: u32, reported: u32 },
    /// A detail scope could not be torn down.
    ContextLost { page: u32 },
    /// The process was interrupted.
    Interrupted { page: u32 },
}

impl StopReason {
    /// Whether records may be missing from the result.
    pub fn possibly_incomplete(&self) -> bool {
        !matches!(
            self,
            StopReason::NoItems { .. }
                | StopReason::NoResultsMarker { .. }
                | StopReason::ShortPages { .. }
        )
    }
}

/// Everything a crawl produced.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlOutcome {
    pub possibly_incomplete: bool,
    pub stop_reason: StopReason,
    pub pages_fetched: u32,
    pub records: Vec<Record>,
}

impl CrawlOutcome {
    pub fn new(records: Vec<Record>, pages_fetched: u32, stop_reason: StopReason) -> Self {
        Self {
            possibly_incomplete: stop_reason.possibly_incomplete(),
            stop_reason,
            pages_fetched,
            records,
        }
    }
}
