use crate::config::{MergePrecedence, Selectors};
use crate::error::{CrawlError, Result};
use crate::parsers::PageType;
use crate::parsers::node::Node;
use crate::parsers::sections::group_sections;
use crate::parsers::text::{collapse_whitespace, extract_text_with_links};
use crate::results::{ERROR_HEADING, Record, RecordBuilder, Section};

/// Cards carrying this marker hold data already present in the summary
pub const SKIPPED_CARD_MARKER: &str = "General info";

/// Extraction stops after the card carrying this marker
pub const FINAL_CARD_MARKER: &str = "Partner search announcements";

/// Section content shorter than this (trimmed, in characters) is dropped
const MIN_SECTION_CHARS: usize = 3;

/// Sections found on one detail page
#[derive(Debug, Clone, PartialEq)]
pub struct DetailExtraction {
    pub page_type: PageType,
    pub sections: Vec<Section>,
}

/// Extracts every section of a detail page, picking the strategy from its layout
pub fn extract_detail<N: Node>(root: &N, selectors: &Selectors) -> DetailExtraction {
    let page_type = PageType::classify(root, selectors);
    let sections = match page_type.strategy() {
        PageType::Sections => extract_section_blocks(root, selectors),
        _ => extract_cards(root, selectors),
    };
    DetailExtraction {
        page_type,
        sections,
    }
}

/// Groups the content of every card, keyed by sub-header or card title
pub fn extract_cards<N: Node>(root: &N, selectors: &Selectors) -> Vec<Section> {
    let mut sections = Vec::new();

    for card in root.find_all(&selectors.detail_card) {
        let title = card
            .find_first(&selectors.detail_card_title)
            .map(|t| t.text())
            .unwrap_or_default();

        if title.is_empty() || title.contains(SKIPPED_CARD_MARKER) {
            continue;
        }

        let grouped = match card.find_first(&selectors.detail_card_content) {
            Some(content) => group_sections(&content, &selectors.section_header),
            None => vec![Section::failed(
                ERROR_HEADING,
                &CrawlError::MissingRegion("card content".to_string()),
            )],
        };

        for mut section in grouped {
            // Unstructured cards would otherwise all share one key
            if section.has_sentinel_heading() {
                section.heading = title.clone();
            }
            sections.push(section);
        }

        if title.contains(FINAL_CARD_MARKER) {
            break;
        }
    }

    sections
}

/// Section containers by id prefix, else every `section` holding a title
pub fn section_containers<N: Node>(root: &N, selectors: &Selectors) -> Vec<N> {
    let by_id = root.find_all(&selectors.detail_section);
    if !by_id.is_empty() {
        return by_id;
    }
    root.find_all(&selectors.section_element)
        .into_iter()
        .filter(|section| section.find_first(&selectors.section_title).is_some())
        .collect()
}

/// One section per titled section container
pub fn extract_section_blocks<N: Node>(root: &N, selectors: &Selectors) -> Vec<Section> {
    section_containers(root, selectors)
        .iter()
        .filter_map(|container| extract_section_block(container, selectors))
        .collect()
}

/// Reads one section container; `None` when it has no title
pub fn extract_section_block<N: Node>(container: &N, selectors: &Selectors) -> Option<Section> {
    let title = container.find_first(&selectors.section_title)?.text();
    if title.is_empty() {
        return None;
    }

    let mut content: Vec<String> = Vec::new();
    let mut push = |line: String| {
        if !line.is_empty() && !content.contains(&line) {
            content.push(line);
        }
    };

    for element in container.find_all(&selectors.section_content) {
        let text = extract_text_with_links(&element);
        if text.trim().chars().count() <= MIN_SECTION_CHARS {
            continue;
        }

        let labels: Vec<String> = element
            .find_all(&selectors.emphasis)
            .iter()
            .map(Node::text)
            .filter(|label| !label.is_empty())
            .collect();

        if !labels.is_empty() {
            for (label, value) in label_values(&element.text(), &labels) {
                push(format!("**{}**: {}", label, value));
            }
            continue;
        }

        match element.tag_name().as_str() {
            "li" => push(format!("• {}", text)),
            "ol" | "ul" => {
                for item in element.find_all(&selectors.list_item) {
                    let item_text = extract_text_with_links(&item);
                    if !item_text.is_empty() {
                        push(format!("• {}", item_text));
                    }
                }
            }
            _ => push(text),
        }
    }

    Some(Section::new(title, content))
}

/// Pairs each label with the text that follows it up to the next label.
///
/// Labels without a value are dropped.
pub fn label_values(text: &str, labels: &[String]) -> Vec<(String, String)> {
    let mut spans: Vec<(&str, usize, usize)> = Vec::new();
    let mut cursor = 0;
    for label in labels {
        if let Some(offset) = text[cursor..].find(label.as_str()) {
            let start = cursor + offset;
            cursor = start + label.len();
            spans.push((label.as_str(), start, cursor));
        }
    }

    spans
        .iter()
        .enumerate()
        .filter_map(|(i, (label, _, end))| {
            let stop = spans.get(i + 1).map(|next| next.1).unwrap_or(text.len());
            let value = collapse_whitespace(text[*end..stop].trim().trim_start_matches(':'));
            (!value.is_empty()).then(|| (label.to_string(), value))
        })
        .collect()
}

/// Builds a record for a page that is itself a sectioned document
pub fn section_page_record<N: Node>(
    root: &N,
    url: &str,
    selectors: &Selectors,
    precedence: MergePrecedence,
) -> Result<Record> {
    let title = root
        .find_first(&selectors.page_title)
        .map(|t| t.text())
        .unwrap_or_default();

    let mut record = RecordBuilder::new(precedence);
    record.text("title", title)?;
    record.text("link", url)?;
    record.text("type", "section-based")?;
    for section in extract_section_blocks(root, selectors) {
        record.section(section)?;
    }
    Ok(record.build())
}
