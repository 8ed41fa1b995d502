use crate::error::{CrawlError, Result};
use crate::parsers::node::Node;
use crate::parsers::text::extract_text_with_links;
use crate::results::{CONTENT_HEADING, Section};
use scraper::Selector;
use std::ops::Range;

/// Shortest text (in characters, trimmed) kept as section content is one more than this
const MIN_CONTENT_CHARS: usize = 5;

/// A header discovered inside a container
struct Header<N> {
    node: N,
    title: String,
}

/// Partitions the content of `container` into sections, one per header.
///
/// Headers are the descendants matching `header_selector` that carry text.
/// Each header owns the elements strictly between itself and the next
/// header in document order, leaving out elements that wrap a header.
/// Without any header the whole container becomes a single `"content"`
/// section.
pub fn group_sections<N: Node>(container: &N, header_selector: &Selector) -> Vec<Section> {
    let headers: Vec<Header<N>> = container
        .find_all(header_selector)
        .into_iter()
        .filter_map(|node| {
            let title = node.text();
            (!title.is_empty()).then_some(Header { node, title })
        })
        .collect();

    if headers.is_empty() {
        return vec![unstructured(container)];
    }

    let flat = container.descendants();
    let titles: Vec<&str> = headers.iter().map(|h| h.title.as_str()).collect();

    headers
        .iter()
        .enumerate()
        .map(|(i, header)| match header_range(&flat, &headers, i) {
            Ok(range) => Section::new(
                header.title.clone(),
                collect_range(&flat[range], &headers, &titles),
            ),
            Err(e) => Section::failed(header.title.clone(), &e),
        })
        .collect()
}

/// Fallback for containers without headers
fn unstructured<N: Node>(container: &N) -> Section {
    let text = extract_text_with_links(container);
    if text.is_empty() {
        Section::new(CONTENT_HEADING, Vec::new())
    } else {
        Section::new(CONTENT_HEADING, vec![text])
    }
}

fn position<N: Node>(flat: &[N], header: &Header<N>) -> Result<usize> {
    flat.iter()
        .position(|n| *n == header.node)
        .ok_or_else(|| CrawlError::HeaderNotFound(header.title.clone()))
}

/// Indices of `flat` strictly between header `i` and the next header
fn header_range<N: Node>(flat: &[N], headers: &[Header<N>], i: usize) -> Result<Range<usize>> {
    let start = position(flat, &headers[i])? + 1;
    let end = match headers.get(i + 1) {
        Some(next) => position(flat, next)?,
        None => flat.len(),
    };
    Ok(start..end.max(start))
}

/// Whether `element` wraps one of the headers
fn contains_header<N: Node>(element: &N, headers: &[Header<N>]) -> bool {
    element
        .descendants()
        .iter()
        .any(|node| headers.iter().any(|h| h.node == *node))
}

fn collect_range<N: Node>(elements: &[N], headers: &[Header<N>], titles: &[&str]) -> Vec<String> {
    let mut content: Vec<String> = Vec::new();
    for element in elements {
        if titles.contains(&element.text().as_str()) || contains_header(element, headers) {
            continue;
        }
        let text = extract_text_with_links(element);
        let text = text.trim();
        if text.chars().count() <= MIN_CONTENT_CHARS || titles.contains(&text) {
            continue;
        }
        let line = format_element(element, text);
        if !content.contains(&line) {
            content.push(line);
        }
    }
    content
}

/// Formats content by tag: bullets for list items, bold for emphasis
pub fn format_element<N: Node>(element: &N, text: &str) -> String {
    match element.tag_name().as_str() {
        "li" => format!("• {}", text),
        "strong" | "b" => format!("**{}**", text),
        _ => text.to_string(),
    }
}
