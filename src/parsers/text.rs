use crate::parsers::node::{Child, Node};

/// Collapses every run of whitespace into a single space and trims the ends
pub fn collapse_whitespace(segment: &str) -> String {
    segment.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Renders an anchor as `[text](href)`, or bare text when either part is missing
fn render_anchor<N: Node>(anchor: &N) -> String {
    let text = anchor.text();
    match anchor.link_target() {
        Some(href) if !text.is_empty() => format!("[{}]({})", text, href),
        _ => text,
    }
}

/// Extracts the text under `node` while keeping links as markdown links.
///
/// Walks the subtree depth first. Anchors are rendered whole and not
/// descended into; text runs of other elements are kept unless they were
/// already captured, which stops nested containers from echoing their
/// children. When the walk yields nothing the node's direct text is used.
pub fn extract_text_with_links<N: Node>(node: &N) -> String {
    if node.is_anchor() {
        return render_anchor(node);
    }

    let mut parts: Vec<String> = Vec::new();
    let mut stack: Vec<Child<N>> = node.child_nodes().into_iter().rev().collect();

    while let Some(child) = stack.pop() {
        match child {
            Child::Element(element) if element.is_anchor() => {
                let rendered = render_anchor(&element);
                if !rendered.is_empty() {
                    parts.push(rendered);
                }
            }
            Child::Element(element) => {
                stack.extend(element.child_nodes().into_iter().rev());
            }
            Child::Text(text) => {
                let text = collapse_whitespace(&text);
                if !text.is_empty() && !parts.join(" ").contains(&text) {
                    parts.push(text);
                }
            }
        }
    }

    if parts.is_empty() {
        return node.own_text();
    }

    parts.join(" ")
}
