use crate::parsers::text::collapse_whitespace;
use scraper::{ElementRef, Selector};

/// A direct child of a [`Node`]: either a run of text or an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Child<N> {
    Text(String),
    Element(N),
}

/// Read-only view of one element of a rendered page.
///
/// Extraction only ever walks elements through this trait, so it does not
/// care which markup engine produced the tree.
pub trait Node: Clone + PartialEq {
    /// Lower-case tag name
    fn tag_name(&self) -> String;

    /// All descendant text, whitespace collapsed
    fn text(&self) -> String;

    /// Direct children (text runs and elements) in document order
    fn child_nodes(&self) -> Vec<Child<Self>>;

    /// Link target of an anchor-like node
    fn link_target(&self) -> Option<String>;

    fn matches(&self, selector: &Selector) -> bool;

    /// Element children in document order
    fn children(&self) -> Vec<Self> {
        self.child_nodes()
            .into_iter()
            .filter_map(|child| match child {
                Child::Element(node) => Some(node),
                Child::Text(_) => None,
            })
            .collect()
    }

    /// Text of the direct text children only, whitespace collapsed
    fn own_text(&self) -> String {
        let parts: Vec<String> = self
            .child_nodes()
            .into_iter()
            .filter_map(|child| match child {
                Child::Text(text) => Some(text),
                Child::Element(_) => None,
            })
            .collect();
        collapse_whitespace(&parts.join(" "))
    }

    fn is_anchor(&self) -> bool {
        self.tag_name() == "a"
    }

    /// Every descendant element in document order, excluding `self`
    fn descendants(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut stack: Vec<Self> = self.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            stack.extend(node.children().into_iter().rev());
            out.push(node);
        }
        out
    }

    /// Descendants matching `selector`, in document order
    fn find_all(&self, selector: &Selector) -> Vec<Self> {
        self.descendants()
            .into_iter()
            .filter(|n| n.matches(selector))
            .collect()
    }

    fn find_first(&self, selector: &Selector) -> Option<Self> {
        self.descendants().into_iter().find(|n| n.matches(selector))
    }
}

impl Node for ElementRef<'_> {
    fn tag_name(&self) -> String {
        self.value().name().to_ascii_lowercase()
    }

    fn text(&self) -> String {
        collapse_whitespace(&ElementRef::text(self).collect::<Vec<_>>().join(" "))
    }

    fn child_nodes(&self) -> Vec<Child<Self>> {
        (**self)
            .children()
            .filter_map(|child| {
                if let Some(text) = child.value().as_text() {
                    Some(Child::Text(text.to_string()))
                } else {
                    ElementRef::wrap(child).map(Child::Element)
                }
            })
            .collect()
    }

    fn link_target(&self) -> Option<String> {
        self.value()
            .attr("href")
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(str::to_string)
    }

    fn matches(&self, selector: &Selector) -> bool {
        selector.matches(self)
    }
}
