//! HTML-flavoured document tree shared by the post-conversion stages.
//!
//! Markup is turned into a tree with `lol_html`: start tags push elements,
//! end-tag handlers close them and document text chunks become text nodes.
//! Elements left open by malformed markup are closed at the end of input.
//! Elements nested deeper than [`MAX_NESTING_DEPTH`] are flattened: their
//! content joins the deepest open element, so walks over the tree recurse at
//! most that deep.

use std::{borrow::Cow, cell::RefCell, rc::Rc};

use lol_html::{EndTagHandler, RewriteStrSettings, doc_text, element, html_content::EndTag, rewrite_str};

use crate::application::render::types::StageError;

/// Tag used to carry raw HTML fragments through the conversion stage.
pub(crate) const RAW_MARKER_TAG: &str = "raw-html";
pub(crate) const RAW_MARKER_INDEX: &str = "data-index";

/// Deepest element nesting kept by [`parse_fragment`].
pub(crate) const MAX_NESTING_DEPTH: usize = 128;

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HtmlNode {
    Element(HtmlElement),
    Text(String),
    /// Embedded HTML not yet materialized into nodes.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HtmlElement {
    pub(crate) tag: String,
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) children: Vec<HtmlNode>,
}

impl HtmlElement {
    pub(crate) fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub(crate) fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub(crate) fn with_children(mut self, children: Vec<HtmlNode>) -> Self {
        self.children = children;
        self
    }

    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub(crate) fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attrs
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub(crate) fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    pub(crate) fn has_class(&self, class: &str) -> bool {
        self.classes().any(|candidate| candidate == class)
    }

    pub(crate) fn is_heading(&self) -> Option<u8> {
        let level = self.tag.strip_prefix('h')?.parse::<u8>().ok()?;
        (1..=6).contains(&level).then_some(level)
    }

    /// The single element child when every other child is blank text.
    pub(crate) fn only_element_child(&self) -> Option<&HtmlElement> {
        let mut found = None;
        for child in &self.children {
            match child {
                HtmlNode::Element(element) if found.is_none() => found = Some(element),
                HtmlNode::Text(text) if text.trim().is_empty() => {}
                _ => return None,
            }
        }
        found
    }

    pub(crate) fn text_content(&self) -> String {
        let mut buffer = String::new();
        collect_text(&self.children, &mut buffer);
        buffer
    }
}

fn collect_text(nodes: &[HtmlNode], buffer: &mut String) {
    for node in nodes {
        match node {
            HtmlNode::Text(text) => buffer.push_str(text),
            HtmlNode::Element(element) => collect_text(&element.children, buffer),
            HtmlNode::Raw(_) => {}
        }
    }
}

pub(crate) fn contains_raw(nodes: &[HtmlNode]) -> bool {
    nodes.iter().any(|node| match node {
        HtmlNode::Raw(_) => true,
        HtmlNode::Element(element) => contains_raw(&element.children),
        HtmlNode::Text(_) => false,
    })
}

/// Visit every element depth-first in document order.
pub(crate) fn walk_elements_mut(nodes: &mut [HtmlNode], visit: &mut dyn FnMut(&mut HtmlElement)) {
    for node in nodes {
        if let HtmlNode::Element(element) = node {
            visit(element);
            walk_elements_mut(&mut element.children, visit);
        }
    }
}

pub(crate) fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(tag))
}

/// Serialize nodes to markup. Raw fragments are written verbatim.
pub(crate) fn serialize(nodes: &[HtmlNode]) -> String {
    let mut html = String::new();
    write_nodes(nodes, &mut html);
    html
}

fn write_nodes(nodes: &[HtmlNode], html: &mut String) {
    for node in nodes {
        match node {
            HtmlNode::Text(text) => html.push_str(&escape_text(text)),
            HtmlNode::Raw(raw) => html.push_str(raw),
            HtmlNode::Element(element) => {
                write_start_tag(&element.tag, element.attrs.iter(), html);
                if is_void_element(&element.tag) {
                    continue;
                }
                write_nodes(&element.children, html);
                html.push_str("</");
                html.push_str(&element.tag);
                html.push('>');
            }
        }
    }
}

pub(crate) fn write_start_tag<'a>(
    tag: &str,
    attrs: impl Iterator<Item = &'a (String, String)>,
    html: &mut String,
) {
    html.push('<');
    html.push_str(tag);
    for (name, value) in attrs {
        html.push(' ');
        html.push_str(name);
        html.push_str("=\"");
        html.push_str(&escape_attribute(value));
        html.push('"');
    }
    html.push('>');
}

pub(crate) fn escape_text(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    Cow::Owned(escaped)
}

pub(crate) fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Decode character references in text content, using the full HTML named
/// reference table.
pub(crate) fn decode_entities(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    htmlize::unescape(value)
}

/// Decode character references in an attribute value. Legacy references
/// without a semicolon followed by `=` or an alphanumeric stay literal, so
/// query strings such as `?a=1&copy=2` survive.
pub(crate) fn decode_attribute(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    htmlize::unescape_attribute(value)
}

enum Slot {
    Element(HtmlElement),
    /// Text as written in the markup. Chunks are joined before decoding
    /// because a chunk boundary may split a character reference.
    Text { value: String, escaped: bool },
    Raw(String),
}

struct SlotEntry {
    slot: Slot,
    children: Vec<usize>,
}

#[derive(Default)]
struct TreeBuilder {
    entries: Vec<SlotEntry>,
    roots: Vec<usize>,
    open: Vec<usize>,
}

impl TreeBuilder {
    fn attach(&mut self, slot: Slot) -> usize {
        let id = self.entries.len();
        self.entries.push(SlotEntry {
            slot,
            children: Vec::new(),
        });
        match self.open.last() {
            Some(&parent) => self.entries[parent].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let escaped = !self.in_raw_text_element();

        let last_sibling = match self.open.last() {
            Some(&parent) => self.entries[parent].children.last().copied(),
            None => self.roots.last().copied(),
        };
        if let Some(last) = last_sibling
            && let Slot::Text {
                value,
                escaped: previous,
            } = &mut self.entries[last].slot
            && *previous == escaped
        {
            value.push_str(text);
            return;
        }
        self.attach(Slot::Text {
            value: text.to_string(),
            escaped,
        });
    }

    fn in_raw_text_element(&self) -> bool {
        self.open.last().is_some_and(|&id| {
            matches!(&self.entries[id].slot, Slot::Element(el) if el.tag == "script" || el.tag == "style")
        })
    }

    fn close(&mut self, id: usize) {
        if let Some(position) = self.open.iter().rposition(|&open| open == id) {
            self.open.truncate(position);
        }
    }

    fn finish(mut self) -> Vec<HtmlNode> {
        let roots = std::mem::take(&mut self.roots);
        roots.into_iter().map(|id| self.take_node(id)).collect()
    }

    fn take_node(&mut self, id: usize) -> HtmlNode {
        let children = std::mem::take(&mut self.entries[id].children);
        let slot = std::mem::replace(&mut self.entries[id].slot, Slot::Raw(String::new()));
        match slot {
            Slot::Text {
                value,
                escaped: true,
            } => HtmlNode::Text(decode_entities(&value).into_owned()),
            Slot::Text { value, .. } => HtmlNode::Text(value),
            Slot::Raw(raw) => HtmlNode::Raw(raw),
            Slot::Element(mut element) => {
                element.children = children
                    .into_iter()
                    .map(|child| self.take_node(child))
                    .collect();
                HtmlNode::Element(element)
            }
        }
    }
}

/// Parse markup into nodes.
///
/// When `raw_fragments` is provided, `<raw-html data-index="N">` markers are
/// replaced by [`HtmlNode::Raw`] holding the N-th fragment.
pub(crate) fn parse_fragment(
    html: &str,
    raw_fragments: Option<&[String]>,
) -> Result<Vec<HtmlNode>, StageError> {
    let builder = Rc::new(RefCell::new(TreeBuilder::default()));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", {
                let builder = Rc::clone(&builder);
                move |el| {
                    let tag = el.tag_name();

                    if let Some(fragments) = raw_fragments
                        && tag == RAW_MARKER_TAG
                    {
                        let fragment = el
                            .get_attribute(RAW_MARKER_INDEX)
                            .and_then(|index| index.parse::<usize>().ok())
                            .and_then(|index| fragments.get(index));
                        if let Some(fragment) = fragment {
                            builder.borrow_mut().attach(Slot::Raw(fragment.clone()));
                        }
                        return Ok(());
                    }

                    if el.can_have_content() && builder.borrow().open.len() >= MAX_NESTING_DEPTH {
                        return Ok(());
                    }

                    let attrs = el
                        .attributes()
                        .iter()
                        .map(|attr| (attr.name(), decode_attribute(&attr.value()).into_owned()))
                        .collect();
                    let id = builder.borrow_mut().attach(Slot::Element(HtmlElement {
                        tag,
                        attrs,
                        children: Vec::new(),
                    }));

                    if let Some(handlers) = el.end_tag_handlers() {
                        builder.borrow_mut().open.push(id);
                        let builder = Rc::clone(&builder);
                        handlers.push(Box::new(move |_end: &mut EndTag<'_>| {
                            builder.borrow_mut().close(id);
                            Ok(())
                        }) as EndTagHandler<'static>);
                    }
                    Ok(())
                }
            })],
            document_content_handlers: vec![doc_text!({
                let builder = Rc::clone(&builder);
                move |chunk| {
                    builder.borrow_mut().push_text(chunk.as_str());
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| StageError::Html {
        message: err.to_string(),
    })?;

    let builder = Rc::try_unwrap(builder)
        .map_err(|_| StageError::Html {
            message: "tree builder still shared after parsing".to_string(),
        })?
        .into_inner();

    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(node: &HtmlNode) -> &HtmlElement {
        match node {
            HtmlNode::Element(element) => element,
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn parse_fragment_builds_nested_tree() {
        let nodes = parse_fragment("<p>Hello <em>there</em>!</p>", None).expect("parse");
        assert_eq!(nodes.len(), 1);

        let paragraph = element(&nodes[0]);
        assert_eq!(paragraph.tag, "p");
        assert_eq!(paragraph.children.len(), 3);
        assert_eq!(element(&paragraph.children[1]).tag, "em");
        assert_eq!(paragraph.text_content(), "Hello there!");
    }

    #[test]
    fn parse_fragment_keeps_top_level_text_and_void_elements() {
        let nodes = parse_fragment("a<br>b<hr>", None).expect("parse");
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0], HtmlNode::Text("a".to_string()));
        assert_eq!(element(&nodes[1]).tag, "br");
        assert_eq!(nodes[2], HtmlNode::Text("b".to_string()));
        assert!(element(&nodes[3]).children.is_empty());
    }

    #[test]
    fn parse_fragment_decodes_entities_in_text_and_attributes() {
        let nodes =
            parse_fragment("<a href=\"/q?a=1&amp;b=2\">1 &lt; 2 &amp; &#x1F600;</a>", None)
                .expect("parse");
        let link = element(&nodes[0]);
        assert_eq!(link.attr("href"), Some("/q?a=1&b=2"));
        assert_eq!(link.text_content(), "1 < 2 & 😀");
    }

    #[test]
    fn parse_fragment_closes_unterminated_elements() {
        let nodes = parse_fragment("<div><span>open", None).expect("parse");
        let div = element(&nodes[0]);
        assert_eq!(element(&div.children[0]).tag, "span");
        assert_eq!(div.text_content(), "open");
    }

    #[test]
    fn parse_fragment_swaps_raw_markers() {
        let fragments = vec!["<b>".to_string()];
        let nodes = parse_fragment("<p><raw-html data-index=\"0\"></raw-html>x</p>", Some(&fragments))
            .expect("parse");
        let paragraph = element(&nodes[0]);
        assert_eq!(paragraph.children[0], HtmlNode::Raw("<b>".to_string()));
        assert!(contains_raw(&nodes));
    }

    #[test]
    fn serialize_escapes_and_round_trips() {
        let nodes = vec![HtmlNode::Element(
            HtmlElement::new("p")
                .with_attr("title", "\"quoted\"")
                .with_children(vec![HtmlNode::Text("a < b".to_string())]),
        )];
        let html = serialize(&nodes);
        assert_eq!(html, "<p title=\"&quot;quoted&quot;\">a &lt; b</p>");
        assert_eq!(parse_fragment(&html, None).expect("parse"), nodes);
    }

    #[test]
    fn decode_entities_leaves_unknown_references() {
        assert_eq!(decode_entities("&bogus; plain"), "&bogus; plain");
        assert_eq!(decode_entities("&quot;hi&quot;"), "\"hi\"");
    }

    #[test]
    fn decode_entities_knows_every_named_reference() {
        let nodes = parse_fragment("<p>&hearts; &euro; &check; &NotSquareSubsetEqual;</p>", None)
            .expect("parse");
        assert_eq!(element(&nodes[0]).text_content(), "♥ € ✓ ⋢");
    }

    #[test]
    fn attribute_query_strings_keep_legacy_lookalikes() {
        let nodes = parse_fragment("<a href=\"/s?x=1&copy=2\">x</a>", None).expect("parse");
        assert_eq!(element(&nodes[0]).attr("href"), Some("/s?x=1&copy=2"));
    }

    #[test]
    fn nesting_beyond_the_limit_is_flattened() {
        let depth = MAX_NESTING_DEPTH * 4;
        let html = format!("{}deep{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let nodes = parse_fragment(&html, None).expect("parse");

        let mut levels = 0;
        let mut current = &nodes;
        while let Some(HtmlNode::Element(child)) = current.first() {
            levels += 1;
            current = &child.children;
        }
        assert_eq!(levels, MAX_NESTING_DEPTH);
        assert_eq!(current, &vec![HtmlNode::Text("deep".to_string())]);
    }

    #[test]
    fn void_elements_survive_at_the_nesting_limit() {
        let html = format!("{}a<br>b", "<span>".repeat(MAX_NESTING_DEPTH + 2));
        let nodes = parse_fragment(&html, None).expect("parse");

        let mut current = &nodes;
        while let Some(HtmlNode::Element(child)) = current.first()
            && child.tag == "span"
        {
            current = &child.children;
        }
        assert_eq!(current.len(), 3);
        assert_eq!(element(&current[1]).tag, "br");
    }
}
