use std::ptr;

use comrak::nodes::{AstNode, NodeValue};

use crate::application::render::types::OutlineEntry;
use crate::domain::slug::AnchorSlugger;

/// Heading seen by the anchor stage, kept for the table of contents and the
/// conversion stage.
pub(crate) struct HeadingInfo<'a> {
    pub(crate) node: &'a AstNode<'a>,
    /// Direct child of the document root.
    pub(crate) top_level: bool,
    pub(crate) entry: OutlineEntry,
}

/// Walk the document in order and derive a unique anchor for every heading.
pub(crate) fn assign_anchors<'a>(root: &'a AstNode<'a>) -> Vec<HeadingInfo<'a>> {
    let mut slugger = AnchorSlugger::new();
    root.descendants()
        .filter_map(|node| {
            let level = heading_level(node)?;
            let text = normalized_text(node);
            let anchor = slugger.anchor_for(&text);
            Some(HeadingInfo {
                node,
                top_level: node.parent().is_some_and(|parent| ptr::eq(parent, root)),
                entry: OutlineEntry {
                    level,
                    text,
                    anchor,
                },
            })
        })
        .collect()
}

pub(crate) fn heading_level(node: &AstNode<'_>) -> Option<u8> {
    let data = node.data.borrow();
    if let NodeValue::Heading(heading) = &data.value {
        Some(heading.level)
    } else {
        None
    }
}

/// Inline text of a node with runs of whitespace collapsed.
pub(crate) fn normalized_text<'a>(node: &'a AstNode<'a>) -> String {
    collect_inline_text(node)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn collect_inline_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for inline in node.descendants().skip(1) {
        match &inline.data.borrow().value {
            NodeValue::Text(value) => text.push_str(value),
            NodeValue::Code(code) => text.push_str(&code.literal),
            NodeValue::Math(math) => text.push_str(&math.literal),
            NodeValue::LineBreak | NodeValue::SoftBreak => text.push(' '),
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::service::{config::comrak_options, options::PipelineOptions};
    use comrak::{Arena, parse_document};

    #[test]
    fn assigns_unique_anchors_in_document_order() {
        let options = comrak_options(&PipelineOptions::default());
        let arena = Arena::new();
        let root = parse_document(
            &arena,
            "# Intro\n\n> ## Intro\n\n### `code` *and* text\n\n# ???\n",
            &options,
        );

        let headings = assign_anchors(root);
        let entries: Vec<_> = headings.iter().map(|h| h.entry.clone()).collect();

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].anchor.as_deref(), Some("intro"));
        assert_eq!(entries[1].anchor.as_deref(), Some("intro-1"));
        assert_eq!(entries[2].text, "code and text");
        assert_eq!(entries[2].anchor.as_deref(), Some("code-and-text"));
        assert_eq!(entries[3].anchor, None);

        assert!(headings[0].top_level);
        assert!(!headings[1].top_level);
    }

    #[test]
    fn deeply_nested_headings_are_found() {
        let options = comrak_options(&PipelineOptions::default());
        let arena = Arena::new();
        let markdown = format!("{} # Buried\n", ">".repeat(20_000));
        let root = parse_document(&arena, &markdown, &options);

        let headings = assign_anchors(root);
        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].entry.anchor.as_deref(), Some("buried"));
        assert!(!headings[0].top_level);
    }
}
