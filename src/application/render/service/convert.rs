use comrak::{
    format_html,
    nodes::{AstNode, NodeValue},
    options::Options,
};
use tracing::warn;

use crate::application::render::types::{OutlineEntry, StageError};

use super::links::{LinkAnnotation, apply_link_annotations};
use super::options::{ExternalLinkOptions, RawHtmlPolicy};
use super::tree::{
    HtmlElement, HtmlNode, RAW_MARKER_INDEX, RAW_MARKER_TAG, parse_fragment, walk_elements_mut,
};

pub(crate) struct Converted {
    pub(crate) nodes: Vec<HtmlNode>,
    pub(crate) external_links: u32,
}

/// Turn the markdown tree into the HTML-flavoured tree.
///
/// Embedded HTML is carried across as [`HtmlNode::Raw`] fragments (or dropped
/// under [`RawHtmlPolicy::Omit`]); heading anchors and link annotations
/// computed on the markdown tree are applied to the matching elements.
pub(crate) fn convert<'a>(
    root: &'a AstNode<'a>,
    comrak: &Options<'static>,
    policy: RawHtmlPolicy,
    outline: &[OutlineEntry],
    annotations: &[LinkAnnotation],
    links: &ExternalLinkOptions,
) -> Result<Converted, StageError> {
    let mut fragments = Vec::new();
    extract_raw_html(root, policy, &mut fragments);

    let mut html = String::new();
    format_html(root, comrak, &mut html).map_err(|err| StageError::Markdown {
        message: err.to_string(),
    })?;

    let mut nodes = parse_fragment(&html, Some(&fragments))?;
    apply_heading_ids(&mut nodes, outline);
    let external_links = apply_link_annotations(&mut nodes, annotations, links);

    Ok(Converted {
        nodes,
        external_links,
    })
}

/// Single `pre` block holding the source text, used when conversion fails.
pub(crate) fn literal_fallback(text: &str) -> Vec<HtmlNode> {
    vec![HtmlNode::Element(
        HtmlElement::new("pre").with_children(vec![HtmlNode::Text(text.to_string())]),
    )]
}

fn extract_raw_html<'a>(root: &'a AstNode<'a>, policy: RawHtmlPolicy, fragments: &mut Vec<String>) {
    for node in root.descendants() {
        let mut data = node.data.borrow_mut();
        let literal = match &mut data.value {
            NodeValue::HtmlBlock(block) => &mut block.literal,
            NodeValue::HtmlInline(literal) => literal,
            _ => continue,
        };

        let replacement = match policy {
            RawHtmlPolicy::Omit => String::new(),
            RawHtmlPolicy::Sanitize | RawHtmlPolicy::Passthrough => format!(
                "<{RAW_MARKER_TAG} {RAW_MARKER_INDEX}=\"{}\"></{RAW_MARKER_TAG}>",
                fragments.len()
            ),
        };
        let embedded = std::mem::replace(literal, replacement);
        if policy != RawHtmlPolicy::Omit {
            fragments.push(embedded);
        }
    }
}

fn apply_heading_ids(nodes: &mut [HtmlNode], outline: &[OutlineEntry]) {
    let mut pending = outline.iter();
    walk_elements_mut(nodes, &mut |element| {
        let Some(level) = element.is_heading() else {
            return;
        };
        match pending.next() {
            Some(entry) if entry.level == level => {
                if let Some(anchor) = entry.anchor.as_deref() {
                    element.set_attr("id", anchor);
                }
            }
            Some(entry) => {
                warn!(
                    target = "application::render::convert",
                    expected = entry.level,
                    found = level,
                    "heading level mismatch while assigning anchors"
                );
            }
            None => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::service::{
        anchors::assign_anchors, config::comrak_options, options::PipelineOptions, tree::contains_raw,
    };
    use comrak::{Arena, parse_document};

    fn convert_markdown(markdown: &str, policy: RawHtmlPolicy) -> Vec<HtmlNode> {
        let options = PipelineOptions::default();
        let comrak = comrak_options(&options);
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &comrak);
        let outline: Vec<_> = assign_anchors(root)
            .into_iter()
            .map(|heading| heading.entry)
            .collect();

        convert(root, &comrak, policy, &outline, &[], &options.links)
            .expect("convert")
            .nodes
    }

    fn first_element(nodes: &[HtmlNode]) -> &HtmlElement {
        nodes
            .iter()
            .find_map(|node| match node {
                HtmlNode::Element(element) => Some(element),
                _ => None,
            })
            .expect("element")
    }

    #[test]
    fn headings_receive_ids() {
        let nodes = convert_markdown("# Hello World\n\n## Hello World\n", RawHtmlPolicy::default());
        let ids: Vec<_> = nodes
            .iter()
            .filter_map(|node| match node {
                HtmlNode::Element(element) => element.attr("id").map(str::to_string),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["hello-world", "hello-world-1"]);
    }

    #[test]
    fn embedded_html_becomes_raw_fragments() {
        let nodes = convert_markdown("<div class=\"note\">\nhi\n</div>\n", RawHtmlPolicy::Passthrough);
        assert!(matches!(&nodes[0], HtmlNode::Raw(raw) if raw.contains("class=\"note\"")));
    }

    #[test]
    fn omitted_html_leaves_no_trace() {
        let nodes = convert_markdown("a <b>bold</b> word\n", RawHtmlPolicy::Omit);
        let paragraph = first_element(&nodes);
        assert_eq!(paragraph.text_content(), "a bold word");
        assert!(!contains_raw(&nodes));
    }

    #[test]
    fn fallback_keeps_source_text() {
        let nodes = literal_fallback("# raw *text*");
        assert_eq!(first_element(&nodes).tag, "pre");
        assert_eq!(first_element(&nodes).text_content(), "# raw *text*");
    }
}
