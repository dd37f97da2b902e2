use ammonia::Builder as AmmoniaBuilder;

use crate::application::render::types::StageError;

use super::options::RawHtmlPolicy;
use super::tree::{HtmlNode, contains_raw, parse_fragment, serialize};

/// Re-parse embedded HTML so later stages can traverse it.
///
/// The document is serialized with the raw fragments spliced in verbatim and
/// parsed again as a whole, which lets a block opened by one fragment
/// (`<details>`) be closed by another.
pub(crate) fn materialize(
    nodes: &mut Vec<HtmlNode>,
    policy: RawHtmlPolicy,
    sanitizer: &AmmoniaBuilder<'static>,
) -> Result<(), StageError> {
    if !contains_raw(nodes) {
        return Ok(());
    }

    let mut html = serialize(nodes);
    if policy == RawHtmlPolicy::Sanitize {
        html = sanitizer.clean(&html).to_string();
    }

    *nodes = parse_fragment(&html, None)?;
    Ok(())
}

/// Turn raw fragments that could not be materialized into visible text.
pub(crate) fn demote_raw(nodes: &mut [HtmlNode]) {
    for node in nodes.iter_mut() {
        match node {
            HtmlNode::Raw(raw) => *node = HtmlNode::Text(std::mem::take(raw)),
            HtmlNode::Element(element) => demote_raw(&mut element.children),
            HtmlNode::Text(_) => {}
        }
    }
}
