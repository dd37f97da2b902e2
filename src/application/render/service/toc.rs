use std::ptr;

use comrak::nodes::AstNode;

use super::anchors::{HeadingInfo, assign_anchors, heading_level};
use super::options::ValidatedOptions;

/// Replace the section under the table-of-contents marker heading with a
/// nested list of links to the headings that follow it.
///
/// Headings inside the replaced section leave the document; when there are
/// any, `headings` is recomputed so the outline and anchor counters only
/// reflect headings that are still rendered. `parse` turns the generated list
/// markdown into nodes allocated in the document's arena. Returns whether a
/// list was injected.
pub(crate) fn inject_table_of_contents<'a, F>(
    root: &'a AstNode<'a>,
    headings: &mut Vec<HeadingInfo<'a>>,
    options: &ValidatedOptions,
    parse: F,
) -> bool
where
    F: FnOnce(&str) -> &'a AstNode<'a>,
{
    let Some(marker) = headings
        .iter()
        .find(|heading| heading.top_level && options.toc_heading.is_match(&heading.entry.text))
        .map(|heading| heading.node)
    else {
        return false;
    };

    let mut replaced = Vec::new();
    let mut sibling = marker.next_sibling();
    while let Some(current) = sibling {
        if heading_level(current).is_some() {
            break;
        }
        replaced.push(current);
        sibling = current.next_sibling();
    }

    let max_depth = options.options.toc.max_depth;
    let listed_after = |headings: &[HeadingInfo<'a>]| -> Vec<(u8, String, String)> {
        headings
            .iter()
            .skip_while(|heading| !ptr::eq(heading.node, marker))
            .skip(1)
            .filter(|heading| heading.entry.level <= max_depth)
            .filter(|heading| !within(heading.node, &replaced))
            .filter_map(|heading| {
                let anchor = heading.entry.anchor.clone()?;
                Some((heading.entry.level, heading.entry.text.clone(), anchor))
            })
            .collect()
    };

    if listed_after(headings.as_slice()).is_empty() {
        return false;
    }

    let removes_headings = headings
        .iter()
        .any(|heading| within(heading.node, &replaced));
    for block in &replaced {
        block.detach();
    }
    if removes_headings {
        *headings = assign_anchors(root);
    }

    let listed = listed_after(headings.as_slice());
    let markdown = build_list_markdown(&listed);
    let document = parse(&markdown);
    let Some(list) = document.first_child() else {
        return false;
    };

    list.detach();
    marker.insert_after(list);
    true
}

/// Whether `node` is one of `blocks` or nested inside one of them.
fn within<'a>(node: &'a AstNode<'a>, blocks: &[&'a AstNode<'a>]) -> bool {
    node.ancestors()
        .any(|ancestor| blocks.iter().any(|block| ptr::eq(*block, ancestor)))
}

fn build_list_markdown(listed: &[(u8, String, String)]) -> String {
    let base = listed
        .iter()
        .map(|(level, _, _)| *level)
        .min()
        .unwrap_or(1);

    let mut markdown = String::new();
    let mut previous_indent: Option<usize> = None;
    for (level, text, anchor) in listed {
        let wanted = usize::from(*level - base);
        let indent = match previous_indent {
            Some(previous) => wanted.min(previous + 1),
            None => 0,
        };
        previous_indent = Some(indent);

        markdown.push_str(&"  ".repeat(indent));
        markdown.push_str("- [");
        markdown.push_str(&escape_markdown(text));
        markdown.push_str("](#");
        markdown.push_str(anchor);
        markdown.push_str(")\n");
    }
    markdown
}

fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii_punctuation() {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
