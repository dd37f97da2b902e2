use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::tree::{HtmlElement, HtmlNode};

static SHORTCODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([a-zA-Z0-9_+\-]+):").expect("shortcode pattern must be valid"));

/// Replace `:shortcode:` tokens in text with their emoji glyph. Unknown
/// shortcodes stay as typed; code, math and raw-text elements are skipped.
pub(crate) fn substitute(nodes: &mut [HtmlNode]) {
    for node in nodes.iter_mut() {
        match node {
            HtmlNode::Text(text) => {
                let replaced = match replace_shortcodes(text) {
                    Cow::Owned(replaced) => Some(replaced),
                    Cow::Borrowed(_) => None,
                };
                if let Some(replaced) = replaced {
                    *text = replaced;
                }
            }
            HtmlNode::Element(element) if !is_opaque(element) => {
                substitute(&mut element.children);
            }
            HtmlNode::Element(_) | HtmlNode::Raw(_) => {}
        }
    }
}

fn is_opaque(element: &HtmlElement) -> bool {
    matches!(
        element.tag.as_str(),
        "code" | "pre" | "kbd" | "samp" | "script" | "style" | "textarea"
    ) || element.has_class("math")
        || element.has_class("katex")
        || element.has_class("katex-error")
}

pub(crate) fn replace_shortcodes(text: &str) -> Cow<'_, str> {
    if !text.contains(':') {
        return Cow::Borrowed(text);
    }

    SHORTCODE.replace_all(text, |caps: &Captures<'_>| {
        match emojis::get_by_shortcode(&caps[1]) {
            Some(emoji) => emoji.as_str().to_string(),
            None => caps[0].to_string(),
        }
    })
}
