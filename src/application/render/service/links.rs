use std::collections::BTreeSet;

use comrak::nodes::{AstNode, NodeValue};
use url::Url;

use super::options::ExternalLinkOptions;
use super::tree::{HtmlElement, HtmlNode, walk_elements_mut};

/// Classification of one markdown link, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkAnnotation {
    pub(crate) url: String,
    pub(crate) external: bool,
}

/// Classify every markdown link of the document.
pub(crate) fn annotate_links<'a>(
    root: &'a AstNode<'a>,
    options: &ExternalLinkOptions,
) -> Vec<LinkAnnotation> {
    root.descendants()
        .filter_map(|node| match &node.data.borrow().value {
            NodeValue::Link(link) => Some(LinkAnnotation {
                external: is_external(&link.url, options),
                url: link.url.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Whether `href` leaves the document origin through an accepted protocol.
pub(crate) fn is_external(href: &str, options: &ExternalLinkOptions) -> bool {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return false;
    }

    let resolved = match options.origin.as_ref() {
        Some(origin) => origin.join(href),
        None => Url::parse(href),
    };
    let Ok(resolved) = resolved else {
        return false;
    };

    let accepted = options
        .protocols
        .iter()
        .any(|protocol| protocol.trim().eq_ignore_ascii_case(resolved.scheme()));
    if !accepted {
        return false;
    }

    match options.origin.as_ref() {
        Some(origin) => resolved.origin() != origin.origin(),
        None => true,
    }
}

/// Apply link annotations to the converted tree and return the number of
/// external links. Annotations are matched to `<a>` elements in order;
/// footnote anchors produced by the converter carry no annotation.
pub(crate) fn apply_link_annotations(
    nodes: &mut [HtmlNode],
    annotations: &[LinkAnnotation],
    options: &ExternalLinkOptions,
) -> u32 {
    let mut pending = annotations.iter();
    let mut external_links = 0u32;

    walk_elements_mut(nodes, &mut |element| {
        if element.tag != "a" || is_footnote_anchor(element) {
            return;
        }
        let Some(href) = element.attr("href").map(str::to_string) else {
            return;
        };

        let external = match pending.next() {
            Some(annotation) if annotation.url == href => annotation.external,
            // the converter normalises some destinations; classify what was emitted
            _ => is_external(&href, options),
        };

        if external {
            mark_external(element, options);
            external_links = external_links.saturating_add(1);
        }
    });

    external_links
}

fn is_footnote_anchor(element: &HtmlElement) -> bool {
    element.has_attr("data-footnote-ref")
        || element.has_attr("data-footnote-backref")
        || element.has_class("footnote-backref")
}

fn mark_external(element: &mut HtmlElement, options: &ExternalLinkOptions) {
    if let Some(target) = options.target.as_deref() {
        element.set_attr("target", target);
    }
    if !options.rel.is_empty() {
        let rel = merge_rel(element.attr("rel"), &options.rel);
        element.set_attr("rel", rel);
    }
}

fn merge_rel(existing: Option<&str>, required: &[String]) -> String {
    let mut tokens: BTreeSet<String> = existing
        .unwrap_or_default()
        .split_whitespace()
        .map(|token| token.to_ascii_lowercase())
        .collect();
    for token in required {
        tokens.insert(token.to_ascii_lowercase());
    }
    tokens.into_iter().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::service::tree::parse_fragment;

    fn options_with_origin(origin: Option<&str>) -> ExternalLinkOptions {
        ExternalLinkOptions {
            origin: origin.map(|value| Url::parse(value).expect("origin")),
            ..ExternalLinkOptions::default()
        }
    }

    #[test]
    fn classifies_links_against_origin() {
        let options = options_with_origin(Some("https://notes.example.org/n/42"));

        assert!(is_external("https://example.com", &options));
        assert!(is_external("http://notes.example.org/", &options));
        assert!(!is_external("https://notes.example.org/other", &options));
        assert!(!is_external("#section", &options));
        assert!(!is_external("/relative/path", &options));
        assert!(!is_external("mailto:someone@example.com", &options));
    }

    #[test]
    fn without_origin_every_absolute_http_link_is_external() {
        let options = options_with_origin(None);

        assert!(is_external("https://example.com/a", &options));
        assert!(!is_external("relative.md", &options));
        assert!(!is_external("ftp://example.com/file", &options));
    }

    #[test]
    fn merge_rel_deduplicates_tokens() {
        let required = vec!["noopener".to_string(), "nofollow".to_string()];
        assert_eq!(
            merge_rel(Some("external NoOpener"), &required),
            "external nofollow noopener"
        );
    }

    #[test]
    fn applies_target_and_rel_to_external_anchors_only() {
        let options = options_with_origin(None);
        let mut nodes = parse_fragment(
            "<p><a href=\"https://example.com\">x</a><a href=\"#fn-1\" data-footnote-ref>1</a><a href=\"#top\">y</a></p>",
            None,
        )
        .expect("parse");
        let annotations = vec![
            LinkAnnotation {
                url: "https://example.com".to_string(),
                external: true,
            },
            LinkAnnotation {
                url: "#top".to_string(),
                external: false,
            },
        ];

        let count = apply_link_annotations(&mut nodes, &annotations, &options);
        assert_eq!(count, 1);

        let HtmlNode::Element(paragraph) = &nodes[0] else {
            panic!("expected paragraph");
        };
        let anchors: Vec<&HtmlElement> = paragraph
            .children
            .iter()
            .filter_map(|child| match child {
                HtmlNode::Element(anchor) => Some(anchor),
                _ => None,
            })
            .collect();
        assert_eq!(anchors[0].attr("target"), Some("_blank"));
        assert_eq!(anchors[0].attr("rel"), Some("nofollow noopener noreferrer"));
        assert_eq!(anchors[1].attr("target"), None);
        assert_eq!(anchors[2].attr("rel"), None);
    }
}
