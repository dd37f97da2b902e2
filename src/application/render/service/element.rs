//! Conversion of the HTML-flavoured tree into host UI element descriptors.
//!
//! Attribute names follow the host convention (`className`, `htmlFor`,
//! `tabIndex`, …), inline styles become a camel-cased property map and boolean
//! attributes become flags. Keys are assigned in document order, so equal
//! input always yields equal keys.

use std::collections::BTreeMap;

use crate::application::render::types::{PropValue, UiElement, UiNode};

use super::tree::{HtmlElement, HtmlNode, escape_attribute, escape_text, is_void_element};

const PROP_NAMES: [(&str, &str); 14] = [
    ("class", "className"),
    ("for", "htmlFor"),
    ("tabindex", "tabIndex"),
    ("colspan", "colSpan"),
    ("rowspan", "rowSpan"),
    ("readonly", "readOnly"),
    ("maxlength", "maxLength"),
    ("accesskey", "accessKey"),
    ("contenteditable", "contentEditable"),
    ("crossorigin", "crossOrigin"),
    ("srcset", "srcSet"),
    ("datetime", "dateTime"),
    ("accept-charset", "acceptCharset"),
    ("http-equiv", "httpEquiv"),
];

const BOOLEAN_ATTRIBUTES: [&str; 19] = [
    "allowfullscreen",
    "async",
    "autofocus",
    "autoplay",
    "checked",
    "controls",
    "default",
    "defer",
    "disabled",
    "hidden",
    "loop",
    "multiple",
    "muted",
    "novalidate",
    "open",
    "readonly",
    "required",
    "reversed",
    "selected",
];

/// Elements whose whitespace-only text children are not rendered.
const TABLE_STRUCTURE: [&str; 6] = ["table", "thead", "tbody", "tfoot", "tr", "colgroup"];

pub(crate) fn to_ui_nodes(nodes: Vec<HtmlNode>) -> Vec<UiNode> {
    let mut next_key = 0usize;
    convert_nodes(nodes, false, &mut next_key)
}

fn convert_nodes(nodes: Vec<HtmlNode>, drop_blank_text: bool, next_key: &mut usize) -> Vec<UiNode> {
    let mut converted = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            HtmlNode::Text(text) | HtmlNode::Raw(text) => {
                if drop_blank_text && text.trim().is_empty() {
                    continue;
                }
                converted.push(UiNode::Text { value: text });
            }
            HtmlNode::Element(element) => {
                converted.push(UiNode::Element(convert_element(element, next_key)));
            }
        }
    }
    converted
}

fn convert_element(element: HtmlElement, next_key: &mut usize) -> UiElement {
    let key = format!("h-{next_key}");
    *next_key += 1;

    let HtmlElement {
        tag,
        attrs,
        children,
    } = element;

    let mut props = BTreeMap::new();
    for (name, value) in attrs {
        let name = name.to_ascii_lowercase();
        let prop = if name == "style" {
            PropValue::Style(parse_style(&value))
        } else if BOOLEAN_ATTRIBUTES.contains(&name.as_str()) {
            PropValue::Flag(true)
        } else {
            PropValue::Text(value)
        };
        props.insert(prop_name(&name), prop);
    }

    let drop_blank_text = TABLE_STRUCTURE.contains(&tag.as_str());
    let children = convert_nodes(children, drop_blank_text, next_key);

    UiElement {
        tag,
        key,
        props,
        children,
    }
}

fn prop_name(attribute: &str) -> String {
    PROP_NAMES
        .iter()
        .find(|(html, _)| *html == attribute)
        .map(|(_, prop)| (*prop).to_string())
        .unwrap_or_else(|| attribute.to_string())
}

fn attribute_name(prop: &str) -> String {
    PROP_NAMES
        .iter()
        .find(|(_, candidate)| *candidate == prop)
        .map(|(html, _)| (*html).to_string())
        .unwrap_or_else(|| prop.to_string())
}

/// Parse an inline style declaration list into camel-cased properties.
pub(crate) fn parse_style(style: &str) -> BTreeMap<String, String> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            let (name, value) = (name.trim(), value.trim());
            (!name.is_empty() && !value.is_empty())
                .then(|| (style_property_name(name), value.to_string()))
        })
        .collect()
}

fn style_property_name(name: &str) -> String {
    if name.starts_with("--") {
        return name.to_string();
    }
    let name = name.to_ascii_lowercase();
    let (prefix, rest) = match name.strip_prefix("-ms-") {
        Some(rest) => ("ms-", rest),
        None => ("", name.as_str()),
    };

    let mut camel = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in prefix.chars().chain(rest.chars()) {
        if ch == '-' {
            upper_next = true;
        } else if upper_next {
            camel.push(ch.to_ascii_uppercase());
            upper_next = false;
        } else {
            camel.push(ch);
        }
    }
    camel
}

fn css_property_name(name: &str) -> String {
    if name.starts_with("--") {
        return name.to_string();
    }
    let (prefix, rest) = match name.strip_prefix("ms") {
        Some(rest) if rest.starts_with(|ch: char| ch.is_ascii_uppercase()) => ("-ms", rest),
        _ => ("", name),
    };

    let mut css = String::from(prefix);
    for ch in rest.chars() {
        if ch.is_ascii_uppercase() {
            css.push('-');
            css.push(ch.to_ascii_lowercase());
        } else {
            css.push(ch);
        }
    }
    css
}

/// Serialize UI nodes back to HTML markup.
pub(crate) fn ui_nodes_to_html(nodes: &[UiNode]) -> String {
    let mut html = String::new();
    write_ui_nodes(nodes, &mut html);
    html
}

fn write_ui_nodes(nodes: &[UiNode], html: &mut String) {
    for node in nodes {
        match node {
            UiNode::Text { value } => html.push_str(&escape_text(value)),
            UiNode::Element(element) => {
                html.push('<');
                html.push_str(&element.tag);
                for (name, value) in &element.props {
                    let rendered = match value {
                        PropValue::Text(text) => text.clone(),
                        PropValue::Flag(true) => String::new(),
                        PropValue::Flag(false) => continue,
                        PropValue::Style(properties) => properties
                            .iter()
                            .map(|(property, value)| {
                                format!("{}: {value}", css_property_name(property))
                            })
                            .collect::<Vec<_>>()
                            .join("; "),
                    };
                    html.push(' ');
                    html.push_str(&attribute_name(name));
                    html.push_str("=\"");
                    html.push_str(&escape_attribute(&rendered));
                    html.push('"');
                }
                html.push('>');

                if is_void_element(&element.tag) {
                    continue;
                }
                write_ui_nodes(&element.children, html);
                html.push_str("</");
                html.push_str(&element.tag);
                html.push('>');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::service::tree::parse_fragment;

    fn convert(html: &str) -> Vec<UiNode> {
        to_ui_nodes(parse_fragment(html, None).expect("parse"))
    }

    #[test]
    fn renames_attributes_to_props() {
        let nodes = convert(
            "<label for=\"x\" class=\"a b\" tabindex=\"0\" data-kind=\"k\" aria-label=\"L\">x</label>",
        );
        let label = nodes[0].as_element().expect("label");

        assert_eq!(label.prop_str("htmlFor"), Some("x"));
        assert_eq!(label.prop_str("className"), Some("a b"));
        assert_eq!(label.prop_str("tabIndex"), Some("0"));
        assert_eq!(label.prop_str("data-kind"), Some("k"));
        assert_eq!(label.prop_str("aria-label"), Some("L"));
        assert!(label.has_class("b"));
    }

    #[test]
    fn parses_inline_styles_and_flags() {
        let nodes = convert(
            "<td style=\"text-align: center; -webkit-line-clamp: 2; -ms-flex: 1; --gap: 4px\"><input type=\"checkbox\" checked disabled></td>",
        );
        let cell = nodes[0].as_element().expect("td");

        let Some(PropValue::Style(style)) = cell.prop("style") else {
            panic!("expected style map");
        };
        assert_eq!(style.get("textAlign").map(String::as_str), Some("center"));
        assert_eq!(style.get("WebkitLineClamp").map(String::as_str), Some("2"));
        assert_eq!(style.get("msFlex").map(String::as_str), Some("1"));
        assert_eq!(style.get("--gap").map(String::as_str), Some("4px"));

        let input = cell.children[0].as_element().expect("input");
        assert_eq!(input.prop("checked"), Some(&PropValue::Flag(true)));
        assert_eq!(input.prop("disabled"), Some(&PropValue::Flag(true)));
    }

    #[test]
    fn keys_are_positional_and_deterministic() {
        let html = "<ul><li>a</li><li>b</li></ul><p>c</p>";
        let first = convert(html);
        let second = convert(html);
        assert_eq!(first, second);

        let list = first[0].as_element().expect("ul");
        assert_eq!(list.key, "h-0");
        assert_eq!(list.children[0].as_element().expect("li").key, "h-1");
        assert_eq!(first[1].as_element().expect("p").key, "h-3");
    }

    #[test]
    fn drops_blank_text_inside_tables() {
        let nodes = convert("<table>\n<tbody>\n<tr>\n<td> </td>\n</tr>\n</tbody>\n</table>");
        let table = nodes[0].as_element().expect("table");
        assert_eq!(table.children.len(), 1);
        let row = table.children[0].as_element().expect("tbody").children[0]
            .as_element()
            .expect("tr");
        assert_eq!(row.children.len(), 1);
        let cell = row.children[0].as_element().expect("td");
        assert_eq!(cell.children, vec![UiNode::text(" ")]);
    }

    #[test]
    fn serializes_back_to_markup() {
        let nodes = convert(
            "<p class=\"x\" style=\"text-align: left\">a &amp; b<br><input checked></p>",
        );
        assert_eq!(
            ui_nodes_to_html(&nodes),
            "<p class=\"x\" style=\"text-align: left\">a &amp; b<br><input checked=\"\"></p>"
        );
    }
}
