use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The fixed stages of the rendering pipeline, in execution order.
///
/// Reordering changes observable output: the table of contents reads the
/// anchors assigned before it, and math typesetting relies on the node types
/// produced by the HTML conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Parse,
    Anchors,
    TableOfContents,
    ExternalLinks,
    Footnotes,
    Convert,
    RawHtml,
    Math,
    Highlight,
    Emoji,
    Elements,
}

impl StageName {
    pub const ALL: [StageName; 11] = [
        StageName::Parse,
        StageName::Anchors,
        StageName::TableOfContents,
        StageName::ExternalLinks,
        StageName::Footnotes,
        StageName::Convert,
        StageName::RawHtml,
        StageName::Math,
        StageName::Highlight,
        StageName::Emoji,
        StageName::Elements,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Parse => "parse",
            StageName::Anchors => "anchors",
            StageName::TableOfContents => "table_of_contents",
            StageName::ExternalLinks => "external_links",
            StageName::Footnotes => "footnotes",
            StageName::Convert => "convert",
            StageName::RawHtml => "raw_html",
            StageName::Math => "math",
            StageName::Highlight => "highlight",
            StageName::Emoji => "emoji",
            StageName::Elements => "elements",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the render tree handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiNode {
    Element(UiElement),
    Text { value: String },
}

impl UiNode {
    pub fn text(value: impl Into<String>) -> Self {
        UiNode::Text {
            value: value.into(),
        }
    }

    pub fn as_element(&self) -> Option<&UiElement> {
        match self {
            UiNode::Element(element) => Some(element),
            UiNode::Text { .. } => None,
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut buffer = String::new();
        collect_text(self, &mut buffer);
        buffer
    }
}

fn collect_text(node: &UiNode, buffer: &mut String) {
    match node {
        UiNode::Text { value } => buffer.push_str(value),
        UiNode::Element(element) => {
            for child in &element.children {
                collect_text(child, buffer);
            }
        }
    }
}

/// Element descriptor: a tag, host-style props and ordered children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiElement {
    pub tag: String,
    /// Positional key, stable for identical input.
    pub key: String,
    pub props: BTreeMap<String, PropValue>,
    pub children: Vec<UiNode>,
}

impl UiElement {
    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name)
    }

    pub fn prop_str(&self, name: &str) -> Option<&str> {
        match self.props.get(name) {
            Some(PropValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.prop_str("className")
            .unwrap_or_default()
            .split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_names().any(|candidate| candidate == class)
    }
}

/// Value of a single element prop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropValue {
    Text(String),
    Flag(bool),
    Style(BTreeMap<String, String>),
}

/// Heading collected while rendering, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineEntry {
    pub level: u8,
    pub text: String,
    /// Anchor assigned to the heading; `None` when the text has no usable characters.
    pub anchor: Option<String>,
}

/// Footnote definition that is referenced from the document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FootnoteEntry {
    /// 1-indexed display number.
    pub number: u32,
    pub name: String,
    pub references: u32,
}

/// Facts gathered by the pipeline stages while rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderSummary {
    pub outline: Vec<OutlineEntry>,
    pub footnotes: Vec<FootnoteEntry>,
    pub has_table_of_contents: bool,
    pub external_links: u32,
    pub contains_code: bool,
    pub contains_math: bool,
    pub math_errors: u32,
    /// Stages that hit malformed input and fell back to a degraded rendering.
    pub degraded_stages: Vec<StageName>,
}

/// Final output of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderTree {
    pub root: Vec<UiNode>,
    pub summary: RenderSummary,
}

impl RenderTree {
    /// Serialize the element tree back to HTML markup.
    pub fn to_html(&self) -> String {
        super::service::ui_nodes_to_html(&self.root)
    }

    pub fn text_content(&self) -> String {
        self.root.iter().map(UiNode::text_content).collect()
    }

    /// Depth-first iterator over every element in the tree.
    pub fn elements(&self) -> impl Iterator<Item = &UiElement> {
        let mut stack: Vec<&UiNode> = self.root.iter().rev().collect();
        std::iter::from_fn(move || {
            while let Some(node) = stack.pop() {
                if let UiNode::Element(element) = node {
                    stack.extend(element.children.iter().rev());
                    return Some(element);
                }
            }
            None
        })
    }

    pub fn find_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a UiElement> + 'a {
        self.elements().filter(move |element| element.tag == tag)
    }
}

/// Internal failure of a single stage. These never cross the pipeline
/// boundary: the pipeline logs them and degrades the affected stage.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    #[error("markdown conversion failed: {message}")]
    Markdown { message: String },
    #[error("html parsing failed: {message}")]
    Html { message: String },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
    #[error("math typesetting failed: {message}")]
    Math { message: String },
}
