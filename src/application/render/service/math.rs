use katex::{OptsBuilder, OutputType};
use tracing::warn;

use crate::application::render::types::{RenderSummary, StageError};

use super::tree::{HtmlElement, HtmlNode, parse_fragment};

const MATH_STYLE_ATTR: &str = "data-math-style";

/// Render a KaTeX expression to HTML markup.
pub(crate) fn render_math_html(literal: &str, display_mode: bool) -> Result<String, StageError> {
    let mut builder = OptsBuilder::default();
    builder.display_mode(display_mode);
    builder.output_type(OutputType::Html);
    builder.throw_on_error(true);

    let opts = builder.build().map_err(|err| StageError::Math {
        message: format!("failed to build KaTeX options: {err}"),
    })?;

    katex::render_with_opts(literal, opts).map_err(|err| StageError::Math {
        message: err.to_string(),
    })
}

/// Typeset every math span and math code block of the tree.
///
/// Invalid expressions are replaced by a `katex-error` span showing the source,
/// which keeps the rest of the document intact.
pub(crate) fn typeset(nodes: &mut [HtmlNode], summary: &mut RenderSummary) -> Result<(), StageError> {
    let mut first_error = None;
    typeset_nodes(nodes, summary, &mut first_error);
    first_error.map_or(Ok(()), Err)
}

fn typeset_nodes(
    nodes: &mut [HtmlNode],
    summary: &mut RenderSummary,
    first_error: &mut Option<StageError>,
) {
    for node in nodes.iter_mut() {
        let HtmlNode::Element(element) = node else {
            continue;
        };

        if let Some((literal, display_mode, block)) = math_source(element) {
            summary.contains_math = true;
            match typeset_one(&literal, display_mode, block) {
                Ok(replacement) => *element = replacement,
                Err(MathFailure::Expression(message)) => {
                    warn!(
                        target = "application::render::math",
                        display_mode,
                        "KaTeX rendering failed: {message}"
                    );
                    summary.math_errors = summary.math_errors.saturating_add(1);
                    *element = error_placeholder(&literal, &message);
                }
                Err(MathFailure::Stage(err)) => {
                    if first_error.is_none() {
                        *first_error = Some(err);
                    }
                }
            }
            continue;
        }

        typeset_nodes(&mut element.children, summary, first_error);
    }
}

/// `(source, display, block)` when the element is a math span or a math code block.
fn math_source(element: &HtmlElement) -> Option<(String, bool, bool)> {
    if let Some(style) = element.attr(MATH_STYLE_ATTR) {
        return Some((element.text_content(), style == "display", false));
    }

    if element.tag == "pre" {
        let code = element.only_element_child()?;
        let style = code.attr(MATH_STYLE_ATTR)?;
        return Some((code.text_content(), style == "display", true));
    }

    None
}

enum MathFailure {
    /// The expression itself is invalid.
    Expression(String),
    /// The typeset markup could not be taken back into the tree.
    Stage(StageError),
}

fn typeset_one(literal: &str, display: bool, block: bool) -> Result<HtmlElement, MathFailure> {
    let html = match render_math_html(literal.trim(), display) {
        Ok(html) => html,
        Err(StageError::Math { message }) => return Err(MathFailure::Expression(message)),
        Err(other) => return Err(MathFailure::Stage(other)),
    };
    let children = parse_fragment(&html, None).map_err(MathFailure::Stage)?;

    let (tag, class) = match (block, display) {
        (true, _) => ("div", "math math-display"),
        (false, true) => ("span", "math math-display"),
        (false, false) => ("span", "math math-inline"),
    };
    Ok(HtmlElement::new(tag)
        .with_attr("class", class)
        .with_children(children))
}

fn error_placeholder(literal: &str, message: &str) -> HtmlElement {
    HtmlElement::new("span")
        .with_attr("class", "katex-error")
        .with_attr("title", message)
        .with_children(vec![HtmlNode::Text(literal.to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::service::tree::serialize;

    fn typeset_markup(html: &str) -> (Vec<HtmlNode>, RenderSummary) {
        let mut nodes = parse_fragment(html, None).expect("parse");
        let mut summary = RenderSummary::default();
        typeset(&mut nodes, &mut summary).expect("typeset");
        (nodes, summary)
    }

    #[test]
    fn render_math_html_emits_katex_markup() {
        let html = render_math_html("a^2", false).expect("katex");
        assert!(html.contains("class=\"katex\""));
    }

    #[test]
    fn typesets_inline_spans() {
        let (nodes, summary) =
            typeset_markup("<p>Area <span data-math-style=\"inline\">\\pi r^2</span></p>");

        let html = serialize(&nodes);
        assert!(html.contains("<span class=\"math math-inline\">"));
        assert!(html.contains("katex"));
        assert!(summary.contains_math);
        assert_eq!(summary.math_errors, 0);
    }

    #[test]
    fn typesets_math_code_blocks_as_display() {
        let (nodes, _) = typeset_markup(
            "<pre><code class=\"language-math\" data-math-style=\"display\">x = 1\n</code></pre>",
        );

        let HtmlNode::Element(block) = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(block.tag, "div");
        assert!(block.has_class("math-display"));
    }

    #[test]
    fn invalid_expression_becomes_error_placeholder() {
        let (nodes, summary) = typeset_markup(
            "<p><span data-math-style=\"display\">\\frac{1}{</span> after</p>",
        );

        let HtmlNode::Element(paragraph) = &nodes[0] else {
            panic!("expected paragraph");
        };
        let Some(HtmlNode::Element(placeholder)) = paragraph.children.first() else {
            panic!("expected placeholder element");
        };
        assert!(placeholder.has_class("katex-error"));
        assert!(placeholder.attr("title").is_some_and(|title| !title.is_empty()));
        assert_eq!(placeholder.text_content(), "\\frac{1}{");
        assert!(paragraph.text_content().ends_with(" after"));
        assert_eq!(summary.math_errors, 1);
    }
}
