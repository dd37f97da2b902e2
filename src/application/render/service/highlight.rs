use syntect::{
    dumps::from_uncompressed_data,
    html::{ClassStyle, ClassedHTMLGenerator},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};
use tracing::warn;

use crate::application::render::types::{RenderSummary, StageError};

use super::options::{HighlightOptions, PipelineConfigError};
use super::tree::{HtmlElement, HtmlNode, escape_attribute, parse_fragment};

/// Syntax definitions packed at build time (`two-face` extra syntaxes).
pub(crate) fn bundled_syntax_set() -> Result<SyntaxSet, PipelineConfigError> {
    let syntax_bytes = include_bytes!(env!("SYNTAX_PACK_FILE"));
    from_uncompressed_data(syntax_bytes).map_err(|err| PipelineConfigError::SyntaxPack {
        message: err.to_string(),
    })
}

pub(crate) struct Highlighter<'a> {
    pub(crate) syntax_set: &'a SyntaxSet,
    pub(crate) class_style: &'a ClassStyle,
    pub(crate) options: HighlightOptions,
}

/// Highlight every fenced code block that names a language.
pub(crate) fn highlight_blocks(
    nodes: &mut [HtmlNode],
    highlighter: &Highlighter<'_>,
    summary: &mut RenderSummary,
) -> Result<(), StageError> {
    let mut first_error = None;
    highlight_nodes(nodes, highlighter, summary, &mut first_error);
    first_error.map_or(Ok(()), Err)
}

fn highlight_nodes(
    nodes: &mut [HtmlNode],
    highlighter: &Highlighter<'_>,
    summary: &mut RenderSummary,
    first_error: &mut Option<StageError>,
) {
    for node in nodes.iter_mut() {
        let HtmlNode::Element(element) = node else {
            continue;
        };

        if element.tag != "pre" {
            highlight_nodes(&mut element.children, highlighter, summary, first_error);
            continue;
        }

        let Some(code) = element.only_element_child().filter(|code| code.tag == "code") else {
            continue;
        };
        summary.contains_code = true;

        let Some(language) = code_language(code) else {
            continue;
        };
        let meta = code.attr("data-meta").map(str::to_string);
        let literal = code.text_content();

        let syntax = match find_syntax(highlighter.syntax_set, &language) {
            Some(syntax) => syntax,
            None if highlighter.options.ignore_missing => continue,
            None => {
                warn!(
                    target = "application::render::highlight",
                    language = %language,
                    "unknown code block language; highlighting as plain text"
                );
                highlighter.syntax_set.find_syntax_plain_text()
            }
        };

        let replacement = highlight_code(
            syntax,
            &language,
            meta.as_deref(),
            &literal,
            highlighter,
        )
        .and_then(|html| parse_fragment(&html, None));

        match replacement {
            Ok(mut parsed) => {
                if let Some(HtmlNode::Element(highlighted)) = parsed.pop() {
                    *element = highlighted;
                }
            }
            Err(err) => {
                warn!(
                    target = "application::render::highlight",
                    language = %language,
                    "syntax highlighting failed: {err}"
                );
                if first_error.is_none() {
                    *first_error = Some(err);
                }
            }
        }
    }
}

/// Language named by the first `language-*` class of a code element.
fn code_language(code: &HtmlElement) -> Option<String> {
    code.classes()
        .find_map(|class| class.strip_prefix("language-"))
        .filter(|language| !language.is_empty())
        .map(str::to_string)
}

pub(crate) fn highlight_code(
    syntax: &SyntaxReference,
    language: &str,
    meta: Option<&str>,
    code: &str,
    highlighter: &Highlighter<'_>,
) -> Result<String, StageError> {
    let mut code_with_newline = code.to_string();
    if !code_with_newline.ends_with('\n') {
        code_with_newline.push('\n');
    }

    let mut generator = ClassedHTMLGenerator::new_with_class_style(
        syntax,
        highlighter.syntax_set,
        *highlighter.class_style,
    );

    for line in LinesWithEndings::from(code_with_newline.as_str()) {
        generator
            .parse_html_for_line_which_includes_newline(line)
            .map_err(|err| StageError::Highlighting {
                language: language.to_string(),
                message: err.to_string(),
            })?;
    }

    let highlighted = generator.finalize();
    let lang_class = language.to_ascii_lowercase();
    let meta_attr = meta
        .filter(|m| !m.is_empty())
        .map(|m| format!(" data-meta=\"{}\"", escape_attribute(m)))
        .unwrap_or_default();

    Ok(format!(
        "<pre class=\"syntax-highlight syntax-lang-{lang}\" data-language=\"{language}\"><code class=\"language-{lang} syntax-code\"{meta_attr}>{highlighted}</code></pre>",
        lang = escape_attribute(&lang_class),
        language = escape_attribute(language),
    ))
}

fn find_syntax<'a>(syntax_set: &'a SyntaxSet, token: &str) -> Option<&'a SyntaxReference> {
    let lowercase = token.to_ascii_lowercase();
    syntax_set
        .find_syntax_by_token(&lowercase)
        .or_else(|| syntax_set.find_syntax_by_name(token))
        .or_else(|| syntax_set.find_syntax_by_extension(&lowercase))
}
