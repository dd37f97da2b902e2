mod anchors;
mod config;
mod convert;
mod element;
mod emoji;
mod footnotes;
mod highlight;
mod links;
mod math;
mod options;
mod raw;
mod toc;
mod tree;

use std::{sync::Arc, time::Instant};

use comrak::{Arena, parse_document};
use metrics::{counter, histogram};
use once_cell::sync::{Lazy, OnceCell};
use syntect::{html::ClassStyle, parsing::SyntaxSet};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::render::types::{RenderSummary, RenderTree, StageError, StageName};

use self::highlight::Highlighter;
use self::tree::HtmlNode;
use config::{build_raw_html_sanitizer, comrak_options};
use options::ValidatedOptions;

pub use options::{
    DEFAULT_LINK_PROTOCOLS, DEFAULT_LINK_REL, DEFAULT_LINK_TARGET, DEFAULT_TOC_HEADING,
    DEFAULT_TOC_MAX_DEPTH, ExternalLinkOptions, FootnoteOptions, HighlightOptions,
    PipelineConfigError, PipelineOptions, RawHtmlPolicy, TocOptions,
};

pub(crate) use element::ui_nodes_to_html;

pub const METRIC_RENDER_TOTAL: &str = "append_editor_render_total";
pub const METRIC_RENDER_MS: &str = "append_editor_render_ms";
pub const METRIC_RENDER_DEGRADED_TOTAL: &str = "append_editor_render_degraded_total";

/// CSS for the `syntax-` classes emitted by the highlight stage.
pub fn highlight_stylesheet() -> &'static str {
    include_str!(env!("SYNTAX_THEME_CSS_FILE"))
}

/// Stage working on the HTML-flavoured tree.
type HtmlStage = fn(&RenderPipeline, &mut Vec<HtmlNode>, &mut RenderSummary) -> Result<(), StageError>;

/// Stages after conversion, in execution order. Element conversion runs last
/// and cannot fail.
const HTML_STAGES: [(StageName, HtmlStage); 4] = [
    (StageName::RawHtml, raw_html_stage),
    (StageName::Math, math_stage),
    (StageName::Highlight, highlight_stage),
    (StageName::Emoji, emoji_stage),
];

/// Fixed markdown rendering pipeline: comrak parsing, markdown-tree stages,
/// conversion to an HTML tree, HTML-tree stages and finally UI elements.
///
/// Built once from validated options and shared read-only between renders.
pub struct RenderPipeline {
    options: ValidatedOptions,
    comrak: comrak::Options<'static>,
    syntax_set: SyntaxSet,
    class_style: ClassStyle,
    sanitizer: ammonia::Builder<'static>,
}

impl RenderPipeline {
    pub fn new(options: PipelineOptions) -> Result<Self, PipelineConfigError> {
        let options = options.validate()?;
        let comrak = comrak_options(&options.options);
        let syntax_set = highlight::bundled_syntax_set()?;

        Ok(Self {
            options,
            comrak,
            syntax_set,
            class_style: ClassStyle::SpacedPrefixed { prefix: "syntax-" },
            sanitizer: build_raw_html_sanitizer(),
        })
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options.options
    }

    /// Render `text` into a UI element tree. Never fails: stages that meet
    /// input they cannot handle fall back to a degraded rendering and are
    /// listed in [`RenderSummary::degraded_stages`].
    pub fn render(&self, text: &str) -> RenderTree {
        let started_at = Instant::now();
        let mut summary = RenderSummary::default();

        let nodes = self.render_document(text, &mut summary);
        let root = element::to_ui_nodes(nodes);

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        counter!(METRIC_RENDER_TOTAL).increment(1);
        histogram!(METRIC_RENDER_MS).record(elapsed_ms);
        for stage in &summary.degraded_stages {
            counter!(METRIC_RENDER_DEGRADED_TOTAL, "stage" => stage.as_str()).increment(1);
        }

        debug!(
            target = "application::render::pipeline",
            bytes = text.len(),
            headings = summary.outline.len(),
            degraded = summary.degraded_stages.len(),
            elapsed_ms,
            "markdown rendered"
        );

        RenderTree { root, summary }
    }

    /// Render `text` and serialize the element tree to HTML.
    pub fn render_html(&self, text: &str) -> String {
        self.render(text).to_html()
    }

    fn render_document(&self, text: &str, summary: &mut RenderSummary) -> Vec<HtmlNode> {
        let pipeline = &self.options.options;
        let arena = Arena::new();

        let root = parse_document(&arena, text, &self.comrak);

        let mut headings = anchors::assign_anchors(root);

        summary.has_table_of_contents =
            toc::inject_table_of_contents(root, &mut headings, &self.options, |markdown| {
                parse_document(&arena, markdown, &self.comrak)
            });
        summary.outline = headings.into_iter().map(|heading| heading.entry).collect();

        let annotations = links::annotate_links(root, &pipeline.links);

        summary.footnotes = footnotes::collect_footnotes(root);

        let converted = convert::convert(
            root,
            &self.comrak,
            pipeline.raw_html,
            &summary.outline,
            &annotations,
            &pipeline.links,
        );
        let mut nodes = match converted {
            Ok(converted) => {
                summary.external_links = converted.external_links;
                converted.nodes
            }
            Err(err) => {
                record_degraded(summary, StageName::Convert, &err);
                return convert::literal_fallback(text);
            }
        };

        for (stage, run) in HTML_STAGES {
            if let Err(err) = run(self, &mut nodes, summary) {
                record_degraded(summary, stage, &err);
            }
        }

        nodes
    }
}

fn raw_html_stage(
    pipeline: &RenderPipeline,
    nodes: &mut Vec<HtmlNode>,
    _summary: &mut RenderSummary,
) -> Result<(), StageError> {
    let policy = pipeline.options.options.raw_html;
    let materialized = raw::materialize(nodes, policy, &pipeline.sanitizer);
    if materialized.is_err() {
        raw::demote_raw(nodes);
    }
    materialized
}

fn math_stage(
    _pipeline: &RenderPipeline,
    nodes: &mut Vec<HtmlNode>,
    summary: &mut RenderSummary,
) -> Result<(), StageError> {
    math::typeset(nodes, summary)
}

fn highlight_stage(
    pipeline: &RenderPipeline,
    nodes: &mut Vec<HtmlNode>,
    summary: &mut RenderSummary,
) -> Result<(), StageError> {
    let highlighter = Highlighter {
        syntax_set: &pipeline.syntax_set,
        class_style: &pipeline.class_style,
        options: pipeline.options.options.highlight,
    };
    highlight::highlight_blocks(nodes, &highlighter, summary)
}

fn emoji_stage(
    _pipeline: &RenderPipeline,
    nodes: &mut Vec<HtmlNode>,
    _summary: &mut RenderSummary,
) -> Result<(), StageError> {
    emoji::substitute(nodes);
    Ok(())
}

fn record_degraded(summary: &mut RenderSummary, stage: StageName, err: &StageError) {
    warn!(
        target = "application::render::pipeline",
        stage = stage.as_str(),
        error = %err,
        "render stage degraded"
    );
    if !summary.degraded_stages.contains(&stage) {
        summary.degraded_stages.push(stage);
    }
}

impl From<&crate::config::RenderSettings> for PipelineOptions {
    fn from(settings: &crate::config::RenderSettings) -> Self {
        Self {
            toc: TocOptions {
                max_depth: settings.toc_max_depth,
                heading: settings.toc_heading.clone(),
            },
            links: ExternalLinkOptions {
                origin: settings.origin.clone(),
                target: settings.link_target.clone(),
                rel: settings.link_rel.clone(),
                protocols: settings.link_protocols.clone(),
            },
            footnotes: FootnoteOptions {
                inline_notes: settings.inline_notes,
            },
            raw_html: settings.raw_html,
            highlight: HighlightOptions {
                ignore_missing: settings.ignore_missing_languages,
            },
            hard_breaks: settings.hard_breaks,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderConfigError {
    #[error("render pipeline already configured")]
    AlreadyConfigured,
    #[error(transparent)]
    Invalid(#[from] PipelineConfigError),
}

static RENDER_PIPELINE_OPTIONS: OnceCell<PipelineOptions> = OnceCell::new();

static RENDER_PIPELINE: Lazy<Result<Arc<RenderPipeline>, PipelineConfigError>> = Lazy::new(|| {
    let options = RENDER_PIPELINE_OPTIONS.get().cloned().unwrap_or_default();
    RenderPipeline::new(options).map(Arc::new)
});

/// Set the options of the shared pipeline. Must run before the first call to
/// [`render_pipeline`] and at most once.
pub fn configure_render_pipeline(options: PipelineOptions) -> Result<(), RenderConfigError> {
    if Lazy::get(&RENDER_PIPELINE).is_some() {
        return Err(RenderConfigError::AlreadyConfigured);
    }
    options.clone().validate()?;
    RENDER_PIPELINE_OPTIONS
        .set(options)
        .map_err(|_| RenderConfigError::AlreadyConfigured)
}

/// Access the shared pipeline, built on first use.
pub fn render_pipeline() -> Result<Arc<RenderPipeline>, PipelineConfigError> {
    RENDER_PIPELINE.as_ref().map(Arc::clone).map_err(Clone::clone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn pipeline() -> RenderPipeline {
        RenderPipeline::new(PipelineOptions::default()).expect("pipeline")
    }

    #[test]
    fn stages_after_conversion_run_in_fixed_order() {
        let order: Vec<StageName> = HTML_STAGES.iter().map(|(stage, _)| *stage).collect();
        assert_eq!(order, StageName::ALL[6..10].to_vec());
    }

    #[test]
    fn renders_a_complete_note() {
        let tree = pipeline().render(
            "# Plan :rocket:\n\nSee [docs](https://example.com) and $e^{i\\pi}$.\n\n```rust\nfn main() {}\n```\n\nNote[^1].\n\n[^1]: Footnote body.\n",
        );

        let summary = &tree.summary;
        assert_eq!(summary.outline.len(), 1);
        assert_eq!(summary.outline[0].anchor.as_deref(), Some("plan-rocket"));
        assert_eq!(summary.external_links, 1);
        assert!(summary.contains_math);
        assert!(summary.contains_code);
        assert_eq!(summary.footnotes.len(), 1);
        assert!(summary.degraded_stages.is_empty());

        let heading = tree.find_by_tag("h1").next().expect("h1");
        assert_eq!(heading.prop_str("id"), Some("plan-rocket"));
        assert!(heading.children.iter().any(|child| child.text_content().contains('🚀')));
    }

    #[test]
    fn render_is_deterministic() {
        let pipeline = pipeline();
        let text = "## A\n\n## A\n\n- [ ] task\n- [x] done\n";
        assert_eq!(pipeline.render(text), pipeline.render(text));
    }

    #[test]
    fn render_records_metrics() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let pipeline = pipeline();

        metrics::with_local_recorder(&recorder, || {
            pipeline.render("hello");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let total = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == METRIC_RENDER_TOTAL)
            .map(|(_, _, _, value)| value.clone());
        assert_eq!(total, Some(&DebugValue::Counter(1)));
        assert!(
            snapshot
                .iter()
                .any(|(key, _, _, _)| key.key().name() == METRIC_RENDER_MS)
        );
    }

    #[test]
    fn highlight_stylesheet_uses_prefixed_classes() {
        assert!(highlight_stylesheet().contains(".syntax-"));
    }
}
