//! Markdown rendering core.
//!
//! [`RenderPipeline`] is a pure, fixed sequence of stages turning note text
//! into a UI element tree; it never fails for any input. [`RenderScheduler`]
//! sits in front of it and decides whether a call renders now or is
//! coalesced into a deferred render while the user keeps typing.

mod scheduler;
mod service;
mod types;

pub use scheduler::{
    DEFAULT_CLASSIFY_INTERVAL, DEFAULT_LONG_TEXT_THRESHOLD, DEFAULT_QUIET_WINDOW, DebouncePoll,
    DebounceState, Debouncer, LengthClassifier, METRIC_RENDER_DEFERRED_TOTAL, RenderScheduler,
    RenderSink, SchedulePolicy, Scheduled,
};
pub use service::{
    DEFAULT_LINK_PROTOCOLS, DEFAULT_LINK_REL, DEFAULT_LINK_TARGET, DEFAULT_TOC_HEADING,
    DEFAULT_TOC_MAX_DEPTH, ExternalLinkOptions, FootnoteOptions, HighlightOptions,
    METRIC_RENDER_DEGRADED_TOTAL, METRIC_RENDER_MS, METRIC_RENDER_TOTAL, PipelineConfigError,
    PipelineOptions, RawHtmlPolicy, RenderConfigError, RenderPipeline, TocOptions,
    configure_render_pipeline, highlight_stylesheet, render_pipeline,
};
pub use types::{
    FootnoteEntry, OutlineEntry, PropValue, RenderSummary, RenderTree, StageName, UiElement,
    UiNode,
};
