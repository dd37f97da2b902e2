use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_TOC_MAX_DEPTH: u8 = 6;
pub const DEFAULT_TOC_HEADING: &str = "toc|table[ -]of[ -]contents?";
pub const DEFAULT_LINK_TARGET: &str = "_blank";
pub const DEFAULT_LINK_REL: [&str; 3] = ["nofollow", "noopener", "noreferrer"];
pub const DEFAULT_LINK_PROTOCOLS: [&str; 2] = ["http", "https"];

/// Options of the table-of-contents stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocOptions {
    /// Deepest heading level listed (1..=6).
    pub max_depth: u8,
    /// Case-insensitive pattern matched against the whole text of the marker heading.
    pub heading: String,
}

impl Default for TocOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_TOC_MAX_DEPTH,
            heading: DEFAULT_TOC_HEADING.to_string(),
        }
    }
}

/// Options of the external-link stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalLinkOptions {
    /// Origin the note is displayed under. When absent every absolute link
    /// with an accepted protocol counts as external.
    pub origin: Option<Url>,
    pub target: Option<String>,
    pub rel: Vec<String>,
    pub protocols: Vec<String>,
}

impl Default for ExternalLinkOptions {
    fn default() -> Self {
        Self {
            origin: None,
            target: Some(DEFAULT_LINK_TARGET.to_string()),
            rel: DEFAULT_LINK_REL.iter().map(|rel| rel.to_string()).collect(),
            protocols: DEFAULT_LINK_PROTOCOLS
                .iter()
                .map(|protocol| protocol.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FootnoteOptions {
    /// Accept `^[inline note]` footnotes next to labelled ones.
    pub inline_notes: bool,
}

impl Default for FootnoteOptions {
    fn default() -> Self {
        Self { inline_notes: true }
    }
}

/// What happens to HTML typed directly into a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawHtmlPolicy {
    /// Drop embedded HTML.
    Omit,
    /// Keep embedded HTML after running it through an allow-list.
    Sanitize,
    /// Keep embedded HTML as written.
    #[default]
    Passthrough,
}

impl FromStr for RawHtmlPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "omit" => Ok(Self::Omit),
            "sanitize" => Ok(Self::Sanitize),
            "passthrough" => Ok(Self::Passthrough),
            other => Err(format!(
                "unknown raw html policy `{other}` (expected omit, sanitize or passthrough)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightOptions {
    /// Leave code blocks with an unknown language untouched instead of
    /// falling back to plain-text highlighting.
    pub ignore_missing: bool,
}

impl Default for HighlightOptions {
    fn default() -> Self {
        Self {
            ignore_missing: true,
        }
    }
}

/// Full configuration of the rendering pipeline. Validated once when the
/// pipeline is built and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub toc: TocOptions,
    pub links: ExternalLinkOptions,
    pub footnotes: FootnoteOptions,
    pub raw_html: RawHtmlPolicy,
    pub highlight: HighlightOptions,
    /// Treat every newline inside a paragraph as a hard line break.
    pub hard_breaks: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            toc: TocOptions::default(),
            links: ExternalLinkOptions::default(),
            footnotes: FootnoteOptions::default(),
            raw_html: RawHtmlPolicy::default(),
            highlight: HighlightOptions::default(),
            hard_breaks: true,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineConfigError {
    #[error("toc max depth must be between 1 and 6, got {0}")]
    TocDepth(u8),
    #[error("invalid toc heading pattern `{pattern}`: {message}")]
    TocHeading { pattern: String, message: String },
    #[error("document origin `{0}` has no host")]
    OriginWithoutHost(String),
    #[error("external link protocols must not be empty")]
    NoLinkProtocols,
    #[error("bundled syntax pack is invalid: {message}")]
    SyntaxPack { message: String },
}

/// Options after validation, with derived values precomputed.
#[derive(Debug, Clone)]
pub(crate) struct ValidatedOptions {
    pub(crate) options: PipelineOptions,
    pub(crate) toc_heading: Regex,
}

impl PipelineOptions {
    pub(crate) fn validate(self) -> Result<ValidatedOptions, PipelineConfigError> {
        if !(1..=6).contains(&self.toc.max_depth) {
            return Err(PipelineConfigError::TocDepth(self.toc.max_depth));
        }

        let toc_heading = RegexBuilder::new(&format!("^(?:{})$", self.toc.heading))
            .case_insensitive(true)
            .build()
            .map_err(|err| PipelineConfigError::TocHeading {
                pattern: self.toc.heading.clone(),
                message: err.to_string(),
            })?;

        if let Some(origin) = self.links.origin.as_ref()
            && origin.host_str().is_none()
        {
            return Err(PipelineConfigError::OriginWithoutHost(origin.to_string()));
        }

        if self.links.protocols.iter().all(|p| p.trim().is_empty()) {
            return Err(PipelineConfigError::NoLinkProtocols);
        }

        Ok(ValidatedOptions {
            options: self,
            toc_heading,
        })
    }
}
