//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::render::{
    DEFAULT_CLASSIFY_INTERVAL, DEFAULT_LINK_PROTOCOLS, DEFAULT_LINK_REL, DEFAULT_LINK_TARGET,
    DEFAULT_LONG_TEXT_THRESHOLD, DEFAULT_QUIET_WINDOW, DEFAULT_TOC_HEADING, DEFAULT_TOC_MAX_DEPTH,
    RawHtmlPolicy,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "append-editor";
const ENV_PREFIX: &str = "APPEND_EDITOR";
const DEFAULT_TYPE_CHUNK_CHARS: usize = 64;
const DEFAULT_TYPE_INTERVAL_MS: u64 = 40;

/// Command-line arguments for the append-editor binary.
#[derive(Debug, Parser)]
#[command(
    name = "append-editor",
    version,
    about = "Render append-editor notes from the command line"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "APPEND_EDITOR_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render a note once and print the result.
    Render(Box<RenderArgs>),
    /// Replay a note as a burst of keystrokes through the render scheduler.
    Type(Box<TypeArgs>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Serialized HTML markup.
    #[default]
    Html,
    /// UI element tree plus render summary as JSON.
    Json,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: RenderOverrides,

    /// Note to render; reads stdin when omitted.
    #[arg(value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub path: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Html)]
    pub format: OutputFormat,

    /// Render immediately even when the note counts as long.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub bypass: bool,
}

#[derive(Debug, Args, Clone)]
pub struct TypeArgs {
    #[command(flatten)]
    pub overrides: RenderOverrides,

    /// Note to replay; reads stdin when omitted.
    #[arg(value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub path: Option<PathBuf>,

    /// Characters appended per simulated keystroke.
    #[arg(long, default_value_t = DEFAULT_TYPE_CHUNK_CHARS, value_parser = clap::value_parser!(usize))]
    pub chunk: usize,

    /// Delay between simulated keystrokes.
    #[arg(long = "interval-ms", default_value_t = DEFAULT_TYPE_INTERVAL_MS)]
    pub interval_ms: u64,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the deepest heading level listed in a table of contents.
    #[arg(long = "toc-max-depth", value_name = "DEPTH")]
    pub toc_max_depth: Option<u8>,

    /// Override the handling of embedded HTML (omit|sanitize|passthrough).
    #[arg(long = "raw-html", value_name = "POLICY")]
    pub raw_html: Option<RawHtmlPolicy>,

    /// Override the origin used to classify external links.
    #[arg(long = "origin", value_name = "URL")]
    pub origin: Option<String>,

    /// Override the character count above which renders are deferred.
    #[arg(long = "long-text-threshold", value_name = "CHARS")]
    pub long_text_threshold: Option<usize>,

    /// Override the quiet window of deferred renders.
    #[arg(long = "quiet-window-ms", value_name = "MILLISECONDS")]
    pub quiet_window_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub toc_max_depth: u8,
    pub toc_heading: String,
    pub inline_notes: bool,
    pub raw_html: RawHtmlPolicy,
    pub ignore_missing_languages: bool,
    pub hard_breaks: bool,
    pub origin: Option<Url>,
    pub link_target: Option<String>,
    pub link_rel: Vec<String>,
    pub link_protocols: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub long_text_threshold: usize,
    pub classify_interval: Duration,
    pub quiet_window: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("render.link_rel")
            .with_list_parse_key("render.link_protocols")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Render(args)) => raw.apply_render_overrides(&args.overrides),
        Some(Command::Type(args)) => raw.apply_render_overrides(&args.overrides),
        None => raw.apply_render_overrides(&RenderOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    scheduler: RawSchedulerSettings,
}

impl RawSettings {
    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(depth) = overrides.toc_max_depth {
            self.render.toc_max_depth = Some(depth);
        }
        if let Some(policy) = overrides.raw_html {
            self.render.raw_html = Some(policy);
        }
        if let Some(origin) = overrides.origin.as_ref() {
            self.render.origin = Some(origin.clone());
        }
        if let Some(threshold) = overrides.long_text_threshold {
            self.scheduler.long_text_threshold = Some(threshold);
        }
        if let Some(window) = overrides.quiet_window_ms {
            self.scheduler.quiet_window_ms = Some(window);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            render,
            scheduler,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;
        let scheduler = build_scheduler_settings(scheduler)?;

        Ok(Self {
            logging,
            render,
            scheduler,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::WARN,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let toc_max_depth = render.toc_max_depth.unwrap_or(DEFAULT_TOC_MAX_DEPTH);
    if !(1..=6).contains(&toc_max_depth) {
        return Err(LoadError::invalid(
            "render.toc_max_depth",
            "must be between 1 and 6",
        ));
    }

    let toc_heading = render
        .toc_heading
        .unwrap_or_else(|| DEFAULT_TOC_HEADING.to_string());
    if toc_heading.trim().is_empty() {
        return Err(LoadError::invalid(
            "render.toc_heading",
            "pattern must not be empty",
        ));
    }

    let origin = match non_empty(render.origin) {
        Some(origin) => {
            let url = Url::parse(&origin).map_err(|err| {
                LoadError::invalid("render.origin", format!("invalid url `{origin}`: {err}"))
            })?;
            if url.host_str().is_none() {
                return Err(LoadError::invalid(
                    "render.origin",
                    format!("url `{origin}` has no host"),
                ));
            }
            Some(url)
        }
        None => None,
    };

    // An explicitly empty target disables it.
    let link_target = match render.link_target {
        Some(target) => non_empty(Some(target)),
        None => Some(DEFAULT_LINK_TARGET.to_string()),
    };

    let link_rel = render
        .link_rel
        .map(normalize_list)
        .unwrap_or_else(|| DEFAULT_LINK_REL.iter().map(|rel| rel.to_string()).collect());

    let link_protocols = render
        .link_protocols
        .map(normalize_list)
        .unwrap_or_else(|| {
            DEFAULT_LINK_PROTOCOLS
                .iter()
                .map(|protocol| protocol.to_string())
                .collect()
        });
    if link_protocols.is_empty() {
        return Err(LoadError::invalid(
            "render.link_protocols",
            "at least one protocol is required",
        ));
    }

    Ok(RenderSettings {
        toc_max_depth,
        toc_heading,
        inline_notes: render.inline_notes.unwrap_or(true),
        raw_html: render.raw_html.unwrap_or_default(),
        ignore_missing_languages: render.ignore_missing_languages.unwrap_or(true),
        hard_breaks: render.hard_breaks.unwrap_or(true),
        origin,
        link_target,
        link_rel,
        link_protocols,
    })
}

fn build_scheduler_settings(
    scheduler: RawSchedulerSettings,
) -> Result<SchedulerSettings, LoadError> {
    let long_text_threshold = scheduler
        .long_text_threshold
        .unwrap_or(DEFAULT_LONG_TEXT_THRESHOLD);

    let classify_interval = scheduler
        .classify_interval_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_CLASSIFY_INTERVAL);

    let quiet_window = scheduler
        .quiet_window_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_QUIET_WINDOW);
    if quiet_window.is_zero() {
        return Err(LoadError::invalid(
            "scheduler.quiet_window_ms",
            "must be greater than zero",
        ));
    }

    Ok(SchedulerSettings {
        long_text_threshold,
        classify_interval,
        quiet_window,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    toc_max_depth: Option<u8>,
    toc_heading: Option<String>,
    inline_notes: Option<bool>,
    raw_html: Option<RawHtmlPolicy>,
    ignore_missing_languages: Option<bool>,
    hard_breaks: Option<bool>,
    origin: Option<String>,
    link_target: Option<String>,
    link_rel: Option<Vec<String>>,
    link_protocols: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchedulerSettings {
    long_text_threshold: Option<usize>,
    classify_interval_ms: Option<u64>,
    quiet_window_ms: Option<u64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn normalize_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| non_empty(Some(value)))
        .map(|value| value.to_ascii_lowercase())
        .collect()
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
