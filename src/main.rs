use std::{path::Path, process, sync::Arc, time::Duration};

use append_editor::{
    application::{
        error::AppError,
        render::{
            PipelineOptions, RenderPipeline, RenderScheduler, RenderTree, SchedulePolicy,
            Scheduled, configure_render_pipeline, render_pipeline,
        },
    },
    config::{self, Command, OutputFormat, RenderArgs, TypeArgs},
    infra::{error::InfraError, telemetry},
};
use serde::Serialize;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{Dispatch, Level, debug, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(source = report.source, chain = ?report.messages, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(source = report.source, chain = ?report.messages, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(Command::Render(Box::<RenderArgs>::default()));

    telemetry::init(&settings.logging)?;
    configure_render_pipeline(PipelineOptions::from(&settings.render))?;
    let pipeline = render_pipeline()?;
    let policy = SchedulePolicy::from(&settings.scheduler);

    match command {
        Command::Render(args) => run_render(pipeline, policy, *args).await,
        Command::Type(args) => run_type(pipeline, policy, *args).await,
    }
}

async fn run_render(
    pipeline: Arc<RenderPipeline>,
    policy: SchedulePolicy,
    args: RenderArgs,
) -> Result<(), AppError> {
    let text = read_note(args.path.as_deref()).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = RenderScheduler::new(pipeline, policy, tx);

    let tree = match scheduler.render_with_policy(&text, args.bypass) {
        Scheduled::Rendered(tree) => Arc::new(tree),
        Scheduled::Deferred { .. } => {
            info!(
                quiet_window_ms = policy.quiet_window.as_millis() as u64,
                "note is long; waiting for deferred render"
            );
            rx.recv()
                .await
                .ok_or_else(|| AppError::unexpected("deferred render never arrived"))?
        }
    };

    let output = match args.format {
        OutputFormat::Html => tree.to_html(),
        OutputFormat::Json => serde_json::to_string_pretty(tree.as_ref())
            .map_err(|err| AppError::unexpected(format!("failed to encode render tree: {err}")))?,
    };
    write_stdout(&output).await
}

/// One line of `type` output.
#[derive(Debug, Serialize)]
struct RenderEvent {
    kind: &'static str,
    keystroke: usize,
    headings: usize,
    footnotes: usize,
    degraded: usize,
}

impl RenderEvent {
    fn new(kind: &'static str, keystroke: usize, tree: &RenderTree) -> Self {
        Self {
            kind,
            keystroke,
            headings: tree.summary.outline.len(),
            footnotes: tree.summary.footnotes.len(),
            degraded: tree.summary.degraded_stages.len(),
        }
    }
}

async fn run_type(
    pipeline: Arc<RenderPipeline>,
    policy: SchedulePolicy,
    args: TypeArgs,
) -> Result<(), AppError> {
    if args.chunk == 0 {
        return Err(AppError::validation("--chunk must be greater than zero"));
    }

    let text = read_note(args.path.as_deref()).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = RenderScheduler::new(pipeline, policy, tx);
    let interval = Duration::from_millis(args.interval_ms);

    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(index, _)| index)
        .step_by(args.chunk)
        .skip(1)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut last_deferred = false;
    let mut deferred_calls = 0usize;
    for (keystroke, end) in boundaries.iter().enumerate() {
        match scheduler.render_with_policy(&text[..*end], false) {
            Scheduled::Rendered(tree) => {
                last_deferred = false;
                write_event(&RenderEvent::new("immediate", keystroke, &tree)).await?;
            }
            Scheduled::Deferred { .. } => {
                last_deferred = true;
                deferred_calls += 1;
            }
        }

        while let Ok(tree) = rx.try_recv() {
            write_event(&RenderEvent::new("deferred", keystroke, &tree)).await?;
        }

        tokio::time::sleep(interval).await;
    }

    let keystrokes = boundaries.len();
    if last_deferred {
        while let Some(tree) = rx.recv().await {
            write_event(&RenderEvent::new("deferred", keystrokes, &tree)).await?;
            if !scheduler.is_pending() && rx.is_empty() {
                break;
            }
        }
    }

    debug!(keystrokes, deferred_calls, "keystroke replay finished");
    Ok(())
}

async fn write_event(event: &RenderEvent) -> Result<(), AppError> {
    let line = serde_json::to_string(event)
        .map_err(|err| AppError::unexpected(format!("failed to encode event: {err}")))?;
    write_stdout(&line).await
}

async fn read_note(path: Option<&Path>) -> Result<String, AppError> {
    let text = match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(InfraError::from)?,
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .map_err(InfraError::from)?;
            text
        }
    };
    Ok(text)
}

async fn write_stdout(output: &str) -> Result<(), AppError> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(output.as_bytes())
        .await
        .map_err(InfraError::from)?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n").await.map_err(InfraError::from)?;
    }
    stdout.flush().await.map_err(InfraError::from)?;
    Ok(())
}
