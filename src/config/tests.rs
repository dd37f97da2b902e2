use std::io::Write;

use super::*;

#[test]
fn defaults_match_render_defaults() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::WARN);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.render.toc_max_depth, DEFAULT_TOC_MAX_DEPTH);
    assert_eq!(settings.render.raw_html, RawHtmlPolicy::Passthrough);
    assert_eq!(settings.render.link_target.as_deref(), Some("_blank"));
    assert_eq!(
        settings.render.link_rel,
        vec!["nofollow", "noopener", "noreferrer"]
    );
    assert_eq!(settings.scheduler.long_text_threshold, 10_000);
    assert_eq!(
        settings.scheduler.classify_interval,
        Duration::from_millis(1000)
    );
    assert_eq!(settings.scheduler.quiet_window, Duration::from_millis(500));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.render.toc_max_depth = Some(4);

    let overrides = RenderOverrides {
        log_level: Some("debug".to_string()),
        toc_max_depth: Some(2),
        raw_html: Some(RawHtmlPolicy::Sanitize),
        ..Default::default()
    };

    raw.apply_render_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.render.toc_max_depth, 2);
    assert_eq!(settings.render.raw_html, RawHtmlPolicy::Sanitize);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = RenderOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_render_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn rejects_out_of_range_toc_depth() {
    let mut raw = RawSettings::default();
    raw.render.toc_max_depth = Some(7);

    let err = Settings::from_raw(raw).expect_err("invalid depth");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.toc_max_depth",
            ..
        }
    ));
}

#[test]
fn rejects_origin_without_host() {
    let mut raw = RawSettings::default();
    raw.render.origin = Some("mailto:someone@example.com".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid origin");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.origin",
            ..
        }
    ));
}

#[test]
fn rejects_zero_quiet_window() {
    let mut raw = RawSettings::default();
    raw.scheduler.quiet_window_ms = Some(0);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn empty_link_target_disables_it() {
    let mut raw = RawSettings::default();
    raw.render.link_target = Some("  ".to_string());
    raw.render.link_rel = Some(vec![" NoOpener ".to_string(), String::new()]);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.render.link_target, None);
    assert_eq!(settings.render.link_rel, vec!["noopener"]);
}

#[test]
fn loads_config_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        "[render]\ntoc_max_depth = 3\nraw_html = \"omit\"\norigin = \"https://notes.example.com\"\n\n[scheduler]\nquiet_window_ms = 250\nclassify_interval_ms = 0"
    )
    .expect("write config");

    let args = CliArgs::parse_from([
        "append-editor",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "render",
    ]);
    let settings = load(&args).expect("settings");

    assert_eq!(settings.render.toc_max_depth, 3);
    assert_eq!(settings.render.raw_html, RawHtmlPolicy::Omit);
    assert_eq!(
        settings.render.origin.as_ref().and_then(Url::host_str),
        Some("notes.example.com")
    );
    assert_eq!(settings.scheduler.quiet_window, Duration::from_millis(250));
    assert_eq!(settings.scheduler.classify_interval, Duration::ZERO);
}

#[test]
fn parse_render_arguments() {
    let args = CliArgs::parse_from([
        "append-editor",
        "render",
        "--format",
        "json",
        "--bypass",
        "--raw-html",
        "sanitize",
        "note.md",
    ]);

    match args.command.expect("render command") {
        Command::Render(render) => {
            assert_eq!(render.format, OutputFormat::Json);
            assert!(render.bypass);
            assert_eq!(render.overrides.raw_html, Some(RawHtmlPolicy::Sanitize));
            assert_eq!(render.path.as_deref(), Some(std::path::Path::new("note.md")));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_type_arguments() {
    let args = CliArgs::parse_from([
        "append-editor",
        "type",
        "--chunk",
        "16",
        "--interval-ms",
        "5",
        "--quiet-window-ms",
        "100",
    ]);

    match args.command.expect("type command") {
        Command::Type(replay) => {
            assert_eq!(replay.chunk, 16);
            assert_eq!(replay.interval_ms, 5);
            assert_eq!(replay.overrides.quiet_window_ms, Some(100));
            assert!(replay.path.is_none());
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn default_to_render_command() {
    let args = CliArgs::parse_from(["append-editor"]);
    let command = args
        .command
        .unwrap_or(Command::Render(Box::<RenderArgs>::default()));
    assert!(matches!(command, Command::Render(_)));
}
