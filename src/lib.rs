//! Markdown rendering core of the Append Editor.
//!
//! The [`application::render`] module holds the fixed render pipeline and the
//! keystroke-aware scheduler in front of it; [`config`] and [`infra`] carry
//! the settings and logging bootstrap used by the `append-editor` binary.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
