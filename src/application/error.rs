use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::render::{PipelineConfigError, RenderConfigError},
    config::LoadError,
    infra::error::InfraError,
};

/// Error message chain captured for logging, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration")]
    Config(#[from] LoadError),
    #[error("failed to configure render pipeline")]
    Render(#[from] RenderConfigError),
    #[error("render pipeline unavailable")]
    Pipeline(#[from] PipelineConfigError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }

    /// Process exit code: 2 for bad input or configuration, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Render(_) | AppError::Validation(_) => 2,
            AppError::Pipeline(_)
            | AppError::Infra(InfraError::Io(_))
            | AppError::Infra(InfraError::Telemetry(_))
            | AppError::Unexpected(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_walks_source_chain() {
        let error = AppError::from(LoadError::Invalid {
            key: "render.toc_max_depth",
            reason: "must be between 1 and 6".to_string(),
        });

        let report = error.report();
        assert_eq!(
            report.messages,
            vec![
                "failed to load configuration".to_string(),
                "invalid configuration for `render.toc_max_depth`: must be between 1 and 6"
                    .to_string(),
            ]
        );
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn io_failures_exit_with_one() {
        let error = AppError::from(InfraError::from(std::io::Error::other("disk gone")));
        assert_eq!(error.exit_code(), 1);
        assert_eq!(error.report().messages[0], "io error: disk gone");
    }
}
