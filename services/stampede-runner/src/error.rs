use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while preparing or launching a run.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The engine or executor process could not be started.
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The configured load engine could not be started.
    #[error(
        "failed to launch load engine `{program}`: {source}; `engine.command` must name an \
         executable accepting --headless -u -r -t --html --csv"
    )]
    Engine {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A run parameter is malformed.
    #[error("invalid run parameter: {0}")]
    InvalidParameter(String),

    /// The sibling executor binary could not be located.
    #[error("executor binary not found at {}", .0.display())]
    ExecutorMissing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] stampede_core::CoreError),
}

/// Errors raised by a single notification channel.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid webhook url: {0}")]
    Url(#[from] url::ParseError),

    #[error("webhook answered with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("invalid attachment content type: {0}")]
    ContentType(#[from] lettre::message::header::ContentTypeErr),

    #[error("failed to build email: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("archive error: {0}")]
    Archive(#[from] std::io::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;
