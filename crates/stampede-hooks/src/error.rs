use thiserror::Error;

/// Errors raised while writing metric points.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The request never reached the time-series database.
    #[error("metrics transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The database answered with a non-success status.
    #[error("metrics write rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

/// Errors raised while installing the global log subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log file appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("failed to install log subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}
