use thiserror::Error;

/// Errors raised while turning one curl command into a scenario unit.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Unbalanced quotes or a dangling escape.
    #[error("could not split curl command into arguments")]
    Tokenize,

    #[error("curl command has no URL")]
    MissingUrl,

    #[error("option `{0}` expects a value")]
    MissingValue(String),

    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize scenario: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type GenerateResult<T> = Result<T, GenerateError>;
