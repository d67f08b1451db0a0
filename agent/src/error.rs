use presence_common::{ConfigError, UnknownMode};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("remote API error: {0}")]
    Remote(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("precondition violated: {0}")]
    Precondition(&'static str),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<UnknownMode> for Error {
    fn from(err: UnknownMode) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
