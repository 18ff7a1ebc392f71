use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("remote api error: {0}")]
    RemoteApi(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("booking failed: {0}")]
    Booking(String),

    #[error("giving up after {0} attempts")]
    RetriesExhausted(u32),
}

impl Error {
    /// Whether the top-level driver should start another attempt. Broken
    /// configuration never fixes itself, so it terminates immediately.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Config(_) | Error::RetriesExhausted(_))
    }
}
