use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded {status}: {message}")]
    Server { status: u16, message: String },

    #[error("{0}")]
    Ballotbox(#[from] ballotbox::Error),

    #[error("unexpected response: {0}")]
    Response(#[from] serde_json::Error),
}
