use thiserror::Error as ThisError;
use tokio_tungstenite::tungstenite;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Submission attempted with an empty file input
    #[error("No file selected")]
    NoFileSelected,

    /// Server answered with a non-success status
    #[error("{status_text}")]
    HttpStatus { status: u16, status_text: String },

    /// Network failure while sending the request or reading the body
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Push channel handshake or frame error
    #[error(transparent)]
    WebSocket(Box<tungstenite::Error>),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A submission of the same kind is still running
    #[error("{operation} already in progress")]
    Busy { operation: &'static str },

    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(err))
    }
}

impl Error {
    /// Text shown to the user in place of the raw error chain.
    pub fn user_message(&self) -> String {
        match self {
            Error::NoFileSelected => "Please select a file to upload.".to_string(),
            Error::HttpStatus { status_text, .. } => status_text.clone(),
            Error::Transport(e) if e.is_timeout() => "Request timed out".to_string(),
            Error::Transport(e) if e.is_connect() => "Failed to connect to server".to_string(),
            Error::Transport(e) => e.to_string(),
            Error::Decode(e) => format!("Malformed response: {e}"),
            Error::WebSocket(e) => e.to_string(),
            Error::InvalidUrl(e) => format!("Invalid URL: {e}"),
            Error::Busy { operation } => format!("{operation} already in progress"),
            Error::Cancelled { operation } => format!("{operation} cancelled"),
            Error::Io(e) => e.to_string(),
            Error::Other(e) => e.to_string(),
        }
    }

    /// Log the error at a level matching its severity.
    pub fn log(&self) {
        match self {
            Error::Transport(_) | Error::Decode(_) | Error::WebSocket(_) | Error::Io(_) | Error::Other(_) => {
                tracing::error!("Error: {:#}", self);
            }
            Error::HttpStatus { status, status_text } => {
                tracing::warn!(status = *status, status_text = %status_text, "Request rejected by server");
            }
            Error::Cancelled { .. } => {
                tracing::info!("{}", self);
            }
            Error::NoFileSelected | Error::Busy { .. } | Error::InvalidUrl(_) => {
                tracing::debug!("Client error: {}", self);
            }
        }
    }
}
