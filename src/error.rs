use thiserror::Error;

/// Errors surfaced by a streaming transcription session.
///
/// Connection problems are synchronous and fatal; mid-stream transport
/// failures are delivered once through the session's error callback.
/// The normalization stages are total functions and have no error type.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Invalid session state: {0}")]
    InvalidState(&'static str),
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}
