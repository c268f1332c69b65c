use thiserror::Error;

/// Errors produced by the shuttler protocol layer.
#[derive(Debug, Error)]
pub enum ShuttlerError {
    /// The inbound bytes are not a well-formed envelope.
    #[error("codec error: {0}")]
    Codec(String),

    /// The envelope payload does not match the shape required by its kind.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("identity service error: {0}")]
    Identity(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShuttlerError {
    /// Whether this error must end the session it occurred in.
    ///
    /// Only framing and transport failures are fatal; everything else is
    /// reported back to the peer as an internal error response.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShuttlerError::Codec(_) | ShuttlerError::Transport(_))
    }
}

pub type ShuttlerResult<T> = Result<T, ShuttlerError>;
