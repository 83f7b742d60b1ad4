//! Error types shared by the codec, builders and relay session.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use crate::nip19::CodecError;

/// Everything that can go wrong while building or exchanging a message.
#[derive(Error, Debug)]
pub enum Error {
    /// A NIP-19 identifier could not be decoded or encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A required identifier or field is absent for the requested intent.
    #[error("missing target: {0}")]
    MissingTarget(String),

    /// Content or file body required by the intent is absent.
    #[error("missing content: {0}")]
    MissingContent(String),

    /// Signing was requested without a private key.
    #[error("no private key available for signing")]
    SigningUnavailable,

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// A raw protocol message did not have the expected shape.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid relay url: {0}")]
    InvalidRelay(String),

    /// Transport-level failure talking to the relay.
    #[error("network error: {0}")]
    Network(String),

    /// The relay did not finish the exchange before the deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Codec(_) => "CodecError",
            Error::MissingTarget(_) => "MissingTarget",
            Error::MissingContent(_) => "MissingContent",
            Error::SigningUnavailable => "SigningUnavailable",
            Error::InvalidKey(_) => "InvalidKey",
            Error::InvalidEvent(_) => "InvalidEvent",
            Error::InvalidMessage(_) => "InvalidMessage",
            Error::InvalidRelay(_) => "InvalidRelay",
            Error::Network(_) => "NetworkError",
            Error::Timeout(_) => "Timeout",
            Error::Config(_) => "ConfigError",
            Error::Json(_) => "JsonError",
            Error::Io(_) => "IoError",
        }
    }

    /// Render the error as the JSON object printed on stdout.
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl From<tokio_socks::Error> for Error {
    fn from(e: tokio_socks::Error) -> Self {
        Error::Network(e.to_string())
    }
}
