use std::{fmt, io};

use http::status::StatusCode;
use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError as TokioSendError;
use url::ParseError as UrlParseError;

use crate::event::TreeEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ReftreeError {
    #[error("Entry not found: {0}")]
    NotFound(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Version conflict writing entry '{id}' (sent version {expected})")]
    Conflict { id: String, expected: u64 },
    #[error("Invalid field shape: {0}")]
    Validation(String),
    #[error("Reference cycle detected: {0}")]
    CycleDetected(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Custom error: {0}")]
    Custom(String),
}

impl ReftreeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReftreeError::NotFound(_) => StatusCode::NOT_FOUND,
            ReftreeError::Transport(_) => StatusCode::BAD_GATEWAY,
            ReftreeError::Conflict { .. } => StatusCode::CONFLICT,
            ReftreeError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ReftreeError::CycleDetected(_) => StatusCode::LOOP_DETECTED,
            ReftreeError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ReftreeError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ReftreeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ReftreeError::Custom(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Per-item lookup failures that are dropped from a result set rather than aborting it.
    pub fn is_skippable(&self) -> bool {
        matches!(self, ReftreeError::NotFound(_) | ReftreeError::Transport(_))
    }

    /// Classify a non-success response from the content API.
    pub fn from_status(status: StatusCode, context: &str) -> ReftreeError {
        match status {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                ReftreeError::NotFound(format!("{context}: {status}"))
            }
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
                ReftreeError::Validation(format!("{context}: {status}"))
            }
            _ => ReftreeError::Transport(format!("{context}: {status}")),
        }
    }
}

impl From<toml::de::Error> for ReftreeError {
    fn from(src: toml::de::Error) -> ReftreeError {
        ReftreeError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for ReftreeError {
    fn from(src: toml::ser::Error) -> ReftreeError {
        ReftreeError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for ReftreeError {
    fn from(src: JsonError) -> ReftreeError {
        ReftreeError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for ReftreeError {
    fn from(src: UrlParseError) -> ReftreeError {
        ReftreeError::Config(format!("Invalid URL: {src}"))
    }
}

impl From<io::Error> for ReftreeError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => ReftreeError::NotFound(format!("{x}")),
            _ => ReftreeError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for ReftreeError {
    fn from(x: fmt::Error) -> Self {
        ReftreeError::Custom(format!("{x}"))
    }
}

impl From<RegexError> for ReftreeError {
    fn from(x: RegexError) -> Self {
        ReftreeError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<TokioSendError<TreeEvent>> for ReftreeError {
    fn from(x: TokioSendError<TreeEvent>) -> Self {
        ReftreeError::Io(format!(
            "Channel update send Error, could not transmit tree event {}",
            x.0
        ))
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for ReftreeError {
    fn from(x: reqwest::Error) -> Self {
        if let Some(status) = x.status() {
            ReftreeError::from_status(status, "content API")
        } else if x.is_decode() {
            ReftreeError::Serialization(format!("content API response: {x}"))
        } else {
            ReftreeError::Transport(format!("{x}"))
        }
    }
}
