//! Error taxonomy for streaming sessions.
//!
//! Only backend errors and transport failures are user-visible. Malformed
//! frames are recovered inside the parser and cancellation is not an error.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// A frame payload that could not be decoded. Never escapes the parser.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("unexpected payload type {0:?}")]
    UnexpectedType(String),

    #[error("tool event has an empty tool name")]
    EmptyToolName,
}

/// Failure reported by a [`crate::Transport`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::Http { status, .. } => FailureKind::Http { status: *status },
            TransportError::Timeout(_) => FailureKind::Timeout,
            TransportError::Network(_) => FailureKind::Network,
            TransportError::Other(_) => FailureKind::Protocol,
        }
    }
}

/// Why a stream ended without a terminal frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// No data within the inactivity window, or the request itself timed out.
    Timeout,
    /// The body ended before `done` or `error` was seen.
    ConnectionClosed,
    Http { status: u16 },
    Network,
    Protocol,
}

impl FailureKind {
    /// Whether the user should be told that retrying may help.
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureKind::Timeout | FailureKind::ConnectionClosed | FailureKind::Network => true,
            FailureKind::Http { status } => *status == 429 || *status >= 500,
            FailureKind::Protocol => false,
        }
    }
}

/// Misuse of the session controller API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("request {request_id} is still streaming; cancel it before submitting another")]
    RequestInFlight { request_id: Uuid },
}
