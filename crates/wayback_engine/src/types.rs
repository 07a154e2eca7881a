use std::fmt;

use serde::Serialize;

pub type SessionId = u64;

/// One event of a fetch session, in the order the worker produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Line(String),
    StatusUpdate(String),
    RateLimited,
    Retrying { attempt: u32, delay_ms: u64 },
    Success { total_lines: u64 },
    Failure { kind: FailureKind, reason: String },
    Cancelled,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Success { .. } | StreamEvent::Failure { .. } | StreamEvent::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineEvent {
    pub session_id: SessionId,
    pub event: StreamEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSummary {
    pub total_lines: u64,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "cancelled")
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    Timeout,
    ConnectionFailed,
    RateLimited,
    DecodeError,
    HttpError(u16),
    RetriesExhausted,
    Io,
    /// The fetch task panicked.
    Internal,
    /// User-initiated stop. Terminal, but not reported as a failure.
    Cancelled,
}

impl FailureKind {
    /// Transient kinds are retried; everything else ends the session.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            FailureKind::Timeout
                | FailureKind::ConnectionFailed
                | FailureKind::RateLimited
                | FailureKind::DecodeError
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidInput => write!(f, "invalid input"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::ConnectionFailed => write!(f, "connection failed"),
            FailureKind::RateLimited => write!(f, "rate limited"),
            FailureKind::DecodeError => write!(f, "decode error"),
            FailureKind::HttpError(code) => write!(f, "http error {code}"),
            FailureKind::RetriesExhausted => write!(f, "retries exhausted"),
            FailureKind::Io => write!(f, "i/o error"),
            FailureKind::Internal => write!(f, "internal error"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Maps the result of a session onto the event that closes it.
pub fn terminal_event(result: &Result<FetchSummary, FetchError>) -> StreamEvent {
    match result {
        Ok(summary) => StreamEvent::Success {
            total_lines: summary.total_lines,
        },
        Err(err) if err.kind == FailureKind::Cancelled => StreamEvent::Cancelled,
        Err(err) => StreamEvent::Failure {
            kind: err.kind,
            reason: err.message.clone(),
        },
    }
}
