use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User edited the domain/URL input.
    InputChanged(String),
    /// User picked a query mode.
    ModeSelected(crate::QueryMode),
    /// User changed the optional capture year bounds.
    YearsChanged(crate::YearRange),
    /// User clicked Fetch.
    FetchClicked,
    /// User asked to stop the running fetch.
    CancelClicked,
    /// Engine delivered a record line.
    LineReceived {
        session_id: crate::SessionId,
        line: String,
    },
    /// Engine status text (waits, running counts, transient failures).
    StatusReceived {
        session_id: crate::SessionId,
        message: String,
    },
    /// Archive answered 429 Too Many Requests.
    RateLimited { session_id: crate::SessionId },
    /// Engine is backing off before another attempt.
    Retrying {
        session_id: crate::SessionId,
        attempt: u32,
        delay_ms: u64,
    },
    /// Engine reached a terminal state for a session.
    SessionFinished {
        session_id: crate::SessionId,
        outcome: crate::SessionOutcome,
    },
    /// User asked to save the output to a file.
    SaveRequested(PathBuf),
    /// UI/render tick to coalesce rendering.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}
