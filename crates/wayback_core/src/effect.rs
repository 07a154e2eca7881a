use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start a fetch session against the resolved URL.
    StartFetch { session_id: crate::SessionId, url: String },
    /// Trip the cancellation token of the running session.
    CancelFetch,
    /// Persist the accumulated lines, one per line, in arrival order.
    SaveOutput { path: PathBuf, lines: Vec<String> },
}
