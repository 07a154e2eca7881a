use crate::view_model::AppViewModel;
use crate::{QueryMode, YearRange};

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    /// Cancellation requested; waiting for the engine to confirm.
    Cancelling,
    Finished,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Running | SessionState::Cancelling)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Success { total_lines: u64 },
    /// `kind` is the engine's failure classification, e.g. `retries exhausted`.
    Failed { kind: String, reason: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    input: String,
    mode: QueryMode,
    years: YearRange,
    session: SessionState,
    current_session: Option<SessionId>,
    next_session_id: SessionId,
    target_url: Option<String>,
    lines: Vec<String>,
    status: Option<String>,
    notice: Option<String>,
    rate_limited_count: u32,
    retry_attempt: u32,
    outcome: Option<SessionOutcome>,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            session: self.session,
            mode: self.mode,
            target_url: self.target_url.clone(),
            line_count: self.lines.len(),
            status: self.status.clone(),
            notice: self.notice.clone(),
            rate_limited_count: self.rate_limited_count,
            retry_attempt: self.retry_attempt,
            outcome: self.outcome.clone(),
            dirty: self.dirty,
        }
    }

    /// Returns whether the state changed since the last call and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.current_session
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines received after the first `cursor` ones; empty when the cursor is
    /// past the end (e.g. after a new session reset the buffer).
    pub fn lines_since(&self, cursor: usize) -> &[String] {
        self.lines.get(cursor..).unwrap_or(&[])
    }

    pub(crate) fn input(&self) -> &str {
        &self.input
    }

    pub(crate) fn mode(&self) -> QueryMode {
        self.mode
    }

    pub(crate) fn years(&self) -> YearRange {
        self.years
    }

    pub(crate) fn set_input(&mut self, input: String) {
        self.input = input;
        self.notice = None;
        self.mark_dirty();
    }

    pub(crate) fn set_mode(&mut self, mode: QueryMode) {
        self.mode = mode;
        self.mark_dirty();
    }

    pub(crate) fn set_years(&mut self, years: YearRange) {
        self.years = years;
        self.mark_dirty();
    }

    pub(crate) fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
        self.mark_dirty();
    }

    pub(crate) fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
        self.mark_dirty();
    }

    /// Resets per-session output and returns the id of the new session.
    pub(crate) fn start_session(&mut self, url: String) -> SessionId {
        self.next_session_id += 1;
        let session_id = self.next_session_id;
        self.current_session = Some(session_id);
        self.session = SessionState::Running;
        self.target_url = Some(url);
        self.lines.clear();
        self.status = None;
        self.notice = None;
        self.rate_limited_count = 0;
        self.retry_attempt = 0;
        self.outcome = None;
        self.mark_dirty();
        session_id
    }

    pub(crate) fn request_cancel(&mut self) {
        self.session = SessionState::Cancelling;
        self.set_status("Cancelling...");
    }

    /// Whether an engine event for `session_id` belongs to the live session.
    pub(crate) fn accepts(&self, session_id: SessionId) -> bool {
        self.session.is_active() && self.current_session == Some(session_id)
    }

    pub(crate) fn push_line(&mut self, line: String) {
        self.lines.push(line);
        self.mark_dirty();
    }

    pub(crate) fn record_rate_limited(&mut self) {
        self.rate_limited_count += 1;
        self.set_status("Rate limited by the archive (HTTP 429)");
    }

    pub(crate) fn record_retry(&mut self, attempt: u32, delay_ms: u64) {
        self.retry_attempt = attempt;
        self.set_status(format!("Retry {attempt} in {delay_ms} ms"));
    }

    pub(crate) fn finish_session(&mut self, outcome: SessionOutcome) {
        let status = match &outcome {
            SessionOutcome::Success { total_lines } => {
                format!("Done. Stream terminated after {total_lines} lines.")
            }
            SessionOutcome::Failed { kind, reason } => {
                format!("Probe failed ({kind}): {reason}")
            }
            SessionOutcome::Cancelled => "Cancelled.".to_string(),
        };
        self.session = SessionState::Finished;
        self.outcome = Some(outcome);
        self.set_status(status);
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}
