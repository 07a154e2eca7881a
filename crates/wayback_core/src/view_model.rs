use crate::{QueryMode, SessionOutcome, SessionState};

/// Snapshot of everything the front-end renders apart from the lines
/// themselves (see [`crate::AppState::lines_since`]).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub session: SessionState,
    pub mode: QueryMode,
    pub target_url: Option<String>,
    pub line_count: usize,
    pub status: Option<String>,
    pub notice: Option<String>,
    pub rate_limited_count: u32,
    pub retry_attempt: u32,
    pub outcome: Option<SessionOutcome>,
    pub dirty: bool,
}

impl AppViewModel {
    pub fn fetch_enabled(&self) -> bool {
        !self.session.is_active()
    }

    pub fn cancel_enabled(&self) -> bool {
        self.session == SessionState::Running
    }
}
