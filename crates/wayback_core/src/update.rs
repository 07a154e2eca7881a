use crate::{AppState, Effect, Msg, QueryRequest, SessionState};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::InputChanged(input) => {
            state.set_input(input);
            Vec::new()
        }
        Msg::ModeSelected(mode) => {
            state.set_mode(mode);
            Vec::new()
        }
        Msg::YearsChanged(years) => {
            state.set_years(years);
            Vec::new()
        }
        Msg::FetchClicked => {
            // One session at a time: the previous one must reach a terminal state first.
            if state.session().is_active() {
                return (state, Vec::new());
            }
            match QueryRequest::new(state.input(), state.mode()) {
                Ok(request) => {
                    let url = request.with_years(state.years()).resolve().url;
                    let session_id = state.start_session(url.clone());
                    vec![Effect::StartFetch { session_id, url }]
                }
                Err(err) => {
                    state.set_notice(err.to_string());
                    Vec::new()
                }
            }
        }
        Msg::CancelClicked => {
            if state.session() == SessionState::Running {
                state.request_cancel();
                vec![Effect::CancelFetch]
            } else {
                Vec::new()
            }
        }
        Msg::LineReceived { session_id, line } => {
            if state.accepts(session_id) {
                state.push_line(line);
            }
            Vec::new()
        }
        Msg::StatusReceived {
            session_id,
            message,
        } => {
            if state.accepts(session_id) {
                state.set_status(message);
            }
            Vec::new()
        }
        Msg::RateLimited { session_id } => {
            if state.accepts(session_id) {
                state.record_rate_limited();
            }
            Vec::new()
        }
        Msg::Retrying {
            session_id,
            attempt,
            delay_ms,
        } => {
            if state.accepts(session_id) {
                state.record_retry(attempt, delay_ms);
            }
            Vec::new()
        }
        Msg::SessionFinished {
            session_id,
            outcome,
        } => {
            if state.accepts(session_id) {
                state.finish_session(outcome);
            }
            Vec::new()
        }
        Msg::SaveRequested(path) => {
            if state.session().is_active() {
                state.set_notice("Fetch still running; wait for it to finish before saving");
                Vec::new()
            } else if state.lines().is_empty() {
                state.set_notice("Nothing to save");
                Vec::new()
            } else {
                vec![Effect::SaveOutput {
                    path,
                    lines: state.lines().to_vec(),
                }]
            }
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}
