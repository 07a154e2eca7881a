//! Terminal output. Records go to stdout; banner, status and notices go to
//! stderr so the record stream stays pipeable.

use std::io::{self, Write};

use chrono::Local;
use wayback_core::{AppState, AppViewModel, SessionId};
use wayback_engine::EngineEvent;

use super::effects::EffectReport;

pub struct Renderer {
    json: bool,
    session: Option<SessionId>,
    cursor: usize,
    last_status: Option<String>,
    last_notice: Option<String>,
}

impl Renderer {
    /// With `json` set, records are printed as NDJSON engine events by
    /// [`Renderer::engine_event`] instead of as raw lines.
    pub fn new(json: bool) -> Self {
        Self {
            json,
            session: None,
            cursor: 0,
            last_status: None,
            last_notice: None,
        }
    }

    pub fn render(&mut self, state: &AppState) {
        let view = state.view();

        if state.current_session() != self.session {
            self.session = state.current_session();
            self.cursor = 0;
            banner(&view);
        }

        let fresh = state.lines_since(self.cursor);
        if !self.json && !fresh.is_empty() {
            let mut out = io::stdout().lock();
            for line in fresh {
                // A closed pipe (`| head`) is not an error worth reporting.
                let _ = writeln!(out, "{line}");
            }
            let _ = out.flush();
        }
        self.cursor += fresh.len();

        if view.status != self.last_status {
            if let Some(status) = &view.status {
                eprintln!("> {status}");
            }
            self.last_status = view.status;
        }
        if view.notice != self.last_notice {
            if let Some(notice) = &view.notice {
                eprintln!("! {notice}");
            }
            self.last_notice = view.notice;
        }
    }

    pub fn engine_event(&self, event: &EngineEvent) {
        if !self.json {
            return;
        }
        if let Ok(json) = serde_json::to_string(event) {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{json}");
            let _ = out.flush();
        }
    }

    pub fn reports(&self, reports: &[EffectReport]) {
        for report in reports {
            match report {
                EffectReport::Saved { path, lines } => {
                    eprintln!("> Saved {lines} lines to {}", path.display());
                }
                EffectReport::SaveFailed(message) => eprintln!("! {message}"),
            }
        }
    }
}

fn banner(view: &AppViewModel) {
    let Some(url) = &view.target_url else {
        return;
    };
    eprintln!("== Wayback CDX query ({}) ==", view.mode);
    eprintln!("Started: {}", Local::now().to_rfc3339());
    eprintln!("Target: {url}");
}
