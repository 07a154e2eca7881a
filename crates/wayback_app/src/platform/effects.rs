use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use engine_logging::{engine_error, engine_info, engine_warn};
use wayback_core::{Effect, Msg, SessionOutcome};
use wayback_engine::{save_lines, EngineEvent, EngineHandle, FetchSettings, StreamEvent};

/// Everything the main loop reacts to, merged onto one channel.
#[derive(Debug)]
pub enum Inbound {
    Engine(EngineEvent),
    /// The engine thread is gone; no more events will arrive.
    EngineStopped,
    Interrupt,
}

/// Results of effects that complete synchronously.
#[derive(Debug, PartialEq, Eq)]
pub enum EffectReport {
    Saved { path: PathBuf, lines: usize },
    SaveFailed(String),
}

pub struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub fn new(settings: FetchSettings, inbound_tx: mpsc::Sender<Inbound>) -> anyhow::Result<Self> {
        let engine = EngineHandle::new(settings).context("starting the fetch engine")?;
        let runner = Self { engine };
        runner.spawn_event_loop(inbound_tx);
        Ok(runner)
    }

    pub fn enqueue(&self, effects: Vec<Effect>) -> Vec<EffectReport> {
        let mut reports = Vec::new();
        for effect in effects {
            match effect {
                Effect::StartFetch { session_id, url } => {
                    engine_info!("StartFetch session_id={} url={}", session_id, url);
                    self.engine.start(session_id, url);
                }
                Effect::CancelFetch => {
                    self.engine.cancel();
                }
                Effect::SaveOutput { path, lines } => match save_lines(&path, lines.as_slice()) {
                    Ok(saved) => {
                        engine_info!("Saved {} lines to {:?}", lines.len(), saved);
                        reports.push(EffectReport::Saved {
                            path: saved,
                            lines: lines.len(),
                        });
                    }
                    Err(err) => {
                        engine_error!("Failed to save output to {:?}: {}", path, err);
                        reports.push(EffectReport::SaveFailed(format!(
                            "Could not save to {}: {err}",
                            path.display()
                        )));
                    }
                },
            }
        }
        reports
    }

    fn spawn_event_loop(&self, inbound_tx: mpsc::Sender<Inbound>) {
        let engine = self.engine.clone();
        thread::spawn(move || loop {
            match engine.recv_timeout(Duration::from_millis(50)) {
                Ok(event) => {
                    if inbound_tx.send(Inbound::Engine(event)).is_err() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    engine_error!("Engine event channel closed");
                    let _ = inbound_tx.send(Inbound::EngineStopped);
                    break;
                }
            }
        });
    }
}

/// Engine events in core vocabulary.
pub fn map_event(event: EngineEvent) -> Msg {
    let session_id = event.session_id;
    match event.event {
        StreamEvent::Line(line) => Msg::LineReceived { session_id, line },
        StreamEvent::StatusUpdate(message) => Msg::StatusReceived {
            session_id,
            message,
        },
        StreamEvent::RateLimited => Msg::RateLimited { session_id },
        StreamEvent::Retrying { attempt, delay_ms } => Msg::Retrying {
            session_id,
            attempt,
            delay_ms,
        },
        StreamEvent::Success { total_lines } => Msg::SessionFinished {
            session_id,
            outcome: SessionOutcome::Success { total_lines },
        },
        StreamEvent::Failure { kind, reason } => {
            engine_warn!("Session {} failed ({}): {}", session_id, kind, reason);
            Msg::SessionFinished {
                session_id,
                outcome: SessionOutcome::Failed {
                    kind: kind.to_string(),
                    reason,
                },
            }
        }
        StreamEvent::Cancelled => Msg::SessionFinished {
            session_id,
            outcome: SessionOutcome::Cancelled,
        },
    }
}
