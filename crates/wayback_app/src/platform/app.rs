use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, bail};
use clap::Parser;
use engine_logging::{engine_info, engine_warn};
use wayback_core::{update, AppState, Msg, SessionOutcome, SessionState, YearRange};

use super::cli::Cli;
use super::config;
use super::effects::{map_event, EffectReport, EffectRunner, Inbound};
use super::logging;
use super::render::Renderer;

const EXIT_CANCELLED: u8 = 130;

pub fn run_app() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::initialize(cli.log, cli.verbose);

    let settings = config::load(cli.config.as_deref())?.with_overrides(&cli);
    settings.validate()?;
    let years = YearRange::new(cli.from, cli.to)?;

    let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>();
    let runner = EffectRunner::new(settings.fetch_settings(), inbound_tx.clone())?;
    spawn_interrupt_listener(inbound_tx);

    let mut session = Session {
        state: AppState::new(),
        runner,
        renderer: Renderer::new(cli.json),
        save_failed: false,
    };
    for msg in [
        Msg::InputChanged(cli.target.clone()),
        Msg::ModeSelected(cli.mode.into()),
        Msg::YearsChanged(years),
        Msg::FetchClicked,
    ] {
        session.dispatch(msg);
    }
    if session.state.session() != SessionState::Running {
        let view = session.state.view();
        bail!(view
            .notice
            .unwrap_or_else(|| "fetch did not start".to_string()));
    }

    while session.state.session() != SessionState::Finished {
        match inbound_rx.recv() {
            Ok(Inbound::Engine(event)) => {
                session.renderer.engine_event(&event);
                session.dispatch(map_event(event));
            }
            Ok(Inbound::EngineStopped) | Err(_) => {
                return Err(anyhow!("fetch engine stopped unexpectedly"))
            }
            Ok(Inbound::Interrupt) => {
                if session.state.session() == SessionState::Cancelling {
                    engine_warn!("Second interrupt; exiting without waiting for the engine");
                    return Ok(ExitCode::from(EXIT_CANCELLED));
                }
                engine_info!("Interrupt received; cancelling");
                session.dispatch(Msg::CancelClicked);
            }
        }
    }

    if let Some(path) = cli.output {
        session.dispatch(Msg::SaveRequested(path));
    }

    Ok(session.exit_code())
}

struct Session {
    state: AppState,
    runner: EffectRunner,
    renderer: Renderer,
    save_failed: bool,
}

impl Session {
    fn dispatch(&mut self, msg: Msg) {
        let (mut next, effects) = update(std::mem::take(&mut self.state), msg);
        let reports = self.runner.enqueue(effects);
        if next.consume_dirty() {
            self.renderer.render(&next);
        }
        self.renderer.reports(&reports);
        self.save_failed |= reports
            .iter()
            .any(|report| matches!(report, EffectReport::SaveFailed(_)));
        self.state = next;
    }

    fn exit_code(&self) -> ExitCode {
        match self.state.view().outcome {
            Some(SessionOutcome::Cancelled) => ExitCode::from(EXIT_CANCELLED),
            Some(SessionOutcome::Success { .. }) if !self.save_failed => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        }
    }
}

/// Forwards Ctrl-C presses; the listener needs its own small runtime because
/// the engine's runtime lives on the engine thread.
fn spawn_interrupt_listener(inbound_tx: mpsc::Sender<Inbound>) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                engine_warn!("Ctrl-C handling unavailable: {}", err);
                return;
            }
        };
        runtime.block_on(async {
            while tokio::signal::ctrl_c().await.is_ok() {
                if inbound_tx.send(Inbound::Interrupt).is_err() {
                    break;
                }
            }
        });
    });
}
