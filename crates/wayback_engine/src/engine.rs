use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use engine_logging::{engine_debug, engine_error};
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::fetch::{ChannelEventSink, EventSink, FetchSettings, Fetcher, ReqwestFetcher};
use crate::{terminal_event, EngineEvent, FailureKind, FetchError, SessionId};

enum EngineCommand {
    Start {
        session_id: SessionId,
        url: String,
        cancel: CancellationToken,
    },
}

struct ActiveSession {
    session_id: SessionId,
    cancel: CancellationToken,
}

type ActiveSessions = Arc<Mutex<Vec<ActiveSession>>>;

/// Forgets every pending session when the worker thread exits, however it exits.
struct WorkerGuard(ActiveSessions);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        lock(&self.0).clear();
    }
}

/// Owns the worker thread. Sessions are executed one at a time in the order
/// they were started; their events arrive on a single ordered channel.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: Arc<Mutex<mpsc::Receiver<EngineEvent>>>,
    active: ActiveSessions,
}

impl EngineHandle {
    pub fn new(settings: FetchSettings) -> std::io::Result<Self> {
        Self::with_fetcher(Arc::new(ReqwestFetcher::new(settings)))
    }

    pub fn with_fetcher(fetcher: Arc<dyn Fetcher>) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Runtime::new()?;
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let active: ActiveSessions = Arc::new(Mutex::new(Vec::<ActiveSession>::new()));
        let worker_active = active.clone();

        thread::Builder::new()
            .name("wayback-engine".to_string())
            .spawn(move || {
                let _guard = WorkerGuard(worker_active.clone());
                while let Ok(command) = cmd_rx.recv() {
                    match command {
                        EngineCommand::Start {
                            session_id,
                            url,
                            cancel,
                        } => {
                            let sink = ChannelEventSink::new(session_id, event_tx.clone());
                            let run = AssertUnwindSafe(fetcher.fetch(&url, &cancel, &sink));
                            if runtime.block_on(run.catch_unwind()).is_err() {
                                engine_error!("Session {} panicked", session_id);
                                sink.emit(terminal_event(&Err(FetchError::new(
                                    FailureKind::Internal,
                                    "fetch task panicked",
                                ))));
                            }
                            lock(&worker_active).retain(|s| s.session_id != session_id);
                            engine_debug!("Session {} released", session_id);
                        }
                    }
                }
            })?;

        Ok(Self {
            cmd_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
            active,
        })
    }

    pub fn start(&self, session_id: SessionId, url: impl Into<String>) {
        let cancel = CancellationToken::new();
        lock(&self.active).push(ActiveSession {
            session_id,
            cancel: cancel.clone(),
        });
        let command = EngineCommand::Start {
            session_id,
            url: url.into(),
            cancel,
        };
        if self.cmd_tx.send(command).is_err() {
            engine_error!("Engine thread is gone; session {} not started", session_id);
            lock(&self.active).retain(|s| s.session_id != session_id);
        }
    }

    /// Trips the cancellation token of every started, unfinished session.
    pub fn cancel(&self) {
        for session in lock(&self.active).iter() {
            engine_debug!("Cancelling session {}", session.session_id);
            session.cancel.cancel();
        }
    }

    pub fn is_busy(&self) -> bool {
        !lock(&self.active).is_empty()
    }

    /// `Disconnected` means the worker thread is gone and no further events
    /// will arrive.
    pub fn try_recv(&self) -> Result<EngineEvent, TryRecvError> {
        lock(&self.event_rx).try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<EngineEvent, RecvTimeoutError> {
        lock(&self.event_rx).recv_timeout(timeout)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
