#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wayback_engine::{EventSink, FetchSettings, Pacer, ReqwestFetcher, StreamEvent};

#[derive(Default)]
pub struct TestSink {
    events: Arc<Mutex<Vec<StreamEvent>>>,
}

impl TestSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl EventSink for TestSink {
    fn emit(&self, event: StreamEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Trips `token` as soon as the line `trigger` has been delivered.
pub struct CancelOnLine {
    pub inner: TestSink,
    pub token: CancellationToken,
    pub trigger: String,
}

impl EventSink for CancelOnLine {
    fn emit(&self, event: StreamEvent) {
        let hit = matches!(&event, StreamEvent::Line(line) if *line == self.trigger);
        self.inner.emit(event);
        if hit {
            self.token.cancel();
        }
    }
}

/// Records requested waits and returns immediately.
#[derive(Default)]
pub struct RecordingPacer {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingPacer {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Pacer for RecordingPacer {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

pub fn test_settings() -> FetchSettings {
    FetchSettings {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(2),
        rng_seed: Some(7),
        ..FetchSettings::default()
    }
}

pub fn fetcher(settings: FetchSettings) -> (ReqwestFetcher, Arc<RecordingPacer>) {
    let pacer = Arc::new(RecordingPacer::default());
    (ReqwestFetcher::with_pacer(settings, pacer.clone()), pacer)
}

/// Drops retry delays so event sequences can be compared exactly.
pub fn without_delays(events: Vec<StreamEvent>) -> Vec<StreamEvent> {
    events
        .into_iter()
        .map(|event| match event {
            StreamEvent::Retrying { attempt, .. } => StreamEvent::Retrying {
                attempt,
                delay_ms: 0,
            },
            StreamEvent::StatusUpdate(_) => StreamEvent::StatusUpdate(String::new()),
            other => other,
        })
        .collect()
}

pub fn lines(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Line(line) => Some(line.clone()),
            _ => None,
        })
        .collect()
}

pub fn statuses(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::StatusUpdate(message) => Some(message.clone()),
            _ => None,
        })
        .collect()
}
