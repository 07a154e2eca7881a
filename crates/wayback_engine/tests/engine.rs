mod common;

use std::sync::mpsc::{RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use wayback_engine::{
    terminal_event, EngineEvent, EngineHandle, EventSink, FailureKind, FetchError, FetchSummary,
    Fetcher, ReqwestFetcher, StreamEvent,
};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{test_settings, RecordingPacer};

/// Emits two lines derived from the URL and succeeds.
struct ScriptedFetcher;

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        _cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<FetchSummary, FetchError> {
        sink.emit(StreamEvent::Line(format!("{url}-1")));
        tokio::time::sleep(Duration::from_millis(20)).await;
        sink.emit(StreamEvent::Line(format!("{url}-2")));
        let result = Ok(FetchSummary {
            total_lines: 2,
            attempts: 1,
        });
        sink.emit(terminal_event(&result));
        result
    }
}

/// Emits one line, then parks until cancelled.
struct ParkingFetcher;

#[async_trait::async_trait]
impl Fetcher for ParkingFetcher {
    async fn fetch(
        &self,
        _url: &str,
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<FetchSummary, FetchError> {
        sink.emit(StreamEvent::Line("started".to_string()));
        let _ = tokio::time::timeout(Duration::from_secs(5), cancel.cancelled()).await;
        let result = Err(FetchError::cancelled());
        sink.emit(terminal_event(&result));
        result
    }
}

/// Emits one line, then panics.
struct PanickingFetcher;

#[async_trait::async_trait]
impl Fetcher for PanickingFetcher {
    async fn fetch(
        &self,
        url: &str,
        _cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<FetchSummary, FetchError> {
        sink.emit(StreamEvent::Line(format!("{url}-before")));
        panic!("fetcher bug");
    }
}

fn collect_terminal(handle: &EngineHandle, sessions: usize) -> Vec<EngineEvent> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut events = Vec::new();
    let mut finished = 0;
    while finished < sessions && Instant::now() < deadline {
        match handle.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => {
                if event.event.is_terminal() {
                    finished += 1;
                }
                events.push(event);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    events
}

#[test]
fn sessions_run_one_at_a_time_in_order() {
    let handle = EngineHandle::with_fetcher(Arc::new(ScriptedFetcher)).expect("engine");
    handle.start(1, "first");
    handle.start(2, "second");

    let events = collect_terminal(&handle, 2);
    let expected = vec![
        (1, StreamEvent::Line("first-1".into())),
        (1, StreamEvent::Line("first-2".into())),
        (1, StreamEvent::Success { total_lines: 2 }),
        (2, StreamEvent::Line("second-1".into())),
        (2, StreamEvent::Line("second-2".into())),
        (2, StreamEvent::Success { total_lines: 2 }),
    ];
    let actual: Vec<_> = events
        .into_iter()
        .map(|event| (event.session_id, event.event))
        .collect();
    assert_eq!(actual, expected);
}

#[test]
fn cancel_trips_running_session() {
    let handle = EngineHandle::with_fetcher(Arc::new(ParkingFetcher)).expect("engine");
    handle.start(9, "ignored");

    let first = handle
        .recv_timeout(Duration::from_secs(5))
        .expect("first event");
    assert_eq!(first.event, StreamEvent::Line("started".into()));
    assert!(handle.is_busy());

    handle.cancel();
    let events = collect_terminal(&handle, 1);
    assert_eq!(
        events,
        vec![EngineEvent {
            session_id: 9,
            event: StreamEvent::Cancelled,
        }]
    );

    wait_until_idle(&handle);
    assert!(!handle.is_busy());
}

fn wait_until_idle(handle: &EngineHandle) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.is_busy() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn panicking_fetch_fails_the_session_and_engine_keeps_running() {
    let handle = EngineHandle::with_fetcher(Arc::new(PanickingFetcher)).expect("engine");
    handle.start(1, "first");
    handle.start(2, "second");

    let events = collect_terminal(&handle, 2);
    let actual: Vec<_> = events
        .into_iter()
        .map(|event| (event.session_id, event.event))
        .collect();
    let failure = StreamEvent::Failure {
        kind: FailureKind::Internal,
        reason: "fetch task panicked".into(),
    };
    assert_eq!(
        actual,
        vec![
            (1, StreamEvent::Line("first-before".into())),
            (1, failure.clone()),
            (2, StreamEvent::Line("second-before".into())),
            (2, failure),
        ]
    );

    wait_until_idle(&handle);
    assert!(!handle.is_busy());
    assert_eq!(
        handle.recv_timeout(Duration::from_millis(20)),
        Err(RecvTimeoutError::Timeout)
    );
}

#[test]
fn try_recv_is_empty_when_idle() {
    let handle = EngineHandle::with_fetcher(Arc::new(ScriptedFetcher)).expect("engine");
    assert_eq!(handle.try_recv(), Err(TryRecvError::Empty));
    assert!(!handle.is_busy());
}

#[test]
fn events_serialize_as_tagged_json() {
    let event = EngineEvent {
        session_id: 3,
        event: StreamEvent::Retrying {
            attempt: 2,
            delay_ms: 4100,
        },
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "session_id": 3,
            "event": { "type": "retrying", "data": { "attempt": 2, "delay_ms": 4100 } }
        })
    );

    let line = serde_json::to_value(StreamEvent::Line("https://example.com/".into())).unwrap();
    assert_eq!(
        line,
        serde_json::json!({ "type": "line", "data": "https://example.com/" })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn engine_streams_archive_response_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x\ny\n"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::with_pacer(test_settings(), Arc::new(RecordingPacer::default()));
    let handle = EngineHandle::with_fetcher(Arc::new(fetcher)).expect("engine");
    handle.start(1, format!("{}/cdx/search/cdx?url=example.com/*", server.uri()));

    let collector = handle.clone();
    let events = tokio::task::spawn_blocking(move || collect_terminal(&collector, 1))
        .await
        .unwrap();
    let events: Vec<StreamEvent> = events.into_iter().map(|event| event.event).collect();

    assert!(matches!(events[0], StreamEvent::StatusUpdate(_)));
    assert_eq!(
        events[1..].to_vec(),
        vec![
            StreamEvent::Line("x".into()),
            StreamEvent::Line("y".into()),
            StreamEvent::Success { total_lines: 2 },
        ]
    );
}
