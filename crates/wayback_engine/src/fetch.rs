use std::ops::RangeInclusive;
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_trace, engine_warn};
use futures_util::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONTENT_ENCODING, REFERER, USER_AGENT,
};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::agent::random_user_agent;
use crate::decode::{BodyDecoder, ContentEncoding, DecodeError, LineDecoder};
use crate::pacer::{Pacer, TokioPacer};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::{
    terminal_event, EngineEvent, FailureKind, FetchError, FetchSummary, SessionId, StreamEvent,
};

/// Sent as `Referer` on roughly half of the attempts.
pub const ARCHIVE_ROOT: &str = "https://web.archive.org/";

const ACCEPT_VALUE: &str = "text/plain,text/html;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";
const ACCEPT_ENCODING_VALUE: &str = "gzip, deflate";

/// Inclusive window a random delay is drawn from, at millisecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const fn from_millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rng.gen_range(min..=max))
    }

    pub fn contains(&self, delay: Duration) -> bool {
        delay >= self.min && delay <= self.max
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
    pub initial_delay: DelayRange,
    /// Lines between two throttle pauses, re-drawn after every pause.
    pub throttle_batch: RangeInclusive<u64>,
    pub throttle_pause: DelayRange,
    /// Emit a running count every this many lines; 0 disables it.
    pub status_every: u64,
    pub referer: String,
    /// Fixed seed for delays, jitter and header rotation. `None` seeds from OS entropy.
    pub rng_seed: Option<u64>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(45),
            read_timeout: Duration::from_secs(45),
            retry: RetryPolicy::default(),
            initial_delay: DelayRange::from_millis(2000, 8000),
            throttle_batch: 20..=30,
            throttle_pause: DelayRange::from_millis(100, 500),
            status_every: 100,
            referer: ARCHIVE_ROOT.to_string(),
            rng_seed: None,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: StreamEvent);
}

/// Tags events with their session and forwards them to the consumer channel.
pub struct ChannelEventSink {
    session_id: SessionId,
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(session_id: SessionId, tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { session_id, tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: StreamEvent) {
        let _ = self.tx.send(EngineEvent {
            session_id: self.session_id,
            event,
        });
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Runs one session to completion. Implementations emit every event of
    /// the session, the terminal one included, before returning.
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<FetchSummary, FetchError>;
}

pub struct ReqwestFetcher {
    settings: FetchSettings,
    pacer: Arc<dyn Pacer>,
    rng: Mutex<StdRng>,
}

struct LineCounter {
    emitted: u64,
    next_pause_at: u64,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self::with_pacer(settings, Arc::new(TokioPacer))
    }

    pub fn with_pacer(settings: FetchSettings, pacer: Arc<dyn Pacer>) -> Self {
        let rng = match settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            settings,
            pacer,
            rng: Mutex::new(rng),
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    fn build_client(&self) -> Result<reqwest::Client, FetchError> {
        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .read_timeout(self.settings.read_timeout)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Io, err.to_string()))
    }

    fn roll<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    fn next_batch(&self) -> u64 {
        let (lo, hi) = (
            *self.settings.throttle_batch.start(),
            *self.settings.throttle_batch.end(),
        );
        let batch = if hi <= lo {
            lo
        } else {
            self.roll(|rng| rng.gen_range(lo..=hi))
        };
        batch.max(1)
    }

    async fn run(
        &self,
        url: &str,
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<FetchSummary, FetchError> {
        let url = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidInput, err.to_string()))?;
        let client = self.build_client()?;

        checkpoint(cancel)?;
        let initial = self.roll(|rng| self.settings.initial_delay.sample(rng));
        sink.emit(StreamEvent::StatusUpdate(format!(
            "Waiting {} ms before the first request",
            initial.as_millis()
        )));
        self.pause(initial, cancel).await?;

        let policy = self.settings.retry;
        let mut attempt = 0u32;
        loop {
            if attempt > 0 {
                checkpoint(cancel)?;
                let delay = self.roll(|rng| policy.backoff(attempt, rng));
                sink.emit(StreamEvent::Retrying {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
                self.pause(delay, cancel).await?;
            }
            checkpoint(cancel)?;

            let err = match self.attempt(&client, &url, attempt, cancel, sink).await {
                Ok(total_lines) => {
                    return Ok(FetchSummary {
                        total_lines,
                        attempts: attempt + 1,
                    })
                }
                Err(err) => err,
            };
            report_transient(&err, attempt, sink);

            match policy.decide(attempt, err.kind) {
                RetryDecision::Retry => attempt += 1,
                RetryDecision::Stop => return Err(err),
                RetryDecision::Exhausted => {
                    return Err(FetchError::new(
                        FailureKind::RetriesExhausted,
                        "retries exhausted",
                    ))
                }
            }
        }
    }

    async fn attempt(
        &self,
        client: &reqwest::Client,
        url: &reqwest::Url,
        attempt: u32,
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<u64, FetchError> {
        let user_agent = self.roll(|rng| random_user_agent(rng));
        let send_referer = self.roll(|rng| rng.gen_bool(0.5));
        engine_info!(
            "Attempt {} GET {} user_agent={:?} referer={}",
            attempt + 1,
            url,
            user_agent,
            send_referer
        );

        let mut request = client
            .get(url.clone())
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, ACCEPT_VALUE)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .header(ACCEPT_ENCODING, ACCEPT_ENCODING_VALUE);
        if send_referer {
            request = request.header(REFERER, self.settings.referer.as_str());
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::new(FailureKind::RateLimited, "HTTP error 429"));
        }
        if status != StatusCode::OK {
            return Err(FetchError::new(
                FailureKind::HttpError(status.as_u16()),
                format!("HTTP error {}", status.as_u16()),
            ));
        }

        let encoding = ContentEncoding::from_header(
            response
                .headers()
                .get(CONTENT_ENCODING)
                .and_then(|value| value.to_str().ok()),
        );
        engine_debug!("Streaming body with content encoding {:?}", encoding);
        self.stream_lines(response, encoding, cancel, sink).await
    }

    async fn stream_lines(
        &self,
        response: reqwest::Response,
        encoding: ContentEncoding,
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<u64, FetchError> {
        let mut decoder = BodyDecoder::new(encoding);
        let mut lines = LineDecoder::new();
        let mut counter = LineCounter {
            emitted: 0,
            next_pause_at: self.next_batch(),
        };

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let plain = decoder.feed(&chunk).map_err(decode_failure)?;
            for line in lines.push(&plain).map_err(decode_failure)? {
                self.emit_line(line, &mut counter, cancel, sink).await?;
            }
        }

        let tail = decoder.finish().map_err(decode_failure)?;
        let mut rest = lines.push(&tail).map_err(decode_failure)?;
        rest.extend(lines.finish().map_err(decode_failure)?);
        for line in rest {
            self.emit_line(line, &mut counter, cancel, sink).await?;
        }
        Ok(counter.emitted)
    }

    async fn emit_line(
        &self,
        line: String,
        counter: &mut LineCounter,
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<(), FetchError> {
        checkpoint(cancel)?;
        sink.emit(StreamEvent::Line(line));
        counter.emitted += 1;

        let every = self.settings.status_every;
        if every > 0 && counter.emitted % every == 0 {
            sink.emit(StreamEvent::StatusUpdate(format!(
                "{} lines fetched so far",
                counter.emitted
            )));
        }

        if counter.emitted >= counter.next_pause_at {
            let pause = self.roll(|rng| self.settings.throttle_pause.sample(rng));
            engine_trace!(
                "Throttling {} ms after {} lines",
                pause.as_millis(),
                counter.emitted
            );
            self.pause(pause, cancel).await?;
            counter.next_pause_at = counter.emitted + self.next_batch();
        }
        Ok(())
    }

    /// Sleeps through the pacer, waking early if the session is cancelled.
    async fn pause(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), FetchError> {
        if !duration.is_zero() {
            tokio::select! {
                _ = self.pacer.sleep(duration) => {}
                _ = cancel.cancelled() => {}
            }
        }
        checkpoint(cancel)
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<FetchSummary, FetchError> {
        engine_info!("Session start url={}", url);
        let result = self.run(url, cancel, sink).await;
        match &result {
            Ok(summary) => engine_info!(
                "Session done: {} lines after {} attempt(s)",
                summary.total_lines,
                summary.attempts
            ),
            Err(err) if err.kind == FailureKind::Cancelled => engine_info!("Session cancelled"),
            Err(err) => engine_warn!("Session failed: {}", err),
        }
        sink.emit(terminal_event(&result));
        result
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), FetchError> {
    if cancel.is_cancelled() {
        Err(FetchError::cancelled())
    } else {
        Ok(())
    }
}

fn report_transient(err: &FetchError, attempt: u32, sink: &dyn EventSink) {
    let number = attempt + 1;
    let notice = match err.kind {
        FailureKind::RateLimited => {
            sink.emit(StreamEvent::RateLimited);
            None
        }
        FailureKind::Timeout => Some(format!("Attempt {number} timed out")),
        FailureKind::ConnectionFailed => {
            Some(format!("Attempt {number}: connection failed ({})", err.message))
        }
        FailureKind::DecodeError => Some(format!(
            "Attempt {number}: response format issue ({})",
            err.message
        )),
        _ => return,
    };
    engine_warn!("Attempt {} failed transiently: {}", number, err);
    if let Some(notice) = notice {
        sink.emit(StreamEvent::StatusUpdate(notice));
    }
}

fn decode_failure(err: DecodeError) -> FetchError {
    FetchError::new(FailureKind::DecodeError, err.to_string())
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_connect() {
        return FetchError::new(FailureKind::ConnectionFailed, err.to_string());
    }
    if err.is_decode() {
        return FetchError::new(FailureKind::DecodeError, err.to_string());
    }
    FetchError::new(FailureKind::Io, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_range_samples_within_bounds() {
        let range = DelayRange::from_millis(2000, 8000);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert!(range.contains(range.sample(&mut rng)));
        }
    }

    #[test]
    fn degenerate_delay_range_returns_min() {
        let range = DelayRange::from_millis(500, 100);
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(range.sample(&mut rng), Duration::from_millis(500));
    }

    #[test]
    fn batch_size_never_zero() {
        let settings = FetchSettings {
            throttle_batch: 0..=0,
            ..FetchSettings::default()
        };
        let fetcher = ReqwestFetcher::new(settings);
        assert_eq!(fetcher.next_batch(), 1);
    }

    #[test]
    fn batch_size_stays_in_window() {
        let settings = FetchSettings {
            rng_seed: Some(11),
            ..FetchSettings::default()
        };
        let fetcher = ReqwestFetcher::new(settings);
        for _ in 0..50 {
            assert!((20..=30).contains(&fetcher.next_batch()));
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = FetchSettings::default();
        assert_eq!(settings.connect_timeout, Duration::from_secs(45));
        assert_eq!(settings.read_timeout, Duration::from_secs(45));
        assert_eq!(settings.retry.max_retries, 3);
        assert_eq!(settings.initial_delay, DelayRange::from_millis(2000, 8000));
        assert_eq!(settings.referer, ARCHIVE_ROOT);
    }
}
