//! Wayback engine: the fetch-and-stream worker and the thread that hosts it.
mod agent;
mod decode;
mod engine;
mod fetch;
mod pacer;
mod persist;
mod retry;
mod types;

pub use agent::{random_user_agent, USER_AGENTS};
pub use decode::{BodyDecoder, ContentEncoding, DecodeError, LineDecoder};
pub use engine::EngineHandle;
pub use fetch::{
    ChannelEventSink, DelayRange, EventSink, FetchSettings, Fetcher, ReqwestFetcher, ARCHIVE_ROOT,
};
pub use pacer::{Pacer, TokioPacer};
pub use persist::{ensure_output_dir, save_lines, AtomicFileWriter, PersistError};
pub use retry::{RetryDecision, RetryPolicy};
pub use types::{
    terminal_event, EngineEvent, FailureKind, FetchError, FetchSummary, SessionId, StreamEvent,
};
