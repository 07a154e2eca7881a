//! Wayback core: query construction and the pure front-end state machine.
mod effect;
mod msg;
mod query;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::Msg;
pub use query::{
    build_url, normalize_target, sensitive_extension_pattern, QueryError, QueryMode, QueryRequest,
    ResolvedQuery, YearRange, CDX_ENDPOINT, SENSITIVE_EXTENSIONS,
};
pub use state::{AppState, SessionId, SessionOutcome, SessionState};
pub use update::update;
pub use view_model::AppViewModel;
