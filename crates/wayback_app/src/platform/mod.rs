//! Terminal front-end: drives the core state machine and the fetch engine.
mod app;
mod cli;
mod config;
mod effects;
mod logging;
mod render;

pub use app::run_app;
