//! Maps the `--log` choice onto an `engine_logging` destination.

use std::path::PathBuf;

use engine_logging::{LevelFilter, LogDestination, DEFAULT_LOG_FILE};

use super::cli::LogArg;

pub fn initialize(choice: LogArg, verbose: bool) {
    let Some(destination) = destination_for(choice) else {
        return;
    };
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if !engine_logging::initialize(destination, level) {
        eprintln!("Warning: logging could not be initialized");
    }
}

fn destination_for(choice: LogArg) -> Option<LogDestination> {
    match choice {
        LogArg::File => Some(LogDestination::default()),
        LogArg::Terminal => Some(LogDestination::Terminal),
        LogArg::Both => Some(LogDestination::Both(PathBuf::from(DEFAULT_LOG_FILE))),
        LogArg::Off => None,
    }
}
