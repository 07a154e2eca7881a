use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use engine_logging::engine_info;
use serde::{Deserialize, Serialize};
use wayback_engine::{DelayRange, FetchSettings, RetryPolicy};

use super::cli::Cli;

const SETTINGS_FILENAME: &str = "wayback.ron";

/// Tunables read from a RON file. Missing fields keep their defaults and
/// command-line flags win over the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_retries: u32,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub initial_delay_min_ms: u64,
    pub initial_delay_max_ms: u64,
    pub backoff_base: u32,
    pub max_jitter_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            connect_timeout_ms: 45_000,
            read_timeout_ms: 45_000,
            initial_delay_min_ms: 2_000,
            initial_delay_max_ms: 8_000,
            backoff_base: 2,
            max_jitter_ms: 1_000,
        }
    }
}

/// Loads `explicit`, or `./wayback.ron` when no path was given. Only the
/// implicit file may be absent.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Settings> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(SETTINGS_FILENAME), false),
    };

    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => {
            return Ok(Settings::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("reading settings from {}", path.display()))
        }
    };

    let settings: Settings = ron::from_str(&content)
        .with_context(|| format!("parsing settings from {}", path.display()))?;
    engine_info!("Loaded settings from {:?}", path);
    Ok(settings)
}

impl Settings {
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(value) = cli.max_retries {
            self.max_retries = value;
        }
        if let Some(value) = cli.connect_timeout_ms {
            self.connect_timeout_ms = value;
        }
        if let Some(value) = cli.read_timeout_ms {
            self.read_timeout_ms = value;
        }
        if let Some(value) = cli.initial_delay_min_ms {
            self.initial_delay_min_ms = value;
        }
        if let Some(value) = cli.initial_delay_max_ms {
            self.initial_delay_max_ms = value;
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            bail!("invalid settings: timeouts must be greater than zero");
        }
        if self.initial_delay_min_ms > self.initial_delay_max_ms {
            bail!(
                "invalid settings: initial delay minimum {} ms exceeds maximum {} ms",
                self.initial_delay_min_ms,
                self.initial_delay_max_ms
            );
        }
        if self.backoff_base == 0 {
            bail!("invalid settings: backoff_base must be at least 1");
        }
        Ok(())
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                backoff_base: self.backoff_base,
                max_jitter: Duration::from_millis(self.max_jitter_ms),
            },
            initial_delay: DelayRange::from_millis(
                self.initial_delay_min_ms,
                self.initial_delay_max_ms,
            ),
            ..FetchSettings::default()
        }
    }
}
