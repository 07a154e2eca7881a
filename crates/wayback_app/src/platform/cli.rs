use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use wayback_core::QueryMode;

#[derive(Debug, Parser)]
#[command(
    name = "wayback",
    version,
    about = "Query the Wayback Machine CDX index and stream archived URLs"
)]
pub struct Cli {
    /// Domain or URL to query (a leading http:// or https:// is ignored).
    pub target: String,

    #[arg(short, long, value_enum, default_value_t = ModeArg::Main)]
    pub mode: ModeArg,

    /// Only captures from this year on.
    #[arg(long)]
    pub from: Option<u16>,

    /// Only captures up to this year.
    #[arg(long)]
    pub to: Option<u16>,

    #[arg(long)]
    pub max_retries: Option<u32>,

    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    #[arg(long)]
    pub initial_delay_min_ms: Option<u64>,

    #[arg(long)]
    pub initial_delay_max_ms: Option<u64>,

    /// Save the fetched lines to this file once the session ends.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// RON settings file; defaults to ./wayback.ron when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print every engine event as a JSON object per line instead of raw lines.
    #[arg(long)]
    pub json: bool,

    #[arg(long, value_enum, default_value_t = LogArg::File)]
    pub log: LogArg,

    /// Debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Exact domain, every path.
    Main,
    /// Domain and all subdomains.
    Wildcard,
    /// Everything below a host/path prefix.
    Path,
    /// Wildcard domain, sensitive file extensions only.
    Sensitive,
}

impl From<ModeArg> for QueryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Main => QueryMode::MainDomain,
            ModeArg::Wildcard => QueryMode::WildcardDomain,
            ModeArg::Path => QueryMode::SpecificPath,
            ModeArg::Sensitive => QueryMode::SensitiveExtensions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogArg {
    /// ./wayback.log
    File,
    /// stderr
    Terminal,
    Both,
    Off,
}
