//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use grabkit::ProxyType;
use grabkit::spider::{DEFAULT_NETWORK_TRY_LIMIT, DEFAULT_THREAD_NUMBER};

/// Crawl URLs with the grabkit spider engine.
///
/// Every URL is fetched as an `initial` task; failures are retried up to the
/// network try limit and counted in the statistics printed at the end.
#[derive(Parser, Debug)]
#[command(name = "grabkit")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to fetch (read from stdin when omitted)
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum concurrent requests (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_THREAD_NUMBER as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Network attempts per URL (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_NETWORK_TRY_LIMIT as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub network_try_limit: u8,

    /// Total time limit per request in seconds
    #[arg(short = 't', long, value_parser = parse_seconds)]
    pub timeout: Option<Duration>,

    /// Connect time limit in seconds
    #[arg(long, value_parser = parse_seconds)]
    pub connect_timeout: Option<Duration>,

    /// Proxy address as host:port
    #[arg(long)]
    pub proxy: Option<String>,

    /// Proxy credentials as user:password
    #[arg(long, requires = "proxy")]
    pub proxy_userpwd: Option<String>,

    /// Proxy protocol: http, https or socks5
    #[arg(long, requires = "proxy")]
    pub proxy_type: Option<ProxyType>,

    /// Netscape cookie file loaded before each request
    #[arg(long)]
    pub cookiefile: Option<PathBuf>,

    /// User-Agent header value
    #[arg(long, conflicts_with = "user_agent_file")]
    pub user_agent: Option<String>,

    /// File with one User-Agent per line, one is picked at random
    #[arg(long)]
    pub user_agent_file: Option<PathBuf>,

    /// Request options as JSON, overridden by the flags above
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Do not follow redirects
    #[arg(long)]
    pub no_follow: bool,

    /// Save every fetched body under this directory at a hash-derived path
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,
}

/// Parses a non-negative number of seconds, fractions allowed.
fn parse_seconds(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("invalid number of seconds {raw:?}: {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid number of seconds {raw:?}: {e}"))
}
