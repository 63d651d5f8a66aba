//! CLI entry point for grabkit.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use grabkit::RequestConfig;
use grabkit::spider::{
    Engine, HandlerError, Spider, SpiderConfig, Task, TaskFailure, TaskResult,
};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

/// Fetches the command-line URLs, optionally saving each body.
struct FetchSpider {
    urls: Vec<String>,
    output_dir: Option<PathBuf>,
}

#[async_trait]
impl Spider for FetchSpider {
    fn initial_urls(&self) -> Vec<String> {
        self.urls.clone()
    }

    async fn handle(&self, task: &Task, result: TaskResult) -> Result<Vec<Task>, HandlerError> {
        let Some(document) = result.document else {
            return Ok(Vec::new());
        };
        info!(url = %task.url, status = document.status_code, final_url = %document.url, charset = %document.charset, "fetched");
        if let Some(dir) = &self.output_dir {
            let relative = document.save_hash(&document.url, dir)?;
            info!(url = %task.url, path = %dir.join(relative).display(), "saved");
        }
        Ok(Vec::new())
    }

    async fn task_failed(&self, task: &Task, failure: &TaskFailure) {
        warn!(url = %task.url, counter = %failure.counter_key(), "giving up");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("{default_level},hyper_util=warn,reqwest=warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let urls = collect_urls(&args.urls)?;
    if urls.is_empty() {
        info!("No input provided. Pipe URLs via stdin or pass them as arguments.");
        info!("Example: echo 'https://example.com/' | grabkit");
        return Ok(());
    }

    let request = request_config(&args)?;
    let config = SpiderConfig::default()
        .with_thread_number(usize::from(args.concurrency))
        .with_network_try_limit(u32::from(args.network_try_limit))
        .with_request_config(request);
    let engine = Engine::new(config)?;

    info!(urls = urls.len(), "grabkit starting");
    let spider = Arc::new(FetchSpider {
        urls,
        output_dir: args.output_dir.clone(),
    });
    let stats = engine.run(spider).await?;

    print!("{}", stats.render());
    Ok(())
}

/// URLs from the command line, else one per non-empty stdin line.
fn collect_urls(positional: &[String]) -> Result<Vec<String>> {
    if !positional.is_empty() {
        return Ok(positional.to_vec());
    }
    if io::stdin().is_terminal() {
        return Ok(Vec::new());
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read URLs from stdin")?;
    Ok(buffer
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Base request options: the JSON file if given, then the flags.
fn request_config(args: &Args) -> Result<RequestConfig> {
    let mut config = match &args.config {
        Some(path) => RequestConfig::from_json_file(path)?,
        None => RequestConfig::default(),
    };
    if let Some(timeout) = args.timeout {
        config.timeout = Some(timeout);
    }
    if let Some(connect_timeout) = args.connect_timeout {
        config.connect_timeout = connect_timeout;
    }
    if args.proxy.is_some() {
        config.proxy.clone_from(&args.proxy);
        config.proxy_userpwd.clone_from(&args.proxy_userpwd);
        config.proxy_type = args.proxy_type;
    }
    if args.cookiefile.is_some() {
        config.cookiefile.clone_from(&args.cookiefile);
    }
    if args.user_agent.is_some() {
        config.user_agent.clone_from(&args.user_agent);
    }
    if args.user_agent_file.is_some() {
        config.user_agent_file.clone_from(&args.user_agent_file);
    }
    if args.no_follow {
        config.follow_location = false;
    }
    Ok(config)
}
