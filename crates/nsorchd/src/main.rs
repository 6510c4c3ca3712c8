//! nsorchd - namespace network-state reconciliation daemon
//!
//! Reads orchestrator events as newline-delimited JSON and keeps OVN
//! namespace address sets and multicast policy in sync with them.

use anyhow::Context;
use clap::Parser;
use ovn_nb_common::NbctlBackend;
use ovn_nsorchd::config::DEFAULT_CONFIG_PATH;
use ovn_nsorchd::{DispatcherConfig, EventDispatcher, NamespaceOrch, NsorchConfig, ObjectCache, OrchEvent};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// OVN namespace reconciliation daemon
#[derive(Parser, Debug)]
#[command(name = "nsorchd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Event stream (newline-delimited JSON); "-" reads stdin
    #[arg(short = 'e', long, default_value = "-")]
    events: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Number of event workers (overrides the config file)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Enable multicast support (overrides the config file)
    #[arg(long)]
    enable_multicast: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("--- Starting nsorchd ---");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("nsorchd failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();
}

async fn open_events(source: &str) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if source == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(source)
        .await
        .with_context(|| format!("failed to open event stream {}", source))?;
    Ok(Box::new(BufReader::new(file)))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = NsorchConfig::load_or_default(&args.config)?;
    if let Some(workers) = args.workers {
        config.daemon.workers = workers;
    }
    if args.enable_multicast {
        config.namespace.enable_multicast = true;
    }
    config.validate()?;

    info!(
        nbctl = %config.northbound.nbctl_path,
        multicast = config.namespace.enable_multicast,
        workers = config.daemon.workers,
        "Configuration loaded"
    );

    let backend = Arc::new(NbctlBackend::new(config.nbctl_config()));
    let cache = Arc::new(ObjectCache::new());
    let orch = Arc::new(NamespaceOrch::new(
        config.orch_config(),
        backend.clone(),
        backend,
        cache.clone(),
    ));

    if let Err(e) = orch.init_multicast().await {
        error!(error = %e, "Failed to install default multicast deny policy");
    }

    let dispatcher = EventDispatcher::start(
        Arc::clone(&orch),
        cache,
        DispatcherConfig {
            workers: config.daemon.workers,
            queue_depth: config.daemon.queue_depth,
            resync_interval: config.resync_interval(),
        },
    );

    let mut lines = open_events(&args.events).await?.lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut line_no = 0u64;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read event stream")?,
            _ = &mut shutdown => {
                info!("Interrupted, draining queued events");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        line_no += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<OrchEvent>(line) {
            Ok(event) => dispatcher.dispatch(event).await?,
            Err(e) => warn!(line = line_no, error = %e, "Skipping malformed event"),
        }
    }

    dispatcher.shutdown().await;

    let stats = orch.stats();
    info!(stats = %serde_json::to_string(&stats)?, "nsorchd finished");
    Ok(())
}
