use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use proxy_sift::{
    config::{CheckerConfig, ConfigOverrides, FileConfig, DEFAULT_CONFIG_FILE},
    output::write_atomic,
    progress::ProgressReporter,
    proxy::{AggregateState, ProxyScheme, ResultAggregator, StatusRule},
    runner,
    tui::ProxyCheckerApp,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// A bounded-concurrency proxy list checker
#[derive(Parser)]
#[command(name = "proxy-sift", version)]
#[command(about = "Fetch proxy lists and keep the proxies that work")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (JSON, `proxyApiUrls` plus optional tunables)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all sources, check every proxy and write the working ones
    Check(CheckArgs),
    /// Fetch all sources and write the deduplicated backlog without checking
    Fetch {
        #[command(flatten)]
        sources: SourceArgs,
        /// Output file for the backlog (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Default)]
struct SourceArgs {
    /// Proxy list URL or file; replaces the config file's list (repeatable)
    #[arg(short = 's', long = "source")]
    sources: Vec<String>,
    /// Rewrite socks4:// and socks5:// entries to this scheme
    #[arg(long)]
    rewrite_socks_to: Option<ProxyScheme>,
    /// Scheme to prefix entries that have none
    #[arg(long)]
    default_scheme: Option<ProxyScheme>,
}

#[derive(Args)]
struct CheckArgs {
    #[command(flatten)]
    sources: SourceArgs,
    /// Output file for working proxies
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Output file for failed proxies with their last failure
    #[arg(long)]
    failed_output: Option<PathBuf>,
    /// Number of proxies checked concurrently
    #[arg(short = 'n', long)]
    capacity: Option<usize>,
    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Attempts per proxy, the first one included
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Progress refresh interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,
    /// URL to request through each proxy (repeatable, checked in order)
    #[arg(long = "test-url")]
    test_urls: Vec<String>,
    /// Accepted status: a code such as 200, or 2xx
    #[arg(long)]
    accepted_status: Option<StatusRule>,
    /// Only keep proxies reporting this country code
    #[arg(long)]
    country: Option<String>,
    /// MMDB file used when the test target reports no location
    #[arg(long)]
    mmdb: Option<PathBuf>,
    /// Append the location to each working proxy line
    #[arg(long)]
    annotate: bool,
    /// Show the interactive dashboard instead of a progress line
    #[arg(long)]
    tui: bool,
}

impl CheckArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            sources: self.sources.sources.clone(),
            timeout_ms: self.timeout_ms,
            max_attempts: self.max_attempts,
            capacity: self.capacity,
            poll_interval_ms: self.poll_interval_ms,
            test_targets: self.test_urls.clone(),
            accepted_status: self.accepted_status,
            required_country: self.country.clone(),
            rewrite_socks_to: self.sources.rewrite_socks_to,
            default_scheme: self.sources.default_scheme,
            output: self.output.clone(),
            failed_output: self.failed_output.clone(),
            mmdb_path: self.mmdb.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Check(args) => {
            let config = load_config(&cli.config, args.overrides())?;
            check(config, args.annotate, args.tui).await
        }
        Commands::Fetch { sources, output } => {
            let overrides = ConfigOverrides {
                sources: sources.sources,
                rewrite_socks_to: sources.rewrite_socks_to,
                default_scheme: sources.default_scheme,
                ..Default::default()
            };
            let config = load_config(&cli.config, overrides)?;
            let backlog = runner::ingest(&config)
                .await
                .context("failed to load proxy lists")?;

            let content = backlog
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            match output {
                Some(path) => {
                    write_atomic(&path, &content)?;
                    println!("Saved {} proxies to {}", backlog.len(), path.display());
                }
                None => println!("{content}"),
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

/// A missing config file is fine when the command line names the sources
fn load_config(path: &Path, overrides: ConfigOverrides) -> Result<CheckerConfig> {
    let file = if path.exists() || overrides.sources.is_empty() {
        FileConfig::load(path)?
    } else {
        FileConfig::default()
    };
    Ok(CheckerConfig::resolve(file, overrides)?)
}

async fn check(config: CheckerConfig, annotate: bool, tui: bool) -> Result<()> {
    let backlog = runner::ingest(&config).await.map_err(|e| {
        error!(error = %e, "ingestion failed, nothing was checked");
        e
    })?;
    println!(
        "Loaded {} proxies, checking {} at a time\n",
        backlog.len(),
        config.capacity
    );

    let aggregator = Arc::new(ResultAggregator::new());
    let cancel = CancellationToken::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight checks");
            ctrl_c.cancel();
        }
    });

    let state = if tui {
        let done = CancellationToken::new();
        let mut app = ProxyCheckerApp::new(
            Arc::clone(&aggregator),
            cancel.clone(),
            done.clone(),
            config.poll_interval,
        );
        runner::check_with_dashboard(&config, backlog, aggregator, cancel, done, app.run())
            .await
            .context("check task failed")?
    } else {
        let reporter = ProgressReporter::spawn(Arc::clone(&aggregator), config.poll_interval);
        let state = runner::check(&config, backlog, aggregator, cancel).await;
        reporter.finish().await;
        state
    };

    print_summary(&state);

    runner::persist(&config, &state, annotate).map_err(|e| {
        error!(error = %e, "results could not be saved");
        e
    })?;
    println!(
        "Found {} working proxies. Saved to {}",
        state.working_count(),
        config.output.display()
    );
    info!("done");
    Ok(())
}

fn print_summary(state: &AggregateState) {
    println!(
        "\nChecked {}/{} proxies: {} working, {} failed",
        state.completed_count,
        state.total_queued,
        state.working_count(),
        state.failed_count()
    );
    if state.skipped > 0 {
        println!("Skipped {} proxies after cancellation", state.skipped);
    }
    for (kind, count) in state.failure_breakdown() {
        println!("  {kind}: {count}");
    }
}
