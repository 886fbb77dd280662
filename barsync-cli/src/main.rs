//! barsync CLI: scheduled bar downloads and provider utilities.
//!
//! Commands:
//! - `run`: load a config file and download on a fixed schedule
//! - `init`: write the default config file
//! - `find`: list the tickers a provider resolves for a query
//! - `fetch`: print the bars of one window in record-line format
//! - `codes`: save a provider's symbol dictionary

mod logging;

use anyhow::{bail, Context, Result};
use barsync_core::config::{ConfigFile, RunConfig, DEFAULT_CONFIG_FILE};
use barsync_core::data::{
    run_pass, HttpFetcher, LogProgress, ProviderRegistry, RangeBound, Scheduler,
};
use barsync_core::domain::Period;
use clap::{Parser, Subcommand};
use logging::{init_logging, LogFormat};
use serde_json::json;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "barsync",
    version,
    about = "Resumable, chunked market bar downloader"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every configured symbol, repeating every TIMEOUT minutes.
    Run {
        /// Config file (TOML, or JSON with a .json extension).
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Run a single pass regardless of TIMEOUT.
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Write the default configuration file.
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// List the tickers a provider resolves for a query.
    Find {
        /// Provider id, e.g. finam or quotemedia.
        #[arg(long)]
        provider: String,

        /// Provider class, e.g. FinamProvider.
        #[arg(long)]
        class: String,

        query: String,
    },
    /// Print the bars for one symbol and window to stdout.
    Fetch {
        #[arg(long)]
        provider: String,

        #[arg(long)]
        class: String,

        #[arg(long)]
        symbol: String,

        /// D, W, H or a number of minutes.
        #[arg(long, default_value = "D")]
        period: String,

        /// Start bound: date, time, timestamp or a lookback count. Defaults to today.
        #[arg(long, default_value = "")]
        start: String,

        /// End bound: date, time or timestamp. Defaults to now.
        #[arg(long, default_value = "")]
        end: String,
    },
    /// Save the provider's symbol dictionary as `code;id;name;market` lines.
    Codes {
        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value = "finam")]
        provider: String,

        #[arg(long, default_value = "FinamProvider")]
        class: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogFormat::from_env(), "info")?;

    match cli.command {
        Commands::Run { config, once } => run_scheduled(&config, once),
        Commands::Init { config, force } => write_default_config(&config, force),
        Commands::Find {
            provider,
            class,
            query,
        } => find_tickers(&provider, &class, &query),
        Commands::Fetch {
            provider,
            class,
            symbol,
            period,
            start,
            end,
        } => fetch_bars(&provider, &class, &symbol, &period, &start, &end),
        Commands::Codes {
            out,
            provider,
            class,
        } => save_codes(&provider, &class, &out),
    }
}

fn builtin_registry() -> Result<ProviderRegistry> {
    let fetch = HttpFetcher::new().context("building HTTP client")?;
    Ok(ProviderRegistry::builtin(Arc::new(fetch)))
}

fn run_scheduled(config_path: &Path, once: bool) -> Result<()> {
    let config = RunConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let range = config
        .validate(chrono::Local::now().naive_local())
        .with_context(|| format!("invalid range in {}", config_path.display()))?;
    info!(
        %range,
        symbols = config.symbol_count(),
        output = %config.output_dir.display(),
        "configuration loaded"
    );

    let registry = builtin_registry()?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        })
        .context("installing interrupt handler")?;
    }

    let scheduler = if once {
        Scheduler::once(Arc::clone(&stop))
    } else {
        Scheduler::from_minutes(config.timeout_minutes, Arc::clone(&stop))
    };

    let runs = scheduler.run(|| {
        match run_pass(&config, &registry, &LogProgress, Some(stop.as_ref())) {
            Ok(summary) => {
                for (label, e) in &summary.provider_errors {
                    warn!("{label}: {e}");
                }
            }
            Err(e) => error!("pass aborted: {e}"),
        }
    });

    if stop.load(Ordering::Relaxed) {
        info!(runs, "interrupted, stopping");
    }
    Ok(())
}

fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    ConfigFile::default_config()
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn find_tickers(provider_id: &str, class: &str, query: &str) -> Result<()> {
    let registry = builtin_registry()?;
    let provider = registry.resolve(provider_id, class)?;
    for ticker in provider.find(query)? {
        println!("{ticker}");
    }
    Ok(())
}

fn fetch_bars(
    provider_id: &str,
    class: &str,
    symbol: &str,
    period: &str,
    start: &str,
    end: &str,
) -> Result<()> {
    let period: Period = period.parse()?;
    let start = RangeBound::parse(start)?;
    let end = RangeBound::parse(end)?;

    let registry = builtin_registry()?;
    let provider = registry.resolve(provider_id, class)?;
    let ticker = provider.lookup(symbol)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut count = 0usize;
    for bar in provider.bars_between(&ticker, period, start, end)? {
        writeln!(out, "{}", bar?)?;
        count += 1;
    }
    out.flush()?;
    info!(symbol = %ticker.symbol, count, "fetched bars");
    Ok(())
}

fn save_codes(provider_id: &str, class: &str, out: &Path) -> Result<()> {
    let registry = builtin_registry()?;
    let provider = registry.resolve(provider_id, class)?;
    let path = out
        .to_str()
        .with_context(|| format!("{} is not valid UTF-8", out.display()))?;
    let written = provider
        .operations()
        .call("save_codes", None, &[json!(path)])?;
    println!("Wrote {written} codes to {}", out.display());
    Ok(())
}
