//! Download orchestrator: one pass over every configured provider and
//! symbol, with per-symbol failure isolation and progress reporting.

use super::chunk::{ChunkPlan, ChunkSpan, Window};
use super::ledger::{Ledger, LedgerError};
use super::provider::{Provider, ProviderError};
use super::range::{RangeError, TimeRange};
use super::registry::{ProviderRegistry, RegistryError};
use crate::config::RunConfig;
use chrono::{Local, NaiveDateTime};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

/// Why a single symbol was not downloaded.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("blank symbol")]
    BlankSymbol,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl DownloadError {
    /// Skips are expected (blank or unknown symbols); everything else failed.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::BlankSymbol | Self::Provider(ProviderError::NotFound(_))
        )
    }
}

/// Progress callbacks for a download pass.
pub trait DownloadProgress {
    /// Called before a provider's symbol list is processed.
    fn on_provider_start(&self, provider: &str, class: &str, symbols: usize);

    /// Called when a provider cannot be resolved or constructed.
    fn on_provider_error(&self, provider: &str, class: &str, error: &RegistryError);

    /// Called when starting a symbol.
    fn on_symbol_start(&self, symbol: &str, index: usize, total: usize);

    /// Called after each chunk window has been appended.
    fn on_chunk_written(&self, symbol: &str, window: &Window, bars: usize);

    /// Called when a symbol completes, is skipped, or fails.
    fn on_symbol_complete(&self, symbol: &str, result: &Result<usize, DownloadError>);

    /// Called when the pass is done.
    fn on_run_complete(&self, summary: &RunSummary);
}

/// Progress reporter that writes through `tracing`.
pub struct LogProgress;

impl DownloadProgress for LogProgress {
    fn on_provider_start(&self, provider: &str, class: &str, symbols: usize) {
        info!(provider, class, symbols, "starting provider");
    }

    fn on_provider_error(&self, provider: &str, class: &str, error: &RegistryError) {
        error!(provider, class, %error, "skipping provider");
    }

    fn on_symbol_start(&self, symbol: &str, index: usize, total: usize) {
        info!("[{}/{}] {symbol}", index + 1, total);
    }

    fn on_chunk_written(&self, symbol: &str, window: &Window, bars: usize) {
        info!("{symbol}: {} .. {}: wrote {bars}", window.start, window.end);
    }

    fn on_symbol_complete(&self, symbol: &str, result: &Result<usize, DownloadError>) {
        match result {
            Ok(bars) => info!("{symbol}: total {bars}"),
            Err(e) if e.is_skip() => warn!("{symbol}: skipped: {e}"),
            Err(e) => error!("{symbol}: failed: {e}"),
        }
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            bars = summary.bars_written,
            interrupted = summary.interrupted,
            "download pass complete"
        );
    }
}

/// Outcome of one pass.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bars_written: usize,
    pub errors: Vec<(String, DownloadError)>,
    pub provider_errors: Vec<(String, RegistryError)>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && self.provider_errors.is_empty()
    }

    fn record(&mut self, symbol: &str, result: Result<usize, DownloadError>) {
        match result {
            Ok(bars) => {
                self.succeeded += 1;
                self.bars_written += bars;
            }
            Err(e) => {
                if e.is_skip() {
                    self.skipped += 1;
                } else {
                    self.failed += 1;
                }
                self.errors.push((symbol.to_string(), e));
            }
        }
    }
}

/// Normalized range and chunking shared by every symbol of a pass.
#[derive(Debug, Clone, Copy)]
pub struct PassWindow {
    pub range: TimeRange,
    pub chunk: ChunkSpan,
    pub now: NaiveDateTime,
}

fn cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|c| c.load(Ordering::Relaxed))
}

/// Run one pass against the current local time.
///
/// Fails only if the configured range does not normalize; every provider and
/// symbol failure is isolated and reported in the summary.
pub fn run_pass(
    config: &RunConfig,
    registry: &ProviderRegistry,
    progress: &dyn DownloadProgress,
    cancel: Option<&AtomicBool>,
) -> Result<RunSummary, RangeError> {
    run_pass_at(config, registry, progress, cancel, Local::now().naive_local())
}

/// [`run_pass`] with an explicit "now".
pub fn run_pass_at(
    config: &RunConfig,
    registry: &ProviderRegistry,
    progress: &dyn DownloadProgress,
    cancel: Option<&AtomicBool>,
    now: NaiveDateTime,
) -> Result<RunSummary, RangeError> {
    let window = PassWindow {
        range: TimeRange::normalize(config.start, config.end, config.period, now)?,
        chunk: config.chunk,
        now,
    };
    let ledger = config.ledger();
    let mut summary = RunSummary::default();

    'providers: for (provider_id, classes) in &config.resources {
        for (class, symbols) in classes {
            if cancelled(cancel) {
                summary.interrupted = true;
                break 'providers;
            }
            let _span = info_span!("provider", provider = %provider_id, class = %class).entered();
            progress.on_provider_start(provider_id, class, symbols.len());

            let provider = match registry.resolve(provider_id, class) {
                Ok(p) => p,
                Err(e) => {
                    progress.on_provider_error(provider_id, class, &e);
                    summary.provider_errors.push((format!("{provider_id}/{class}"), e));
                    continue;
                }
            };

            download_symbols(
                provider.as_ref(),
                symbols,
                &ledger,
                &window,
                progress,
                cancel,
                &mut summary,
            );
            if summary.interrupted {
                break 'providers;
            }
        }
    }

    progress.on_run_complete(&summary);
    Ok(summary)
}

/// Download each symbol in order, recording outcomes into `summary`.
///
/// The cancel flag is checked before every symbol and every chunk window.
pub fn download_symbols(
    provider: &dyn Provider,
    symbols: &[String],
    ledger: &Ledger,
    window: &PassWindow,
    progress: &dyn DownloadProgress,
    cancel: Option<&AtomicBool>,
    summary: &mut RunSummary,
) {
    let total = symbols.len();
    for (i, symbol) in symbols.iter().enumerate() {
        if cancelled(cancel) {
            summary.interrupted = true;
            return;
        }
        progress.on_symbol_start(symbol, i, total);
        let result = download_symbol(provider, symbol, ledger, window, progress, cancel);
        progress.on_symbol_complete(symbol, &result);
        summary.record(symbol, result);
    }
    if cancelled(cancel) {
        summary.interrupted = true;
    }
}

/// Resolve, resume, and fetch one symbol chunk by chunk.
///
/// A raised cancel flag stops before the next window; the bars already
/// written are kept. The record writer is flushed and closed whether this
/// returns early or not.
pub fn download_symbol(
    provider: &dyn Provider,
    symbol: &str,
    ledger: &Ledger,
    window: &PassWindow,
    progress: &dyn DownloadProgress,
    cancel: Option<&AtomicBool>,
) -> Result<usize, DownloadError> {
    if symbol.trim().is_empty() {
        return Err(DownloadError::BlankSymbol);
    }
    let period = window.range.period;
    let ticker = provider.lookup(symbol)?;
    let mut writer = ledger.open(symbol, period, window.range.start)?;
    debug!(symbol, path = %writer.path().display(), resume = %writer.resume_point(), "record opened");

    let plan = ChunkPlan::new(writer.resume_point(), window.range.end, window.chunk, window.now);
    for chunk in plan {
        if cancelled(cancel) {
            warn!(symbol, next = %chunk.start, "interrupted, keeping bars written so far");
            break;
        }
        let mut written = 0;
        for bar in provider.bars(&ticker, chunk.start, chunk.end, period)? {
            if writer.append(&bar?)? {
                written += 1;
            }
        }
        progress.on_chunk_written(symbol, &chunk, written);
    }

    Ok(writer.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_classification() {
        assert!(DownloadError::BlankSymbol.is_skip());
        assert!(DownloadError::from(ProviderError::NotFound("X".into())).is_skip());
        assert!(!DownloadError::from(ProviderError::Obtain("down".into())).is_skip());
        assert!(!DownloadError::from(ProviderError::InvalidSampleFormat("?".into())).is_skip());
    }

    #[test]
    fn summary_tallies_outcomes() {
        let mut summary = RunSummary::default();
        summary.record("A", Ok(5));
        summary.record("B", Err(DownloadError::BlankSymbol));
        summary.record("C", Err(ProviderError::Obtain("down".into()).into()));
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.bars_written, 5);
        assert_eq!(summary.total(), 3);
        assert!(!summary.all_succeeded());
        assert_eq!(summary.errors.len(), 2);
    }
}
