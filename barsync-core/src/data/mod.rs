//! Acquisition pipeline: range normalization, providers, chunked download,
//! record files and scheduling.

pub mod chunk;
pub mod download;
pub mod fetch;
pub mod finam;
pub mod ledger;
pub mod provider;
pub mod quotemedia;
pub mod range;
pub mod registry;
pub mod schedule;

pub use chunk::{ChunkPlan, ChunkSpan, Window};
pub use download::{
    download_symbol, download_symbols, run_pass, run_pass_at, DownloadError, DownloadProgress,
    LogProgress, PassWindow, RunSummary,
};
pub use fetch::{Fetch, FetchError, HttpFetcher};
pub use finam::FinamProvider;
pub use ledger::{Ledger, LedgerError, RecordWriter};
pub use provider::{BarStream, Provider, ProviderError, WindowedBars};
pub use quotemedia::QuotemediaProvider;
pub use range::{RangeBound, RangeError, TimeRange};
pub use registry::{ProviderRegistry, RegistryError};
pub use schedule::Scheduler;
