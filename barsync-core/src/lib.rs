//! barsync core: resumable, chunked bar downloads.
//!
//! - Domain types (bars, periods, tickers with forwarded provider operations)
//! - Time range normalization and chunk planning
//! - Provider contract, registry, and the Finam / Quotemedia sources
//! - Append-only record files with tail-read resume
//! - Download orchestrator and fixed-interval scheduler

pub mod config;
pub mod data;
pub mod domain;

#[cfg(test)]
mod tests {
    use super::*;

    /// Values that cross the interrupt-handler boundary or are shared with
    /// forwarded operations must be thread-safe.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Ticker>();
        require_sync::<domain::Ticker>();
        require_send::<domain::Operations>();
        require_sync::<domain::Operations>();
        require_send::<data::TimeRange>();
        require_sync::<data::TimeRange>();
        require_send::<data::Scheduler>();
        require_sync::<data::Scheduler>();
        require_send::<data::HttpFetcher>();
        require_sync::<data::HttpFetcher>();
        require_send::<data::ProviderRegistry>();
        require_sync::<data::ProviderRegistry>();
        require_send::<config::RunConfig>();
        require_sync::<config::RunConfig>();
    }
}
