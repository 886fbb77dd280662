//! Quotemedia history provider. Daily bars only.

use super::fetch::Fetch;
use super::provider::{BarStream, Provider, ProviderError, WindowedBars};
use crate::domain::{Bar, Period, Ticker};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

const HISTORY_URL: &str = "https://app.quotemedia.com/quotetools/getHistoryDownload.csv";

pub struct QuotemediaProvider {
    fetch: Arc<dyn Fetch>,
}

impl QuotemediaProvider {
    pub fn new(fetch: Arc<dyn Fetch>) -> Self {
        Self { fetch }
    }

    /// History download URL; months are zero-based on the service.
    pub fn history_url(symbol: &str, from: NaiveDate, to: NaiveDate) -> String {
        format!(
            "{HISTORY_URL}?webmasterId=501&startDay={}&startMonth={}&startYear={}\
             &endDay={}&endMonth={}&endYear={}&isRanged=false&symbol={symbol}",
            from.day(),
            from.month0(),
            from.year(),
            to.day(),
            to.month0(),
            to.year(),
        )
    }
}

/// Parse `date,open,high,low,close,volume,...`; `None` for header-like rows.
fn parse_row(symbol: &str, row: &csv::StringRecord) -> Option<Result<Bar, ProviderError>> {
    let invalid = || {
        ProviderError::InvalidSampleFormat(format!(
            "{symbol}: {}",
            row.iter().collect::<Vec<_>>().join(",")
        ))
    };
    if row.len() < 6 {
        return Some(Err(invalid()));
    }
    let open = row[1].trim().parse::<f64>().ok()?;

    let parse = || -> Result<Bar, ProviderError> {
        let price = |i: usize| row[i].trim().parse::<f64>().map_err(|_| invalid());
        let date = NaiveDate::parse_from_str(row[0].trim(), "%Y-%m-%d").map_err(|_| invalid())?;
        Ok(Bar {
            symbol: symbol.to_string(),
            timestamp: date.and_time(NaiveTime::MIN),
            period: Period::day(),
            open,
            high: price(2)?,
            low: price(3)?,
            close: price(4)?,
            volume: Some(row[5].trim().parse().map_err(|_| invalid())?),
            interest: None,
        })
    };
    Some(parse())
}

impl Provider for QuotemediaProvider {
    fn name(&self) -> &str {
        "quotemedia"
    }

    fn find(&self, query: &str) -> Result<Vec<Ticker>, ProviderError> {
        if query.trim().is_empty() {
            return Err(ProviderError::NotFound(query.to_string()));
        }
        Ok(vec![Ticker::new(query.to_lowercase(), IndexMap::new())])
    }

    /// The requested period is ignored; the service only serves daily bars.
    fn bars(
        &self,
        ticker: &Ticker,
        start: NaiveDateTime,
        end: NaiveDateTime,
        _period: Period,
    ) -> Result<BarStream<'_>, ProviderError> {
        let url = Self::history_url(&ticker.symbol, start.date(), end.date());
        debug!(%url, "Quotemedia history request");

        let body = self.fetch.get(&url, &[])?;
        let text = String::from_utf8_lossy(&body);

        // Newest first on the wire.
        let mut ascending: Vec<&str> = text.lines().rev().collect();
        ascending.retain(|l| !l.trim().is_empty());
        let joined = ascending.join("\n");

        let symbol = ticker.symbol.clone();
        let rows = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(Cursor::new(joined.into_bytes()))
            .into_records()
            .filter_map(move |record| match record {
                Ok(row) => parse_row(&symbol, &row),
                Err(e) => Some(Err(ProviderError::InvalidSampleFormat(e.to_string()))),
            });

        Ok(Box::new(WindowedBars::new(rows, start, end)))
    }
}
