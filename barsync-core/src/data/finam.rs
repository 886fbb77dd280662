//! Finam export provider.
//!
//! The symbol dictionary is a JavaScript file declaring parallel arrays
//! (`aEmitentIds`, `aEmitentCodes`, `aEmitentMarkets`, `aEmitentNames`). It is
//! downloaded once when the provider is constructed. Bars come from the CSV
//! export endpoint, one request per window.

use super::fetch::Fetch;
use super::provider::{BarStream, Provider, ProviderError, WindowedBars};
use crate::domain::{Bar, Operation, Operations, Period, Ticker};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const DICTIONARY_URL: &str = "https://www.finam.ru/cache/icharts/icharts.js";
const EXPORT_BASE: &str = "http://export.finam.ru";
const EXPORT_REFERER: &str = "http://www.finam.ru/analysis/export/default.asp";

/// Export resolution code for a supported period.
fn resolution(period: Period) -> Option<u8> {
    match period.total_minutes() {
        1 => Some(2),
        5 => Some(3),
        10 => Some(4),
        15 => Some(5),
        30 => Some(6),
        60 => Some(7),
        1440 => Some(8),
        10080 => Some(9),
        _ => None,
    }
}

/// One dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitent {
    pub code: String,
    pub id: String,
    pub name: String,
    pub market: String,
}

/// Parsed symbol dictionary; entries share an index across the arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolDictionary {
    ids: Vec<String>,
    codes: Vec<String>,
    markets: Vec<String>,
    names: Vec<String>,
}

impl SymbolDictionary {
    pub fn parse(script: &str) -> Result<Self, ProviderError> {
        let mut dict = Self::default();
        for line in script.lines() {
            let Some((name, values)) = parse_declaration(line) else {
                continue;
            };
            match name {
                "aEmitentIds" => dict.ids = values,
                "aEmitentCodes" => dict.codes = values,
                "aEmitentMarkets" => dict.markets = values,
                "aEmitentNames" => dict.names = values,
                _ => {}
            }
        }

        for (name, values) in [
            ("aEmitentIds", &dict.ids),
            ("aEmitentCodes", &dict.codes),
            ("aEmitentMarkets", &dict.markets),
        ] {
            if values.is_empty() {
                return Err(ProviderError::Obtain(format!(
                    "symbol dictionary has no {name}"
                )));
            }
        }
        Ok(dict)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn entry(&self, index: usize) -> Option<Emitent> {
        let field = |v: &Vec<String>| v.get(index).cloned().unwrap_or_default();
        self.codes.get(index).map(|code| Emitent {
            code: code.clone(),
            id: field(&self.ids),
            name: field(&self.names),
            market: field(&self.markets),
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = Emitent> + '_ {
        (0..self.len()).filter_map(|i| self.entry(i))
    }

    /// Write `code;id;name;market` lines, one per entry.
    pub fn write_codes<W: Write>(&self, mut out: W) -> std::io::Result<usize> {
        let mut count = 0;
        for e in self.entries() {
            writeln!(out, "{};{};{};{}", e.code, e.id, e.name, e.market)?;
            count += 1;
        }
        out.flush()?;
        Ok(count)
    }
}

/// Split `var NAME = new Array(...)` or `var NAME = [...]` into its parts.
fn parse_declaration(line: &str) -> Option<(&str, Vec<String>)> {
    let rest = line.trim().strip_prefix("var")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (name, value) = rest.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    let value = value.trim();
    let body = if let Some(after) = value.strip_prefix("new") {
        after.trim_start().strip_prefix("Array")?
    } else if value.starts_with('[') {
        value
    } else {
        return None;
    };
    let body = body
        .trim()
        .trim_end_matches(';')
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']'));
    Some((name, split_values(body)))
}

/// Comma split that keeps commas inside single-quoted values. A backslash
/// escapes the next character.
fn split_values(body: &str) -> Vec<String> {
    if body.trim().is_empty() {
        return Vec::new();
    }
    let mut values = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.extend(chars.next()),
            '\'' => quoted = !quoted,
            ',' if !quoted => values.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    values.push(current.trim().to_string());
    values
}

/// Numbers stay numbers in ticker metadata; anything else is a string.
fn scalar(value: &str) -> Value {
    value
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(value))
}

fn metadata_text(ticker: &Ticker, key: &str) -> Result<String, ProviderError> {
    match ticker.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(ProviderError::Obtain(format!(
            "ticker {} has no '{key}'",
            ticker.symbol
        ))),
    }
}

/// Build the CSV export URL for one window.
pub fn export_url(
    ticker: &Ticker,
    from: NaiveDate,
    to: NaiveDate,
    resolution: u8,
) -> Result<String, ProviderError> {
    let market = metadata_text(ticker, "market")?;
    let em = metadata_text(ticker, "id")?;
    let file = format!(
        "{}_{}_{}",
        ticker.symbol,
        from.format("%y%m%d"),
        to.format("%y%m%d")
    );
    let ext = ".csv";
    // Months are zero-based on the export service.
    Ok(format!(
        "{EXPORT_BASE}/{file}{ext}?d=d&market={market}&em={em}&df={df}&mf={mf}&yf={yf}\
         &dt={dt}&mt={mt}&yt={yt}&p={resolution}&f={file}&e={ext}&cn={cn}\
         &dtf=1&tmf=1&MSOR=1&sep=3&sep2=1&datf=5&at=0",
        df = from.day(),
        mf = from.month0(),
        yf = from.year(),
        dt = to.day(),
        mt = to.month0(),
        yt = to.year(),
        cn = ticker.symbol,
    ))
}

/// Parse one `DATE;TIME;OPEN;HIGH;LOW;CLOSE;VOL` row.
fn parse_row(symbol: &str, period: Period, row: &csv::StringRecord) -> Result<Bar, ProviderError> {
    let invalid = || {
        ProviderError::InvalidSampleFormat(format!(
            "{symbol}: {}",
            row.iter().collect::<Vec<_>>().join(";")
        ))
    };
    if row.len() != 7 {
        return Err(invalid());
    }
    let price = |i: usize| row[i].trim().parse::<f64>().map_err(|_| invalid());
    let stamp = format!("{}{}", row[0].trim(), row[1].trim());

    Ok(Bar {
        symbol: symbol.to_string(),
        timestamp: NaiveDateTime::parse_from_str(&stamp, "%Y%m%d%H%M%S").map_err(|_| invalid())?,
        period,
        open: price(2)?,
        high: price(3)?,
        low: price(4)?,
        close: price(5)?,
        volume: Some(row[6].trim().parse().map_err(|_| invalid())?),
        interest: None,
    })
}

/// Provider backed by the Finam export service.
pub struct FinamProvider {
    fetch: Arc<dyn Fetch>,
    dictionary: Arc<SymbolDictionary>,
}

impl FinamProvider {
    /// Download and parse the symbol dictionary.
    pub fn new(fetch: Arc<dyn Fetch>) -> Result<Self, ProviderError> {
        let body = fetch.get(DICTIONARY_URL, &[])?;
        let dictionary = SymbolDictionary::parse(&String::from_utf8_lossy(&body))?;
        info!(symbols = dictionary.len(), "Finam symbol dictionary loaded");
        Ok(Self::with_dictionary(fetch, dictionary))
    }

    pub fn with_dictionary(fetch: Arc<dyn Fetch>, dictionary: SymbolDictionary) -> Self {
        Self {
            fetch,
            dictionary: Arc::new(dictionary),
        }
    }

    pub fn dictionary(&self) -> &SymbolDictionary {
        &self.dictionary
    }

    /// Write the symbol dictionary to `path`; returns the number of entries.
    pub fn save_codes(&self, path: &Path) -> Result<usize, ProviderError> {
        save_codes(&self.dictionary, path)
    }
}

fn save_codes(dictionary: &SymbolDictionary, path: &Path) -> Result<usize, ProviderError> {
    let file = File::create(path)
        .map_err(|e| ProviderError::Obtain(format!("{}: {e}", path.display())))?;
    dictionary
        .write_codes(BufWriter::new(file))
        .map_err(|e| ProviderError::Obtain(format!("{}: {e}", path.display())))
}

impl Provider for FinamProvider {
    fn name(&self) -> &str {
        "finam"
    }

    fn find(&self, query: &str) -> Result<Vec<Ticker>, ProviderError> {
        let ops = self.operations();
        let found: Vec<Ticker> = self
            .dictionary
            .entries()
            .filter(|e| e.code.eq_ignore_ascii_case(query))
            .map(|e| {
                let mut metadata = IndexMap::new();
                metadata.insert("market".to_string(), scalar(&e.market));
                metadata.insert("id".to_string(), scalar(&e.id));
                Ticker::new(e.code, metadata).with_operations(ops.clone())
            })
            .collect();

        if found.is_empty() {
            return Err(ProviderError::NotFound(query.to_string()));
        }
        Ok(found)
    }

    fn bars(
        &self,
        ticker: &Ticker,
        start: NaiveDateTime,
        end: NaiveDateTime,
        period: Period,
    ) -> Result<BarStream<'_>, ProviderError> {
        let code = resolution(period).ok_or(ProviderError::UnsupportedPeriod(period))?;
        let url = export_url(ticker, start.date(), end.date(), code)?;
        debug!(%url, "Finam export request");

        let body = self.fetch.get(&url, &[("Referer", EXPORT_REFERER)])?;
        let text = String::from_utf8_lossy(&body).into_owned();

        let symbol = ticker.symbol.clone();
        let rows = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .from_reader(Cursor::new(text.into_bytes()))
            .into_records()
            .map(move |record| match record {
                Ok(row) => parse_row(&symbol, period, &row),
                Err(e) => Err(ProviderError::InvalidSampleFormat(e.to_string())),
            });

        Ok(Box::new(WindowedBars::new(rows, start, end)))
    }

    fn operations(&self) -> Operations {
        let dict = Arc::clone(&self.dictionary);
        let save = Operation::free(move |args| {
            let path = args.first().and_then(Value::as_str).ok_or_else(|| {
                ProviderError::UnsupportedOperation("save_codes expects a path".into())
            })?;
            save_codes(&dict, Path::new(path)).map(Value::from)
        });

        let dict = Arc::clone(&self.dictionary);
        let emitent = Operation::bound(move |ticker, _args| {
            let id = metadata_text(ticker, "id")?;
            dict.entries()
                .find(|e| e.code == ticker.symbol && e.id == id)
                .map(|e| json!({ "code": e.code, "id": e.id, "name": e.name, "market": e.market }))
                .ok_or_else(|| ProviderError::NotFound(ticker.symbol.clone()))
        });

        Operations::new()
            .with("save_codes", save)
            .with("emitent", emitent)
    }
}
