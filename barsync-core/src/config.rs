//! Run configuration: file format, loading and validation.
//!
//! The file has an `[all]` section with the run parameters and a
//! `[resources.<provider>]` table per provider mapping class names to symbol
//! lists. TOML is the default; a `.json` extension selects JSON.

use crate::data::chunk::{ChunkError, ChunkSpan};
use crate::data::ledger::Ledger;
use crate::data::range::{RangeBound, RangeError, TimeRange};
use crate::domain::period::PeriodError;
use crate::domain::Period;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Provider id → class name → symbols, in configured order.
pub type Resources = IndexMap<String, IndexMap<String, Vec<String>>>;

pub const DEFAULT_CONFIG_FILE: &str = "barsync.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("cannot render TOML: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TIMEFRAME: {0}")]
    Timeframe(#[from] PeriodError),

    #[error("CHUNK_IN_DAYS: {0}")]
    Chunk(#[from] ChunkError),

    #[error("DATETIME_START/DATETIME_END: {0}")]
    Range(#[from] RangeError),
}

/// A config value written either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

/// Boolean flag; strings `yes`/`true`/`t`/`1` (any case) are true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Flag {
    pub fn is_set(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n == 1,
            Self::Text(s) => matches!(s.trim().to_lowercase().as_str(), "yes" | "true" | "t" | "1"),
        }
    }
}

/// The `[all]` section as written on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct GeneralSection {
    /// Minutes between passes; `<= 0` runs once.
    pub timeout: i64,
    pub timeframe: Scalar,
    pub chunk_in_days: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime_start: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime_end: Option<Scalar>,
    #[serde(default = "default_append")]
    pub append_data: Flag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

fn default_append() -> Flag {
    Flag::Bool(true)
}

/// Configuration file layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub all: GeneralSection,
    #[serde(default)]
    pub resources: Resources,
}

impl ConfigFile {
    /// The configuration written by `barsync init`.
    pub fn default_config() -> Self {
        let mut resources = Resources::new();
        resources.insert(
            "finam".into(),
            IndexMap::from([(
                "FinamProvider".to_string(),
                vec!["SPFB.SBRF".to_string(), "SPFB.RTS".to_string()],
            )]),
        );
        resources.insert(
            "quotemedia".into(),
            IndexMap::from([("QuotemediaProvider".to_string(), vec!["^IN".to_string()])]),
        );

        Self {
            all: GeneralSection {
                timeout: 240,
                timeframe: Scalar::Text("15".into()),
                chunk_in_days: 10,
                datetime_start: Some(Scalar::Text("201611010000".into())),
                datetime_end: Some(Scalar::Text("201612010000".into())),
                append_data: Flag::Text("yes".into()),
                output_dir: None,
            },
            resources,
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write to `path`, as JSON if the extension is `.json`.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = if is_json(path) {
            self.to_json()?
        } else {
            self.to_toml()?
        };
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Bound from a config value. Integers follow the same digit rules as text,
/// so `201611010000` is a timestamp and `20` a lookback count.
fn bound(value: Option<&Scalar>) -> Result<RangeBound, RangeError> {
    match value {
        None => Ok(RangeBound::Absent),
        Some(Scalar::Int(n)) if *n < 0 => RangeBound::from_count(*n),
        Some(Scalar::Int(n)) => RangeBound::parse(&n.to_string()),
        Some(Scalar::Text(s)) => RangeBound::parse(s),
    }
}

fn timeframe(value: &Scalar) -> Result<Period, PeriodError> {
    match value {
        Scalar::Int(n) => Period::minutes(*n),
        Scalar::Text(s) => s.parse(),
    }
}

/// Validated run parameters.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub start: RangeBound,
    pub end: RangeBound,
    pub period: Period,
    pub chunk: ChunkSpan,
    pub append: bool,
    pub timeout_minutes: i64,
    pub output_dir: PathBuf,
    pub resources: Resources,
}

impl RunConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file = if is_json(path) {
            ConfigFile::from_json(&content)?
        } else {
            ConfigFile::from_toml(&content)?
        };
        Self::try_from(file)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Self::try_from(ConfigFile::from_toml(content)?)
    }

    /// Normalize the configured range against `now`.
    ///
    /// Called once at startup so a bad range stops the process before any
    /// fetching.
    pub fn validate(&self, now: NaiveDateTime) -> Result<TimeRange, ConfigError> {
        Ok(TimeRange::normalize(self.start, self.end, self.period, now)?)
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(&self.output_dir, self.append)
    }

    pub fn symbol_count(&self) -> usize {
        self.resources
            .values()
            .flat_map(|classes| classes.values())
            .map(Vec::len)
            .sum()
    }
}

impl TryFrom<ConfigFile> for RunConfig {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, ConfigError> {
        let all = file.all;
        Ok(Self {
            start: bound(all.datetime_start.as_ref())?,
            end: bound(all.datetime_end.as_ref())?,
            period: timeframe(&all.timeframe)?,
            chunk: ChunkSpan::days(all.chunk_in_days)?,
            append: all.append_data.is_set(),
            timeout_minutes: all.timeout,
            output_dir: all.output_dir.unwrap_or_else(|| PathBuf::from(".")),
            resources: file.resources,
        })
    }
}
