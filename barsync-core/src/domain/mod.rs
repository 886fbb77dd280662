//! Domain types: bars, periods and tickers.

pub mod bar;
pub mod period;
pub mod ticker;

pub use bar::{Bar, BarParseError};
pub use period::{Period, PeriodError};
pub use ticker::{Operation, Operations, Ticker};
