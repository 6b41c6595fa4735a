//! Descriptive and comparative analytics over daily stock price/volume series.
//!
//! [`loader`] turns a directory of per-symbol CSV files into a
//! [`TimeSeriesTable`](model::TimeSeriesTable), [`analysis::StockAnalyzer`]
//! derives rankings, growth curves, monthly returns and correlations from it,
//! and [`report`] assembles those into one serializable dashboard payload.

pub mod analysis;
pub mod loader;
pub mod model;
pub mod report;
pub mod utils;
