use std::{collections::BTreeMap, str::FromStr};

use chrono::{Datelike, NaiveDate};
use derive_more::{Deref, Display, From};
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type Price = f64;

/// One trading day of one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: Price,
    pub volume: f64,
}

impl Observation {
    pub fn new(symbol: impl Into<String>, date: NaiveDate, close: Price, volume: f64) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            close,
            volume,
        }
    }
}

/// Normalized multi-symbol daily series. Rows may arrive in any order.
#[derive(Default, Debug, Clone, Deref, From)]
pub struct TimeSeriesTable(Vec<Observation>);

impl TimeSeriesTable {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self(observations)
    }

    /// Distinct symbols in lexical order.
    pub fn symbols(&self) -> Vec<&str> {
        self.iter()
            .map(|o| o.symbol.as_str())
            .unique()
            .sorted()
            .collect()
    }

    /// Partitions rows by symbol, each partition sorted by date ascending.
    pub fn group_by_symbol(&self) -> BTreeMap<&str, Vec<&Observation>> {
        let mut groups: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();

        for observation in self.iter() {
            groups
                .entry(observation.symbol.as_str())
                .or_default()
                .push(observation);
        }

        for rows in groups.values_mut() {
            rows.sort_by_key(|o| o.date);
        }

        groups
    }
}

/// Calendar month, rendered as `YYYY-MM`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display(fmt = "{:04}-{:02}", year, month)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl FromStr for MonthKey {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| eyre::eyre!("month must look like YYYY-MM, got {s:?}"))?;
        let year: i32 = year.parse()?;
        let month: u32 = month.parse()?;

        if !(1..=12).contains(&month) {
            eyre::bail!("month out of range in {s:?}");
        }

        Ok(Self { year, month })
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolMetrics {
    pub symbol: String,
    pub return_pct: f64,
    pub avg_close: Price,
    pub avg_volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityMetric {
    pub symbol: String,
    pub volatility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeReturnPoint {
    pub symbol: String,
    pub date: NaiveDate,
    /// `None` on the symbol's first date.
    pub daily_return: Option<f64>,
    pub cumulative_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPerformance {
    pub month: MonthKey,
    pub symbol: String,
    pub return_pct: f64,
}

/// Square symbol x symbol matrix of Pearson coefficients.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub symbols: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.symbols.iter().position(|s| s == a)?;
        let j = self.symbols.iter().position(|s| s == b)?;
        Some(self.values[i][j])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSummary {
    pub total_symbols: usize,
    pub gainers: usize,
    pub losers: usize,
    pub avg_close: Price,
    pub avg_volume: f64,
}
