use std::{fs, path::Path};

use eyre::WrapErr;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    analysis::StockAnalyzer,
    model::{
        CorrelationMatrix, CumulativeReturnPoint, MarketSummary, MonthKey, MonthlyPerformance,
        SymbolMetrics, TimeSeriesTable, VolatilityMetric,
    },
    utils::rank_descending,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    top_movers: usize,
    cumulative_top: usize,
    volatile_top: usize,
    correlation_top: usize,
    monthly_top: usize,
    month: Option<MonthKey>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_movers: 10,
            cumulative_top: 5,
            volatile_top: 10,
            correlation_top: 15,
            monthly_top: 5,
            month: None,
        }
    }
}

impl ReportConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config {}", path.display()))?;

        serde_json::from_str(&text).wrap_err_with(|| format!("invalid config {}", path.display()))
    }

    pub fn with_top_movers(mut self, value: usize) -> Self {
        self.top_movers = value;
        self
    }

    pub fn with_cumulative_top(mut self, value: usize) -> Self {
        self.cumulative_top = value;
        self
    }

    pub fn with_volatile_top(mut self, value: usize) -> Self {
        self.volatile_top = value;
        self
    }

    pub fn with_correlation_top(mut self, value: usize) -> Self {
        self.correlation_top = value;
        self
    }

    pub fn with_monthly_top(mut self, value: usize) -> Self {
        self.monthly_top = value;
        self
    }

    pub fn with_month(mut self, value: MonthKey) -> Self {
        self.month = Some(value);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyMovers {
    pub month: MonthKey,
    pub gainers: Vec<MonthlyPerformance>,
    pub losers: Vec<MonthlyPerformance>,
}

/// Everything the dashboard renders, computed in one pass over a table.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub summary: MarketSummary,
    pub top_gainers: Vec<SymbolMetrics>,
    pub top_losers: Vec<SymbolMetrics>,
    pub cumulative_returns: Vec<CumulativeReturnPoint>,
    pub most_volatile: Vec<VolatilityMetric>,
    pub correlation: CorrelationMatrix,
    /// Newest first.
    pub months: Vec<MonthKey>,
    pub monthly: Option<MonthlyMovers>,
}

impl Report {
    pub fn build(table: &TimeSeriesTable, config: &ReportConfig) -> Self {
        let analyzer = StockAnalyzer::new(table);
        let metrics = analyzer.symbol_metrics();
        let leaders = |n: usize| metrics.iter().take(n).map(|m| m.symbol.as_str()).collect_vec();

        let defined = metrics
            .iter()
            .filter(|m| !m.return_pct.is_nan())
            .collect_vec();
        let top_losers = defined[defined.len().saturating_sub(config.top_movers)..]
            .iter()
            .map(|m| (*m).clone())
            .collect();

        let monthly_rows = analyzer.monthly_performance();
        let months = monthly_rows
            .iter()
            .map(|r| r.month)
            .unique()
            .sorted()
            .rev()
            .collect_vec();
        let monthly = config
            .month
            .or_else(|| months.first().copied())
            .map(|month| monthly_movers(&monthly_rows, month, config.monthly_top));

        let report = Self {
            summary: analyzer.market_summary(),
            top_gainers: metrics.iter().take(config.top_movers).cloned().collect(),
            top_losers,
            cumulative_returns: analyzer.cumulative_returns(&leaders(config.cumulative_top)),
            most_volatile: analyzer
                .volatility()
                .into_iter()
                .take(config.volatile_top)
                .collect(),
            correlation: analyzer.correlation_matrix(&leaders(config.correlation_top)),
            months,
            monthly,
        };

        info!(
            symbols = report.summary.total_symbols,
            months = report.months.len(),
            "built report"
        );
        report
    }
}

/// Best and worst `n` symbols of one month. Undefined returns are left out.
pub fn monthly_movers(rows: &[MonthlyPerformance], month: MonthKey, n: usize) -> MonthlyMovers {
    let ranked = rows
        .iter()
        .filter(|r| r.month == month && !r.return_pct.is_nan())
        .collect_vec();

    let gainers = ranked
        .iter()
        .sorted_by(|a, b| {
            rank_descending((a.return_pct, a.symbol.as_str()), (b.return_pct, b.symbol.as_str()))
        })
        .take(n)
        .map(|r| (*r).clone())
        .collect();
    let losers = ranked
        .iter()
        .sorted_by(|a, b| {
            rank_descending((-a.return_pct, a.symbol.as_str()), (-b.return_pct, b.symbol.as_str()))
        })
        .take(n)
        .map(|r| (*r).clone())
        .collect();

    MonthlyMovers {
        month,
        gainers,
        losers,
    }
}
