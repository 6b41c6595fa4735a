use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use itertools::Itertools;
use tracing::debug;

use crate::{
    model::{
        CorrelationMatrix, CumulativeReturnPoint, MarketSummary, MonthKey, MonthlyPerformance,
        Observation, SymbolMetrics, TimeSeriesTable, VolatilityMetric,
    },
    utils::{pct_change, pearson, percent_return, rank_descending, sample_std, RunningMean},
};

/// Stateless calculator over a borrowed table. Every method is a pure
/// function of the table and its arguments.
#[derive(Debug, Copy, Clone)]
pub struct StockAnalyzer<'a> {
    table: &'a TimeSeriesTable,
}

impl<'a> StockAnalyzer<'a> {
    pub fn new(table: &'a TimeSeriesTable) -> Self {
        Self { table }
    }

    /// Whole-range return, average close and average volume per symbol,
    /// best return first.
    pub fn symbol_metrics(&self) -> Vec<SymbolMetrics> {
        let mut result = self
            .table
            .group_by_symbol()
            .into_iter()
            .map(|(symbol, rows)| SymbolMetrics {
                symbol: symbol.to_owned(),
                return_pct: series_return(&rows),
                avg_close: rows.iter().map(|o| o.close).collect::<RunningMean>().avg(),
                avg_volume: rows.iter().map(|o| o.volume).collect::<RunningMean>().avg(),
            })
            .collect_vec();

        result.sort_by(|a, b| {
            rank_descending((a.return_pct, a.symbol.as_str()), (b.return_pct, b.symbol.as_str()))
        });

        debug!(symbols = result.len(), "computed symbol metrics");
        result
    }

    /// Sample standard deviation of daily returns per symbol, most volatile first.
    pub fn volatility(&self) -> Vec<VolatilityMetric> {
        let mut result = self
            .table
            .group_by_symbol()
            .into_iter()
            .map(|(symbol, rows)| VolatilityMetric {
                symbol: symbol.to_owned(),
                volatility: sample_std(&daily_returns(&rows)),
            })
            .collect_vec();

        result.sort_by(|a, b| {
            rank_descending((a.volatility, a.symbol.as_str()), (b.volatility, b.symbol.as_str()))
        });

        debug!(symbols = result.len(), "computed volatility");
        result
    }

    /// Growth curves for the selected symbols, in selection order, each
    /// starting at exactly 1.0. Unknown symbols contribute nothing.
    pub fn cumulative_returns<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<CumulativeReturnPoint> {
        let groups = self.table.group_by_symbol();
        let mut result = Vec::new();

        for symbol in symbols.iter().map(AsRef::<str>::as_ref).unique() {
            let Some(rows) = groups.get(symbol) else {
                continue;
            };

            let mut growth = 1.0;
            let mut prev: Option<&Observation> = None;

            for &row in rows {
                let daily_return = prev.map(|p| pct_change(p.close, row.close));
                if let Some(r) = daily_return {
                    growth *= 1.0 + r;
                }

                result.push(CumulativeReturnPoint {
                    symbol: symbol.to_owned(),
                    date: row.date,
                    daily_return,
                    cumulative_return: growth,
                });
                prev = Some(row);
            }
        }

        debug!(points = result.len(), "computed cumulative returns");
        result
    }

    /// Return per (calendar month, symbol), ordered by month then symbol.
    pub fn monthly_performance(&self) -> Vec<MonthlyPerformance> {
        let mut groups: BTreeMap<(MonthKey, &str), Vec<&Observation>> = BTreeMap::new();

        for (symbol, rows) in self.table.group_by_symbol() {
            for row in rows {
                groups
                    .entry((MonthKey::from_date(row.date), symbol))
                    .or_default()
                    .push(row);
            }
        }

        let result = groups
            .into_iter()
            .map(|((month, symbol), rows)| MonthlyPerformance {
                month,
                symbol: symbol.to_owned(),
                return_pct: series_return(&rows),
            })
            .collect_vec();

        debug!(rows = result.len(), "computed monthly performance");
        result
    }

    /// Pairwise-complete Pearson correlation of closing prices over the
    /// selected symbols. Symbols without observations are left out.
    pub fn correlation_matrix<S: AsRef<str>>(&self, symbols: &[S]) -> CorrelationMatrix {
        let groups = self.table.group_by_symbol();
        let selected = symbols
            .iter()
            .map(AsRef::<str>::as_ref)
            .unique()
            .filter(|s| groups.contains_key(*s))
            .collect_vec();

        if selected.is_empty() {
            return CorrelationMatrix::default();
        }

        // date x symbol pivot, None where a symbol did not trade
        let dates: BTreeSet<NaiveDate> = selected
            .iter()
            .flat_map(|s| &groups[*s])
            .map(|o| o.date)
            .collect();

        let columns = selected
            .iter()
            .map(|s| {
                let closes: BTreeMap<NaiveDate, f64> =
                    groups[*s].iter().map(|o| (o.date, o.close)).collect();
                dates.iter().map(|d| closes.get(d).copied()).collect_vec()
            })
            .collect_vec();

        let n = selected.len();
        let mut values = vec![vec![f64::NAN; n]; n];

        for i in 0..n {
            values[i][i] = 1.0;
            for j in (i + 1)..n {
                let (xs, ys): (Vec<f64>, Vec<f64>) = columns[i]
                    .iter()
                    .zip(&columns[j])
                    .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                    .unzip();

                let coefficient = pearson(&xs, &ys);
                values[i][j] = coefficient;
                values[j][i] = coefficient;
            }
        }

        debug!(symbols = n, dates = dates.len(), "computed correlation matrix");
        CorrelationMatrix {
            symbols: selected.into_iter().map(str::to_owned).collect(),
            values,
        }
    }

    /// Market-wide counts and averages.
    pub fn market_summary(&self) -> MarketSummary {
        let metrics = self.symbol_metrics();
        let gainers = metrics.iter().filter(|m| m.return_pct > 0.0).count();

        MarketSummary {
            total_symbols: metrics.len(),
            gainers,
            losers: metrics.len() - gainers,
            avg_close: self.table.iter().map(|o| o.close).collect::<RunningMean>().avg(),
            avg_volume: self.table.iter().map(|o| o.volume).collect::<RunningMean>().avg(),
        }
    }
}

/// First-to-last return of date-sorted rows.
fn series_return(rows: &[&Observation]) -> f64 {
    match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => percent_return(first.close, last.close),
        _ => f64::NAN,
    }
}

fn daily_returns(rows: &[&Observation]) -> Vec<f64> {
    rows.iter()
        .tuple_windows()
        .map(|(prev, next)| pct_change(prev.close, next.close))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use itertools::Itertools;

    use super::StockAnalyzer;
    use crate::model::{MonthKey, Observation, TimeSeriesTable};

    const EPS: f64 = 1e-9;

    fn table(rows: &[(&str, &str, f64)]) -> TimeSeriesTable {
        rows.iter()
            .map(|(symbol, date, close)| {
                let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
                Observation::new(*symbol, date, *close, 1000.0)
            })
            .collect_vec()
            .into()
    }

    fn close_to(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn unittest_symbol_metrics_ranked_by_return() {
        let table = table(&[
            ("B", "2024-01-01", 100.0),
            ("A", "2024-01-02", 110.0),
            ("B", "2024-01-02", 90.0),
            ("A", "2024-01-01", 100.0),
        ]);

        let metrics = StockAnalyzer::new(&table).symbol_metrics();

        assert_eq!(metrics.iter().map(|m| m.symbol.as_str()).collect_vec(), ["A", "B"]);
        assert_eq!(metrics[0].return_pct, (110.0 - 100.0) / 100.0 * 100.0);
        assert_eq!(metrics[1].return_pct, (90.0 - 100.0) / 100.0 * 100.0);
        assert_eq!(metrics[0].avg_close, 105.0);
        assert_eq!(metrics[0].avg_volume, 1000.0);
    }

    #[test]
    fn unittest_symbol_metrics_edge_cases() {
        let table = table(&[
            ("ZERO", "2024-01-01", 0.0),
            ("ZERO", "2024-01-02", 5.0),
            ("ONE", "2024-01-01", 42.0),
            ("DOWN", "2024-01-01", 10.0),
            ("DOWN", "2024-01-02", 5.0),
        ]);

        let metrics = StockAnalyzer::new(&table).symbol_metrics();
        let order = metrics.iter().map(|m| m.symbol.as_str()).collect_vec();

        assert_eq!(order, ["ONE", "DOWN", "ZERO"]);
        assert_eq!(metrics[0].return_pct, 0.0);
        assert!(metrics[2].return_pct.is_nan());
    }

    #[test]
    fn unittest_equal_returns_break_ties_by_symbol() {
        let table = table(&[
            ("B", "2024-01-01", 10.0),
            ("B", "2024-01-02", 11.0),
            ("A", "2024-01-01", 10.0),
            ("A", "2024-01-02", 11.0),
        ]);

        let analyzer = StockAnalyzer::new(&table);

        let metrics = analyzer.symbol_metrics();
        assert_eq!(metrics.iter().map(|m| m.symbol.as_str()).collect_vec(), ["A", "B"]);

        let volatility = analyzer.volatility();
        assert_eq!(volatility.iter().map(|v| v.symbol.as_str()).collect_vec(), ["A", "B"]);
    }

    #[test]
    fn unittest_volatility() {
        let table = table(&[
            ("FLAT", "2024-01-01", 50.0),
            ("FLAT", "2024-01-02", 50.0),
            ("FLAT", "2024-01-03", 50.0),
            ("SWING", "2024-01-01", 100.0),
            ("SWING", "2024-01-02", 110.0),
            ("SWING", "2024-01-03", 99.0),
            ("LONE", "2024-01-01", 7.0),
        ]);

        let volatility = StockAnalyzer::new(&table).volatility();
        let order = volatility.iter().map(|v| v.symbol.as_str()).collect_vec();

        assert_eq!(order, ["SWING", "FLAT", "LONE"]);
        assert!(close_to(volatility[0].volatility, 0.02f64.sqrt()));
        assert_eq!(volatility[1].volatility, 0.0);
        assert!(volatility[2].volatility.is_nan());
    }

    #[test]
    fn unittest_cumulative_returns() {
        let table = table(&[
            ("A", "2024-01-03", 99.0),
            ("A", "2024-01-01", 100.0),
            ("A", "2024-01-02", 110.0),
            ("B", "2024-01-01", 1.0),
        ]);

        let points = StockAnalyzer::new(&table).cumulative_returns(&["A", "MISSING"]);

        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.symbol == "A"));
        assert!(points.iter().map(|p| p.date).tuple_windows().all(|(a, b)| a < b));

        assert_eq!(points[0].cumulative_return, 1.0);
        assert_eq!(points[0].daily_return, None);
        assert!(close_to(points[1].cumulative_return, 1.10));
        assert!(close_to(points[2].cumulative_return, 0.99));
        assert!(close_to(points[2].daily_return.unwrap(), -0.1));
    }

    #[test]
    fn unittest_cumulative_returns_follow_selection_order() {
        let table = table(&[
            ("A", "2024-01-01", 1.0),
            ("B", "2024-01-01", 2.0),
            ("B", "2024-01-02", 3.0),
        ]);

        let points = StockAnalyzer::new(&table).cumulative_returns(&["B", "A", "B"]);
        let symbols = points.iter().map(|p| p.symbol.as_str()).collect_vec();

        assert_eq!(symbols, ["B", "B", "A"]);
        assert_eq!(points[2].cumulative_return, 1.0);
    }

    #[test]
    fn unittest_monthly_performance() {
        let table = table(&[
            ("A", "2024-02-28", 90.0),
            ("A", "2024-01-31", 120.0),
            ("A", "2024-01-01", 100.0),
            ("A", "2024-02-01", 120.0),
            ("B", "2024-02-10", 30.0),
        ]);

        let monthly = StockAnalyzer::new(&table).monthly_performance();
        let rows = monthly
            .iter()
            .map(|m| (m.month.to_string(), m.symbol.as_str(), m.return_pct))
            .collect_vec();

        assert_eq!(
            rows,
            [
                ("2024-01".to_owned(), "A", 20.0),
                ("2024-02".to_owned(), "A", -25.0),
                ("2024-02".to_owned(), "B", 0.0),
            ]
        );
        assert_eq!(monthly[0].month, MonthKey { year: 2024, month: 1 });
    }

    #[test]
    fn unittest_correlation_matrix() {
        let table = table(&[
            ("A", "2024-01-01", 1.0),
            ("A", "2024-01-02", 2.0),
            ("A", "2024-01-03", 3.0),
            ("A", "2024-01-04", 5.0),
            ("B", "2024-01-01", 2.0),
            ("B", "2024-01-02", 4.0),
            ("B", "2024-01-03", 6.0),
            ("C", "2024-01-02", 9.0),
            ("C", "2024-01-03", 1.0),
            ("C", "2024-01-05", 4.0),
        ]);

        let matrix = StockAnalyzer::new(&table).correlation_matrix(&["A", "B", "C"]);

        assert_eq!(matrix.symbols, ["A", "B", "C"]);
        for symbol in ["A", "B", "C"] {
            assert_eq!(matrix.get(symbol, symbol), Some(1.0));
        }
        for (i, j) in (0..3).cartesian_product(0..3) {
            let (a, b) = (matrix.values[i][j], matrix.values[j][i]);
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }

        // A and B overlap on three dates where B = 2A
        assert!(close_to(matrix.get("A", "B").unwrap(), 1.0));
        // A and C overlap on two dates, moving in opposite directions
        assert!(close_to(matrix.get("A", "C").unwrap(), -1.0));
    }

    #[test]
    fn unittest_correlation_undefined_cases() {
        let table = table(&[
            ("FLAT", "2024-01-01", 10.0),
            ("FLAT", "2024-01-02", 10.0),
            ("FLAT", "2024-01-03", 10.0),
            ("SHIFT", "2024-01-02", 10.0),
            ("SHIFT", "2024-01-03", 10.0),
            ("SHIFT", "2024-01-04", 10.0),
            ("APART", "2024-03-01", 1.0),
            ("APART", "2024-03-02", 2.0),
        ]);

        let analyzer = StockAnalyzer::new(&table);
        let matrix = analyzer.correlation_matrix(&["FLAT", "SHIFT", "APART", "NOPE"]);

        assert_eq!(matrix.symbols, ["FLAT", "SHIFT", "APART"]);
        assert!(matrix.get("FLAT", "SHIFT").unwrap().is_nan());
        assert!(matrix.get("FLAT", "APART").unwrap().is_nan());
        assert_eq!(matrix.get("APART", "APART"), Some(1.0));
        assert_eq!(matrix.get("APART", "NOPE"), None);
        assert_eq!(matrix.get("NOPE", "NOPE"), None);

        assert!(analyzer.correlation_matrix(&["NOPE", "GONE"]).is_empty());
    }

    #[test]
    fn unittest_empty_inputs() {
        let empty = TimeSeriesTable::default();
        let analyzer = StockAnalyzer::new(&empty);

        assert!(analyzer.symbol_metrics().is_empty());
        assert!(analyzer.volatility().is_empty());
        assert!(analyzer.monthly_performance().is_empty());
        assert!(analyzer.cumulative_returns(&["A"]).is_empty());
        let matrix = analyzer.correlation_matrix(&["A", "B"]);
        assert!(matrix.is_empty());
        assert!(matrix.values.is_empty());

        let summary = analyzer.market_summary();
        assert_eq!(summary.total_symbols, 0);
        assert!(summary.avg_close.is_nan());

        let table = table(&[("A", "2024-01-01", 1.0)]);
        let analyzer = StockAnalyzer::new(&table);
        let none: [&str; 0] = [];
        assert!(analyzer.cumulative_returns(&none).is_empty());
        assert!(analyzer.correlation_matrix(&none).is_empty());
    }

    #[test]
    fn unittest_calculators_are_idempotent() {
        let table = table(&[
            ("A", "2024-01-01", 100.0),
            ("A", "2024-01-02", 104.0),
            ("A", "2024-02-01", 101.0),
            ("B", "2024-01-01", 20.0),
            ("B", "2024-01-02", 19.0),
            ("B", "2024-02-01", 22.0),
        ]);
        let analyzer = StockAnalyzer::new(&table);

        assert_eq!(analyzer.symbol_metrics(), analyzer.symbol_metrics());
        assert_eq!(analyzer.volatility(), analyzer.volatility());
        assert_eq!(analyzer.monthly_performance(), analyzer.monthly_performance());
        assert_eq!(
            analyzer.cumulative_returns(&["A", "B"]),
            analyzer.cumulative_returns(&["A", "B"])
        );
        assert_eq!(
            analyzer.correlation_matrix(&["A", "B"]),
            analyzer.correlation_matrix(&["A", "B"])
        );
    }

    #[test]
    fn unittest_market_summary() {
        let table = table(&[
            ("UP", "2024-01-01", 10.0),
            ("UP", "2024-01-02", 20.0),
            ("FLAT", "2024-01-01", 30.0),
            ("ZERO", "2024-01-01", 0.0),
            ("ZERO", "2024-01-02", 40.0),
        ]);

        let summary = StockAnalyzer::new(&table).market_summary();

        assert_eq!(summary.total_symbols, 3);
        assert_eq!(summary.gainers, 1);
        assert_eq!(summary.losers, 2);
        assert_eq!(summary.avg_close, 20.0);
        assert_eq!(summary.avg_volume, 1000.0);
    }
}
