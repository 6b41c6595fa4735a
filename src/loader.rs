use std::{
    collections::HashMap,
    fs::{self, File},
    io::BufReader,
    num::ParseFloatError,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use eyre::{eyre, WrapErr};
use tracing::{debug, info, warn};

use crate::model::{Observation, TimeSeriesTable};

pub trait StockDataLoader {
    fn load(&self, source: &Path) -> eyre::Result<TimeSeriesTable>;
}

/// Reads a directory of `<SYMBOL>.csv` files. Each file needs a header row
/// with `Date`, `Close` and `Volume` columns; other columns are ignored.
#[derive(Default, Debug, Copy, Clone)]
pub struct CsvDirectoryLoader {}

impl StockDataLoader for CsvDirectoryLoader {
    fn load(&self, source: &Path) -> eyre::Result<TimeSeriesTable> {
        if !source.is_dir() {
            eyre::bail!("directory not found: {}", source.display());
        }

        let mut files = fs::read_dir(source)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        files.retain(|path| path.extension().is_some_and(|ext| ext == "csv"));
        files.sort();

        let mut observations = Vec::new();

        for path in &files {
            let symbol = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .ok_or_else(|| eyre!("invalid file name: {}", path.display()))?;

            let rows = load_symbol_file(path, symbol)
                .wrap_err_with(|| format!("failed to load {}", path.display()))?;

            if rows.is_empty() {
                warn!(symbol, "no observations");
            }

            observations.extend(rows);
        }

        info!(
            files = files.len(),
            observations = observations.len(),
            "loaded {}",
            source.display()
        );

        Ok(TimeSeriesTable::new(observations))
    }
}

fn load_symbol_file(path: &Path, symbol: &str) -> eyre::Result<Vec<Observation>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(BufReader::new(File::open(path)?));

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| eyre!("missing {name} column"))
    };
    let (date_ix, close_ix, volume_ix) = (column("Date")?, column("Close")?, column("Volume")?);

    let mut observations = Vec::new();

    for record in reader.records() {
        let record = record?;
        let cell = |ix: usize| record.get(ix).unwrap_or_default();

        // Holes in the close column are non-trading days.
        if cell(close_ix).is_empty() {
            continue;
        }

        let line = record.position().map_or(0, |p| p.line());
        let observation = parse_row(symbol, cell(date_ix), cell(close_ix), cell(volume_ix))
            .wrap_err_with(|| format!("line {line}"))?;
        observations.push(observation);
    }

    Ok(observations)
}

fn parse_row(symbol: &str, date: &str, close: &str, volume: &str) -> eyre::Result<Observation> {
    // Timestamps like `2023-10-03 05:30:00+05:30` keep only the day.
    let day = date.get(..10).unwrap_or(date);

    Ok(Observation {
        symbol: symbol.to_owned(),
        date: NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .wrap_err_with(|| format!("bad date {date:?}"))?,
        close: parse_number(close).wrap_err_with(|| format!("bad close {close:?}"))?,
        volume: parse_number(volume).wrap_err_with(|| format!("bad volume {volume:?}"))?,
    })
}

/// Accepts thousands separators such as `1,234`.
fn parse_number(cell: &str) -> Result<f64, ParseFloatError> {
    cell.replace(',', "").parse()
}

/// Loaded tables keyed by source location. Entries live until they are
/// invalidated or the cache is cleared.
pub struct TableCache<L> {
    loader: L,
    entries: HashMap<PathBuf, Arc<TimeSeriesTable>>,
}

impl<L: StockDataLoader> TableCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, source: impl AsRef<Path>) -> eyre::Result<Arc<TimeSeriesTable>> {
        let source = source.as_ref();

        if let Some(table) = self.entries.get(source) {
            debug!(source = %source.display(), "table cache hit");
            return Ok(Arc::clone(table));
        }

        let table = Arc::new(self.loader.load(source)?);
        self.entries.insert(source.to_path_buf(), Arc::clone(&table));

        Ok(table)
    }

    /// Returns whether an entry was dropped.
    pub fn invalidate(&mut self, source: impl AsRef<Path>) -> bool {
        self.entries.remove(source.as_ref()).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
