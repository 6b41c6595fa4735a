use std::path::PathBuf;

use clap::Parser;
use eyre::WrapErr;
use stock_analytics::{
    loader::{CsvDirectoryLoader, StockDataLoader},
    model::MonthKey,
    report::{Report, ReportConfig},
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Daily stock analytics over a directory of `<SYMBOL>.csv` files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding one CSV file per symbol.
    #[arg(long)]
    data_dir: PathBuf,

    /// JSON file overriding the report sizes.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Month for the monthly movers (format: YYYY-MM). Defaults to the newest.
    #[arg(long)]
    month: Option<String>,
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ReportConfig::from_json_file(path)?,
        None => ReportConfig::default(),
    };
    if let Some(month) = &args.month {
        let month = month.parse::<MonthKey>().wrap_err("invalid --month")?;
        config = config.with_month(month);
    }

    let table = CsvDirectoryLoader::default().load(&args.data_dir)?;

    if table.is_empty() {
        warn!("no data found in {}", args.data_dir.display());
    }

    let report = Report::build(&table, &config);
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
