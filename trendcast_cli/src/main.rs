mod cli;
mod report;

use std::fs::OpenOptions;
use std::path::PathBuf;
#[cfg(feature = "ta")]
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_appender::non_blocking;
use tracing_subscriber::{EnvFilter, prelude::*};

use cli::{Cli, Commands, PredictArgs, TrendsArgs};
use trendcast_rs::{AnalysisError, PriceBook, TickerAnalysis, TrendAnalyzer};

fn init_tracing(log_file: Option<&PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Reports go to stdout; keep logs on stderr.
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
        let (non_blocking_writer, guard) = non_blocking(file);
        // Leak the guard so the writer flushes for the life of the process.
        let _guard = Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking_writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

fn log_invocation(log_file: Option<&PathBuf>) {
    let cwd = std::env::current_dir().ok();
    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    info!("==================== new trendcast run ====================");
    info!(
        version = env!("CARGO_PKG_VERSION"),
        cwd = ?cwd,
        log_file = ?log_file,
        argv = ?argv,
        "trendcast invoked"
    );
}

/// Requested tickers in the order given, or every ticker in the book.
fn selected_tickers(requested: &[String], book: &PriceBook) -> Vec<String> {
    if requested.is_empty() {
        book.tickers().to_vec()
    } else {
        requested.to_vec()
    }
}

fn run_trends(args: TrendsArgs) -> Result<()> {
    let config = args.into_config()?;
    let book = PriceBook::load(&args.common.csv_path)?;
    let analyzer = TrendAnalyzer::new(config)?;

    let mut document = Map::new();
    for ticker in selected_tickers(&args.common.tickers, &book) {
        println!("--- Processed Data for {ticker} ---");
        match analyzer.trend_history(&ticker, &book) {
            Ok(rows) => {
                let value = report::history_value(&rows)?;
                println!("{value}");
                document.insert(ticker, value);
            }
            Err(err) => {
                warn!(ticker = %ticker, reason = %err, "Skipping ticker");
                println!("Could not process data: {err}");
            }
        }
        println!();
    }

    if let Some(path) = &args.common.output {
        report::write_document(path, &document)?;
        info!(path = %path.display(), tickers = document.len(), "Wrote indicator histories");
    }
    Ok(())
}

fn build_analyzer(args: &PredictArgs) -> Result<TrendAnalyzer> {
    let analyzer = TrendAnalyzer::new(args.into_config()?)?;
    #[cfg(feature = "ta")]
    if !args.no_ta {
        return Ok(analyzer.with_feature_provider(Arc::new(trendcast_ta::TaFeatureProvider::new())));
    }
    Ok(analyzer)
}

fn run_predict(args: PredictArgs) -> Result<()> {
    let book = PriceBook::load(&args.common.csv_path)?;
    let analyzer = build_analyzer(&args)?;

    let results: Vec<(String, Result<TickerAnalysis, AnalysisError>)> =
        if args.common.tickers.is_empty() {
            analyzer.analyze_all(&book)
        } else {
            args.common
                .tickers
                .iter()
                .map(|ticker| (ticker.clone(), analyzer.analyze(ticker, &book)))
                .collect()
        };

    if !args.json {
        println!("Analyzing {} stocks from your complete dataset...\n", results.len());
    }

    let mut document = Map::new();
    let mut violations = Vec::new();
    for (ticker, outcome) in &results {
        if !args.json {
            println!("--- Analysis for: {ticker} ---");
            match outcome {
                Ok(analysis) => {
                    for line in report::analysis_lines(analysis) {
                        println!("{line}");
                    }
                }
                Err(err) => println!("  Could not generate analysis: {err}"),
            }
            println!("{}\n", "-".repeat(30));
        }
        if let Err(err) = outcome {
            if !err.is_data_condition() {
                violations.push(format!("{ticker}: {err}"));
            }
        }
        document.insert(ticker.clone(), report::analysis_value(outcome)?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&Value::Object(document.clone()))?);
    }
    if let Some(path) = &args.common.output {
        report::write_document(path, &document)?;
        info!(path = %path.display(), tickers = document.len(), "Wrote analyses");
    }
    if !violations.is_empty() {
        bail!("contract violations: {}", violations.join("; "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file())?;
    log_invocation(cli.log_file());

    match cli.command {
        Commands::Trends(args) => run_trends(args),
        Commands::Predict(args) => run_predict(args),
    }
}
