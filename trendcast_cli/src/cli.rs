use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use trendcast_rs::config::{Config, TrainingConfig};

#[derive(Parser, Debug)]
#[command(
    name = "trendcast",
    version,
    about = "Trend labels and short-horizon direction calls from daily OHLCV data"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn log_file(&self) -> Option<&PathBuf> {
        match &self.command {
            Commands::Trends(args) => args.common.log_file.as_ref(),
            Commands::Predict(args) => args.common.log_file.as_ref(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the labeled indicator history for each ticker
    Trends(TrendsArgs),
    /// Train a direction model per ticker and print the analysis
    Predict(PredictArgs),
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Path to the input CSV file (Date,Ticker,Open,High,Low,Close,Volume)
    #[arg(long = "csv", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub csv_path: PathBuf,

    /// Restrict output to this ticker; repeat for several. Defaults to every
    /// ticker in the file, in order of first appearance.
    #[arg(long = "ticker", value_name = "TICKER")]
    pub tickers: Vec<String>,

    /// Also write the JSON document (keyed by ticker) to this file
    #[arg(long = "output", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Number of most recent labeled rows reported per ticker
    #[arg(long = "report-rows", default_value_t = 252)]
    pub report_rows: usize,

    /// Worker threads (0 = one per logical core)
    #[arg(long = "workers", default_value_t = 0)]
    pub workers: usize,

    /// Append logs to this file in addition to stderr
    #[arg(long = "log-file", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,
}

impl CommonArgs {
    fn base_config(&self) -> Config {
        Config {
            report_rows: self.report_rows,
            n_workers: self.workers,
            ..Config::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct TrendsArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl TrendsArgs {
    pub fn into_config(&self) -> Result<Config> {
        let config = self.common.base_config();
        config.validate().context("Invalid trends options")?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Print the analyses as one JSON document instead of text
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Seed for the held-out split, bootstrap draws and feature sampling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Tree counts to search (comma separated)
    #[arg(long = "grid-trees", value_delimiter = ',', default_values_t = [100usize, 200])]
    pub grid_trees: Vec<usize>,

    /// Maximum tree depths to search (comma separated; "none" for unbounded)
    #[arg(long = "grid-depths", value_delimiter = ',', default_values = ["10", "20", "none"])]
    pub grid_depths: Vec<DepthValue>,

    /// Cross-validation folds used to rank candidates
    #[arg(long = "cv-folds", default_value_t = 3)]
    pub cv_folds: usize,

    /// Share of rows held out for the accuracy diagnostic
    #[arg(long = "test-fraction", default_value_t = 0.2)]
    pub test_fraction: f64,

    /// Train on SMA_50, SMA_200 and RSI_14 only, without the oscillator provider
    #[arg(long = "no-ta", default_value_t = false)]
    pub no_ta: bool,
}

impl PredictArgs {
    pub fn into_config(&self) -> Result<Config> {
        let config = Config {
            training: TrainingConfig {
                test_fraction: self.test_fraction,
                cv_folds: self.cv_folds,
                seed: self.seed,
                tree_counts: self.grid_trees.clone(),
                max_depths: self.grid_depths.iter().map(|depth| depth.0).collect(),
            },
            ..self.common.base_config()
        };
        config.validate().context("Invalid predict options")?;
        Ok(config)
    }
}

/// A `--grid-depths` entry: a positive depth or `none`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthValue(pub Option<usize>);

impl FromStr for DepthValue {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("none") || raw.eq_ignore_ascii_case("unbounded") {
            return Ok(DepthValue(None));
        }
        match raw.parse::<usize>() {
            Ok(0) => Err("depth must be at least 1".to_string()),
            Ok(depth) => Ok(DepthValue(Some(depth))),
            Err(_) => Err(format!("expected a positive depth or 'none', got '{raw}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_defaults_match_the_library_defaults() {
        let cli = Cli::try_parse_from(["trendcast", "predict", "--csv", "prices.csv"]).unwrap();
        let Commands::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        let config = args.into_config().unwrap();
        let defaults = Config::default();
        assert_eq!(config.report_rows, defaults.report_rows);
        assert_eq!(config.training.tree_counts, defaults.training.tree_counts);
        assert_eq!(config.training.max_depths, defaults.training.max_depths);
        assert_eq!(config.training.seed, 42);
    }

    #[test]
    fn grid_flags_parse_lists_and_unbounded_depth() {
        let cli = Cli::try_parse_from([
            "trendcast",
            "predict",
            "--csv",
            "prices.csv",
            "--grid-trees",
            "5,7",
            "--grid-depths",
            "3,none",
            "--ticker",
            "AAA",
            "--ticker",
            "BBB",
        ])
        .unwrap();
        let Commands::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        assert_eq!(args.common.tickers, vec!["AAA", "BBB"]);
        let config = args.into_config().unwrap();
        assert_eq!(config.training.tree_counts, vec![5, 7]);
        assert_eq!(config.training.max_depths, vec![Some(3), None]);
    }

    #[test]
    fn invalid_options_are_rejected() {
        assert!(Cli::try_parse_from(["trendcast", "predict", "--csv", "x.csv", "--grid-depths", "0"]).is_err());

        let cli = Cli::try_parse_from(["trendcast", "predict", "--csv", "x.csv", "--cv-folds", "1"]).unwrap();
        let Commands::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        assert!(args.into_config().is_err());
    }
}
