use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{info, warn};

use crate::config::Config;
use crate::data::{PriceBar, PriceBook};
use crate::error::AnalysisError;
use crate::feature::{FeatureProvider, FeatureTable, extra_columns};
use crate::indicators::{SMA_SLOW_WINDOW, compute_indicators};
use crate::labels::{LabeledRow, label_history, report_window};
use crate::prediction::{AnalysisResult, predict};
use crate::trainer::{ModelSummary, ModelTrainer};

/// Everything produced for one ticker.
#[derive(Debug, Clone)]
pub struct TickerAnalysis {
    pub ticker: String,
    /// Most recent `report_rows` labeled rows.
    pub history: Vec<LabeledRow>,
    pub result: AnalysisResult,
    pub model: Option<ModelSummary>,
    /// Why no model was trained, when training was skipped.
    pub model_issue: Option<AnalysisError>,
}

/// Runs the indicator, labeling, training and prediction stages per ticker.
///
/// Tickers share no state, so [`TrendAnalyzer::analyze_all`] fans them out
/// across the worker pool; the hyper-parameter search inside each ticker
/// runs on the same pool.
pub struct TrendAnalyzer {
    config: Config,
    trainer: ModelTrainer,
    provider: Option<Arc<dyn FeatureProvider>>,
    pool: ThreadPool,
    feature_source_logged: OnceLock<()>,
}

impl TrendAnalyzer {
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("Invalid analysis configuration")?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.n_workers)
            .build()
            .context("Failed to build worker pool")?;
        let trainer = ModelTrainer::new(config.training.clone(), config.min_training_rows);
        Ok(Self {
            config,
            trainer,
            provider: None,
            pool,
            feature_source_logged: OnceLock::new(),
        })
    }

    pub fn with_feature_provider(mut self, provider: Arc<dyn FeatureProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// The labeled report window for `ticker`. A ticker whose history never
    /// fills the longest window yields an empty window, not an error.
    pub fn trend_history(
        &self,
        ticker: &str,
        book: &PriceBook,
    ) -> Result<Vec<LabeledRow>, AnalysisError> {
        let bars = ticker_bars(ticker, book)?;
        let labeled = label_history(&compute_indicators(bars));
        if labeled.is_empty() {
            warn!(
                ticker,
                rows = bars.len(),
                required = SMA_SLOW_WINDOW,
                "No usable rows after dropping undefined indicators"
            );
        }
        Ok(report_window(&labeled, self.config.report_rows).to_vec())
    }

    pub fn analyze(&self, ticker: &str, book: &PriceBook) -> Result<TickerAnalysis, AnalysisError> {
        self.log_feature_source();
        self.pool.install(|| self.analyze_ticker(ticker, book))
    }

    /// Analyses every ticker in first-appearance order. Per-ticker failures
    /// are returned in place and never stop the other tickers.
    pub fn analyze_all(
        &self,
        book: &PriceBook,
    ) -> Vec<(String, Result<TickerAnalysis, AnalysisError>)> {
        self.log_feature_source();
        info!(
            tickers = book.tickers().len(),
            workers = self.worker_count(),
            "Analyzing tickers"
        );
        self.pool.install(|| {
            book.tickers()
                .par_iter()
                .map(|ticker| (ticker.clone(), self.analyze_ticker(ticker, book)))
                .collect()
        })
    }

    fn analyze_ticker(&self, ticker: &str, book: &PriceBook) -> Result<TickerAnalysis, AnalysisError> {
        let bars = ticker_bars(ticker, book)?;
        let rows = compute_indicators(bars);
        let labeled = label_history(&rows);
        if labeled.is_empty() {
            return Err(AnalysisError::InsufficientHistory {
                ticker: ticker.to_string(),
                available: bars.len(),
                required: SMA_SLOW_WINDOW,
            });
        }

        let extras = extra_columns(self.provider.as_deref(), ticker, bars);
        let table = FeatureTable::build(&rows, extras);
        let training = table.training_set(self.config.forward_horizon);

        let (model, model_issue) = match self.trainer.train(ticker, &training) {
            Ok(model) => (Some(model), None),
            Err(err) if err.is_data_condition() => {
                warn!(ticker, reason = %err, "Skipping model; prediction falls back to N/A");
                (None, Some(err))
            }
            Err(err) => return Err(err),
        };

        let result = predict(ticker, &rows, &table, model.as_ref())?;
        Ok(TickerAnalysis {
            ticker: ticker.to_string(),
            history: report_window(&labeled, self.config.report_rows).to_vec(),
            result,
            model: model.map(|model| model.summary()),
            model_issue,
        })
    }

    /// Reports the feature source on the first analysis only; returns whether
    /// this call logged.
    fn log_feature_source(&self) -> bool {
        if self.feature_source_logged.set(()).is_err() {
            return false;
        }
        match &self.provider {
            Some(provider) => info!(provider = provider.name(), "Using extended feature set"),
            None => warn!("No feature provider configured; training on SMA_50, SMA_200 and RSI_14 only"),
        }
        true
    }
}

fn ticker_bars<'a>(ticker: &str, book: &'a PriceBook) -> Result<&'a [PriceBar], AnalysisError> {
    book.bars(ticker)
        .filter(|bars| !bars.is_empty())
        .ok_or_else(|| AnalysisError::NoData {
            ticker: ticker.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_source_is_reported_once_per_analyzer() {
        let analyzer = TrendAnalyzer::new(Config::default()).unwrap();
        let book = PriceBook::from_bars(Vec::new());
        assert!(analyzer.analyze("AAA", &book).is_err());
        assert!(analyzer.analyze("BBB", &book).is_err());
        assert!(!analyzer.log_feature_source());
        analyzer.analyze_all(&book);
        assert!(!analyzer.log_feature_source());

        let fresh = TrendAnalyzer::new(Config::default()).unwrap();
        assert!(fresh.log_feature_source());
        assert!(!fresh.log_feature_source());
    }
}
