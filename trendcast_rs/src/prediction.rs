use std::fmt;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::error::AnalysisError;
use crate::feature::FeatureTable;
use crate::indicators::{IndicatorRow, SMA_SLOW_WINDOW};
use crate::labels::Trend;
use crate::trainer::TrainedModel;

pub const NOT_AVAILABLE: &str = "N/A";

/// Direction call for the close `forward_horizon` sessions ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortTermPrediction {
    LikelyUp,
    LikelyDown,
    /// No model, or the latest row lacks a feature the model needs.
    NotAvailable,
}

impl ShortTermPrediction {
    pub fn as_str(self) -> &'static str {
        match self {
            ShortTermPrediction::LikelyUp => "Likely Up",
            ShortTermPrediction::LikelyDown => "Likely Down",
            ShortTermPrediction::NotAvailable => NOT_AVAILABLE,
        }
    }
}

impl fmt::Display for ShortTermPrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub ticker: String,
    pub last_updated_date: NaiveDate,
    pub last_close_price: f64,
    pub long_term_outlook: Trend,
    pub short_term_prediction: ShortTermPrediction,
    /// Band edge in the predicted direction, clamped at zero.
    pub price_target: Option<f64>,
}

/// Report-ready rendering of an [`AnalysisResult`]: prices as two-decimal
/// strings, missing values as `"N/A"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRecord {
    pub ticker: String,
    pub last_updated_date: String,
    pub last_close_price: String,
    pub long_term_outlook: String,
    #[serde(rename = "short_term_prediction_5D")]
    pub short_term_prediction: String,
    #[serde(rename = "prediction_price_target")]
    pub price_target: String,
}

impl AnalysisResult {
    pub fn to_record(&self) -> AnalysisRecord {
        AnalysisRecord {
            ticker: self.ticker.clone(),
            last_updated_date: self.last_updated_date.format("%Y-%m-%d").to_string(),
            last_close_price: format!("{:.2}", self.last_close_price),
            long_term_outlook: self.long_term_outlook.to_string(),
            short_term_prediction: self.short_term_prediction.to_string(),
            price_target: self
                .price_target
                .map_or_else(|| NOT_AVAILABLE.to_string(), |target| format!("{target:.2}")),
        }
    }
}

impl AnalysisRecord {
    /// `(key, value)` pairs in output order, keyed like the JSON form.
    pub fn fields(&self) -> [(&'static str, &str); 6] {
        [
            ("ticker", self.ticker.as_str()),
            ("last_updated_date", self.last_updated_date.as_str()),
            ("last_close_price", self.last_close_price.as_str()),
            ("long_term_outlook", self.long_term_outlook.as_str()),
            ("short_term_prediction_5D", self.short_term_prediction.as_str()),
            ("prediction_price_target", self.price_target.as_str()),
        ]
    }
}

impl Serialize for AnalysisResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

/// Builds the analysis for the most recent fully-defined indicator row.
///
/// `features` must be built from the same `rows`. A missing model, or a
/// latest row whose feature vector is incomplete, yields the rule-based
/// outlook with `N/A` for the prediction and target.
pub fn predict(
    ticker: &str,
    rows: &[IndicatorRow],
    features: &FeatureTable,
    model: Option<&TrainedModel>,
) -> Result<AnalysisResult, AnalysisError> {
    if rows.is_empty() {
        return Err(AnalysisError::NoData {
            ticker: ticker.to_string(),
        });
    }
    let Some(index) = rows.iter().rposition(IndicatorRow::is_complete) else {
        return Err(AnalysisError::InsufficientHistory {
            ticker: ticker.to_string(),
            available: rows.len(),
            required: SMA_SLOW_WINDOW,
        });
    };
    let latest = &rows[index];
    let (Some(sma_50), Some(sma_200), Some(bb_upper), Some(bb_lower)) =
        (latest.sma_50, latest.sma_200, latest.bb_upper, latest.bb_lower)
    else {
        return Err(AnalysisError::InsufficientHistory {
            ticker: ticker.to_string(),
            available: rows.len(),
            required: SMA_SLOW_WINDOW,
        });
    };

    let direction = match (model, features.vector_at(index)) {
        (Some(model), Some(vector)) => Some(model.classify(&vector)?),
        _ => None,
    };
    let (short_term_prediction, price_target) = match direction {
        Some(true) => (ShortTermPrediction::LikelyUp, Some(bb_upper.max(0.0))),
        Some(false) => (ShortTermPrediction::LikelyDown, Some(bb_lower.max(0.0))),
        None => (ShortTermPrediction::NotAvailable, None),
    };

    Ok(AnalysisResult {
        ticker: ticker.to_string(),
        last_updated_date: latest.date(),
        last_close_price: latest.close(),
        long_term_outlook: Trend::classify(sma_50, sma_200),
        short_term_prediction,
        price_target,
    })
}
