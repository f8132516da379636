use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::indicators::IndicatorRow;

pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const RSI_OVERSOLD: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Uptrend,
    Downtrend,
}

impl Trend {
    /// Uptrend only when the fast average is strictly above the slow one.
    pub fn classify(sma_50: f64, sma_200: f64) -> Self {
        if sma_50 > sma_200 {
            Trend::Uptrend
        } else {
            Trend::Downtrend
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Trend::Uptrend => "Uptrend",
            Trend::Downtrend => "Downtrend",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Momentum {
    Overbought,
    Oversold,
    Neutral,
}

impl Momentum {
    /// The 70 and 30 boundaries themselves read as neutral.
    pub fn classify(rsi_14: f64) -> Self {
        if rsi_14 > RSI_OVERBOUGHT {
            Momentum::Overbought
        } else if rsi_14 < RSI_OVERSOLD {
            Momentum::Oversold
        } else {
            Momentum::Neutral
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Momentum::Overbought => "Overbought",
            Momentum::Oversold => "Oversold",
            Momentum::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for Momentum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An indicator row with every field defined, plus its rule-based labels.
/// Field names serialize to the report column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledRow {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Open")]
    pub open: f64,
    #[serde(rename = "High")]
    pub high: f64,
    #[serde(rename = "Low")]
    pub low: f64,
    #[serde(rename = "Close")]
    pub close: f64,
    #[serde(rename = "Volume")]
    pub volume: f64,
    #[serde(rename = "SMA_50")]
    pub sma_50: f64,
    #[serde(rename = "SMA_200")]
    pub sma_200: f64,
    #[serde(rename = "RSI_14")]
    pub rsi_14: f64,
    #[serde(rename = "BB_UPPER")]
    pub bb_upper: f64,
    #[serde(rename = "BB_MID")]
    pub bb_mid: f64,
    #[serde(rename = "BB_LOWER")]
    pub bb_lower: f64,
    #[serde(rename = "Trend")]
    pub trend: Trend,
    #[serde(rename = "Momentum")]
    pub momentum: Momentum,
}

/// Labels a row, or `None` when any indicator is still undefined.
pub fn label_row(row: &IndicatorRow) -> Option<LabeledRow> {
    let sma_50 = row.sma_50?;
    let sma_200 = row.sma_200?;
    let rsi_14 = row.rsi_14?;
    let bb_mid = row.bb_mid?;
    let bb_upper = row.bb_upper?;
    let bb_lower = row.bb_lower?;
    let bar = &row.bar;
    Some(LabeledRow {
        date: bar.date,
        ticker: bar.ticker.clone(),
        open: bar.open,
        high: bar.high,
        low: bar.low,
        close: bar.close,
        volume: bar.volume,
        sma_50,
        sma_200,
        rsi_14,
        bb_upper,
        bb_mid,
        bb_lower,
        trend: Trend::classify(sma_50, sma_200),
        momentum: Momentum::classify(rsi_14),
    })
}

/// Drops rows with any undefined indicator and labels the rest.
pub fn label_history(rows: &[IndicatorRow]) -> Vec<LabeledRow> {
    rows.iter().filter_map(label_row).collect()
}

/// The most recent `limit` labeled rows.
pub fn report_window(labeled: &[LabeledRow], limit: usize) -> &[LabeledRow] {
    &labeled[labeled.len().saturating_sub(limit)..]
}
