use std::collections::HashMap;
use std::fmt;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::PriceBar;
use crate::indicators::IndicatorRow;

/// Model input columns, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureName {
    Sma50,
    Sma200,
    Rsi14,
    /// MACD line, 12/26 EMA spread.
    Macd,
    /// Average true range over 14 bars, Wilder smoothed.
    Atr,
    /// Stochastic %K over 14 bars, smoothed over 3.
    StochK,
}

impl FeatureName {
    pub const CANONICAL: [FeatureName; 6] = [
        FeatureName::Sma50,
        FeatureName::Sma200,
        FeatureName::Rsi14,
        FeatureName::Macd,
        FeatureName::Atr,
        FeatureName::StochK,
    ];

    /// Columns the indicator engine always produces.
    pub const BASE: [FeatureName; 3] = [FeatureName::Sma50, FeatureName::Sma200, FeatureName::Rsi14];

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureName::Sma50 => "SMA_50",
            FeatureName::Sma200 => "SMA_200",
            FeatureName::Rsi14 => "RSI_14",
            FeatureName::Macd => "MACD_12_26_9",
            FeatureName::Atr => "ATRr_14",
            FeatureName::StochK => "STOCHk_14_3_3",
        }
    }

    pub fn is_base(self) -> bool {
        Self::BASE.contains(&self)
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of additional per-bar indicator columns.
///
/// Returned columns must be aligned with `bars` (same length, same order) and
/// use `NaN` for positions without enough history.
pub trait FeatureProvider: Send + Sync {
    fn name(&self) -> &str;

    fn columns(&self, bars: &[PriceBar]) -> Result<Vec<(FeatureName, Vec<f64>)>>;
}

/// Runs the optional provider for one ticker. Any failure degrades to the base
/// feature set instead of failing the analysis.
pub fn extra_columns(
    provider: Option<&dyn FeatureProvider>,
    ticker: &str,
    bars: &[PriceBar],
) -> Vec<(FeatureName, Vec<f64>)> {
    let Some(provider) = provider else {
        return Vec::new();
    };
    let columns = match provider.columns(bars) {
        Ok(columns) => columns,
        Err(err) => {
            warn!(
                ticker,
                provider = provider.name(),
                error = %err,
                "Feature provider failed; continuing with the base feature set"
            );
            return Vec::new();
        }
    };
    columns
        .into_iter()
        .filter(|(name, values)| {
            if name.is_base() {
                warn!(ticker, feature = %name, "Ignoring provider column that shadows a base feature");
                return false;
            }
            if values.len() != bars.len() {
                warn!(
                    ticker,
                    feature = %name,
                    expected = bars.len(),
                    actual = values.len(),
                    "Ignoring misaligned provider column"
                );
                return false;
            }
            true
        })
        .collect()
}

/// An ordered set of feature values for one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    names: Vec<FeatureName>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(names: Vec<FeatureName>, values: Vec<f64>) -> Self {
        Self { names, values }
    }

    pub fn names(&self) -> &[FeatureName] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub values: Vec<f64>,
    /// Close `forward_horizon` sessions later is strictly higher.
    pub target: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    names: Vec<FeatureName>,
    rows: Vec<FeatureRow>,
}

impl TrainingSet {
    pub fn new(names: Vec<FeatureName>, rows: Vec<FeatureRow>) -> Self {
        Self { names, rows }
    }

    pub fn names(&self) -> &[FeatureName] {
        &self.names
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(down, up)` target counts.
    pub fn class_counts(&self) -> (usize, usize) {
        let up = self.rows.iter().filter(|row| row.target).count();
        (self.rows.len() - up, up)
    }
}

/// Column-oriented feature view of one ticker's full indicator history.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    names: Vec<FeatureName>,
    columns: Vec<Vec<f64>>,
    close: Vec<f64>,
    dates: Vec<NaiveDate>,
}

impl FeatureTable {
    /// Selects the canonical features that are actually present: the base
    /// three from `rows`, plus whatever `extras` supplies. `extras` is
    /// expected to come from [`extra_columns`], which already drops
    /// misaligned and base-shadowing columns.
    pub fn build(rows: &[IndicatorRow], extras: Vec<(FeatureName, Vec<f64>)>) -> Self {
        let mut available: HashMap<FeatureName, Vec<f64>> = HashMap::new();
        available.insert(FeatureName::Sma50, base_column(rows, |row| row.sma_50));
        available.insert(FeatureName::Sma200, base_column(rows, |row| row.sma_200));
        available.insert(FeatureName::Rsi14, base_column(rows, |row| row.rsi_14));
        available.extend(extras);

        let mut names = Vec::new();
        let mut columns = Vec::new();
        for name in FeatureName::CANONICAL {
            if let Some(values) = available.remove(&name) {
                names.push(name);
                columns.push(values);
            }
        }

        Self {
            names,
            columns,
            close: rows.iter().map(IndicatorRow::close).collect(),
            dates: rows.iter().map(IndicatorRow::date).collect(),
        }
    }

    pub fn names(&self) -> &[FeatureName] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Feature values at `index`, or `None` when any of them is undefined.
    pub fn vector_at(&self, index: usize) -> Option<FeatureVector> {
        if index >= self.len() {
            return None;
        }
        let values: Vec<f64> = self.columns.iter().map(|column| column[index]).collect();
        values
            .iter()
            .all(|value| value.is_finite())
            .then(|| FeatureVector::new(self.names.clone(), values))
    }

    /// Rows with every feature and the forward target defined.
    pub fn training_set(&self, horizon: usize) -> TrainingSet {
        let targets = forward_target(&self.close, horizon);
        let rows = targets
            .iter()
            .enumerate()
            .filter_map(|(i, target)| {
                let target = (*target)?;
                let vector = self.vector_at(i)?;
                Some(FeatureRow {
                    date: self.dates[i],
                    values: vector.values,
                    target,
                })
            })
            .collect();
        TrainingSet::new(self.names.clone(), rows)
    }
}

fn base_column(rows: &[IndicatorRow], field: impl Fn(&IndicatorRow) -> Option<f64>) -> Vec<f64> {
    rows.iter().map(|row| field(row).unwrap_or(f64::NAN)).collect()
}

/// Close `horizon` rows ahead; undefined for the final `horizon` rows.
pub fn future_close(close: &[f64], horizon: usize) -> Vec<Option<f64>> {
    (0..close.len())
        .map(|i| close.get(i + horizon).copied())
        .collect()
}

/// Whether the close `horizon` rows ahead is strictly higher than today's.
pub fn forward_target(close: &[f64], horizon: usize) -> Vec<Option<bool>> {
    future_close(close, horizon)
        .into_iter()
        .zip(close.iter())
        .map(|(future, current)| future.map(|future| future > *current))
        .collect()
}
