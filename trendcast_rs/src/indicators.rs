//! Rolling indicator kernels over a single ticker's close series.
//!
//! Kernels work column-wise on `&[f64]` and mark undefined positions with
//! `NaN`; [`compute_indicators`] turns the columns into [`IndicatorRow`]s with
//! `Option` fields so nothing downstream has to reason about `NaN`.

use chrono::NaiveDate;
use serde::Serialize;

use crate::data::PriceBar;

pub const SMA_FAST_WINDOW: usize = 50;
pub const SMA_SLOW_WINDOW: usize = 200;
pub const RSI_WINDOW: usize = 14;
pub const BOLLINGER_WINDOW: usize = 20;
pub const BOLLINGER_STD_MULT: f64 = 2.0;

/// A price bar plus the indicator values available at that bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorRow {
    #[serde(flatten)]
    pub bar: PriceBar,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub rsi_14: Option<f64>,
    pub bb_mid: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
}

impl IndicatorRow {
    pub fn date(&self) -> NaiveDate {
        self.bar.date
    }

    pub fn close(&self) -> f64 {
        self.bar.close
    }

    /// True once every indicator family has enough trailing history.
    pub fn is_complete(&self) -> bool {
        self.sma_50.is_some()
            && self.sma_200.is_some()
            && self.rsi_14.is_some()
            && self.bb_mid.is_some()
            && self.bb_upper.is_some()
            && self.bb_lower.is_some()
    }
}

/// Computes the full indicator set for an ordered single-ticker series. The
/// output has one row per input bar; leading rows carry `None` until the
/// corresponding window fills.
pub fn compute_indicators(bars: &[PriceBar]) -> Vec<IndicatorRow> {
    let close: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
    let sma_50 = simple_moving_average(&close, SMA_FAST_WINDOW);
    let sma_200 = simple_moving_average(&close, SMA_SLOW_WINDOW);
    let rsi_14 = relative_strength_index(&close, RSI_WINDOW);
    let bands = bollinger_bands(&close, BOLLINGER_WINDOW, BOLLINGER_STD_MULT);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| IndicatorRow {
            bar: bar.clone(),
            sma_50: defined(sma_50[i]),
            sma_200: defined(sma_200[i]),
            rsi_14: defined(rsi_14[i]),
            bb_mid: defined(bands.mid[i]),
            bb_upper: defined(bands.upper[i]),
            bb_lower: defined(bands.lower[i]),
        })
        .collect()
}

pub(crate) fn defined(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Trailing arithmetic mean. Undefined for the first `window - 1` positions
/// and for any window containing an undefined value.
pub fn simple_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if window == 0 || window > values.len() {
        return result;
    }
    for (offset, slice) in values.windows(window).enumerate() {
        if slice.iter().all(|value| value.is_finite()) {
            result[offset + window - 1] = slice.iter().sum::<f64>() / window as f64;
        }
    }
    result
}

/// Trailing sample standard deviation (denominator `window - 1`).
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if window < 2 || window > values.len() {
        return result;
    }
    let mean = simple_moving_average(values, window);
    for (offset, slice) in values.windows(window).enumerate() {
        let i = offset + window - 1;
        let mean_val = mean[i];
        if !mean_val.is_finite() {
            continue;
        }
        let variance_sum = slice.iter().map(|x| (x - mean_val).powi(2)).sum::<f64>();
        result[i] = (variance_sum / (window - 1) as f64).sqrt();
    }
    result
}

/// Momentum oscillator from trailing simple averages of gains and losses.
///
/// A window with losses but no gains reads 0, gains but no losses saturates
/// at 100, and a window with no movement at all is undefined.
pub fn relative_strength_index(values: &[f64], window: usize) -> Vec<f64> {
    let len = values.len();
    let mut gains = vec![f64::NAN; len];
    let mut losses = vec![f64::NAN; len];
    for i in 1..len {
        let delta = values[i] - values[i - 1];
        gains[i] = delta.max(0.0);
        losses[i] = (-delta).max(0.0);
    }

    let avg_gain = simple_moving_average(&gains, window);
    let avg_loss = simple_moving_average(&losses, window);
    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(&gain, &loss)| {
            if !gain.is_finite() || !loss.is_finite() {
                f64::NAN
            } else if loss == 0.0 {
                if gain > 0.0 { 100.0 } else { f64::NAN }
            } else {
                100.0 - 100.0 / (1.0 + gain / loss)
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub mid: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger_bands(values: &[f64], window: usize, std_mult: f64) -> BollingerBands {
    let mid = simple_moving_average(values, window);
    let std = rolling_std(values, window);
    let upper = mid
        .iter()
        .zip(std.iter())
        .map(|(m, s)| m + s * std_mult)
        .collect();
    let lower = mid
        .iter()
        .zip(std.iter())
        .map(|(m, s)| m - s * std_mult)
        .collect();
    BollingerBands { mid, upper, lower }
}
