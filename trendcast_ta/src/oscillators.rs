//! Column kernels behind the extended feature set. Undefined positions are
//! `NaN`, matching the core indicator engine.

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const ATR_PERIOD: usize = 14;
pub const STOCH_PERIOD: usize = 14;
pub const STOCH_SMOOTH: usize = 3;

const NON_ZERO_RANGE_EPS: f64 = f64::EPSILON;

/// Exponential average seeded with the simple mean of the first `period`
/// values.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    let mut result = vec![f64::NAN; len];
    if period == 0 || len < period {
        return result;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = seed;
    let mut prev = seed;
    for i in period..len {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

/// Wilder's running average (`alpha = 1 / period`). Starts at the first
/// finite value and carries the previous value across gaps.
pub fn rma(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    if period == 0 || len == 0 {
        return vec![f64::NAN; len];
    }
    let alpha = 1.0 / period as f64;
    let mut result = vec![f64::NAN; len];
    let mut prev: Option<f64> = None;
    for (idx, &value) in values.iter().enumerate() {
        if !value.is_finite() {
            if let Some(prev_val) = prev {
                result[idx] = prev_val;
            }
            continue;
        }
        let next = match prev {
            Some(prev_val) => alpha * value + (1.0 - alpha) * prev_val,
            None => value,
        };
        result[idx] = next;
        prev = Some(next);
    }
    result
}

fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if period == 0 || period > values.len() {
        return result;
    }
    for (offset, window) in values.windows(period).enumerate() {
        if window.iter().all(|value| value.is_finite()) {
            result[offset + period - 1] = window.iter().sum::<f64>() / period as f64;
        }
    }
    result
}

/// Blanks the first `bars` positions, where a recursive average has not
/// seen enough history to be meaningful.
fn apply_warmup(values: &mut [f64], bars: usize) {
    for value in values.iter_mut().take(bars) {
        *value = f64::NAN;
    }
}

/// MACD line: fast EMA minus slow EMA, defined once the slow EMA is.
pub fn macd_line(close: &[f64]) -> Vec<f64> {
    let fast = ema(close, MACD_FAST);
    let slow = ema(close, MACD_SLOW);
    let mut line: Vec<f64> = fast.iter().zip(slow.iter()).map(|(f, s)| f - s).collect();
    apply_warmup(&mut line, MACD_SLOW - 1);
    line
}

pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let len = close.len();
    let mut tr = vec![f64::NAN; len];
    for i in 1..len {
        let high_low = high[i] - low[i];
        let high_close = (high[i] - close[i - 1]).abs();
        let low_close = (low[i] - close[i - 1]).abs();
        tr[i] = high_low.max(high_close).max(low_close);
    }
    tr
}

/// Average true range, Wilder smoothed. The first `period` bars are
/// undefined.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let mut result = rma(&true_range(high, low, close), period);
    apply_warmup(&mut result, period);
    result
}

/// Slow stochastic %K: raw %K over `period` bars smoothed by a `smooth`-bar
/// simple average.
pub fn stochastic_k(
    close: &[f64],
    high: &[f64],
    low: &[f64],
    period: usize,
    smooth: usize,
) -> Vec<f64> {
    let len = close.len();
    let mut raw_k = vec![f64::NAN; len];
    if period == 0 {
        return raw_k;
    }
    for i in (period - 1)..len {
        let highest = high[i + 1 - period..=i].iter().cloned().fold(f64::MIN, f64::max);
        let lowest = low[i + 1 - period..=i].iter().cloned().fold(f64::MAX, f64::min);
        let range = highest - lowest;
        if !range.is_finite() {
            continue;
        }
        raw_k[i] = ((close[i] - lowest) / (range + NON_ZERO_RANGE_EPS) * 100.0).clamp(0.0, 100.0);
    }
    sma(&raw_k, smooth)
}
