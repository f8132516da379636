//! Technical-analysis feature provider: MACD (12/26), ATR (14, Wilder) and
//! slow stochastic %K (14/3), computed from each ticker's OHLC bars.

pub mod oscillators;

use anyhow::{Result, ensure};
use tracing::debug;
use trendcast_rs::{FeatureName, FeatureProvider, PriceBar};

use crate::oscillators::{ATR_PERIOD, STOCH_PERIOD, STOCH_SMOOTH, atr, macd_line, stochastic_k};

#[derive(Debug, Clone, Copy, Default)]
pub struct TaFeatureProvider;

impl TaFeatureProvider {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureProvider for TaFeatureProvider {
    fn name(&self) -> &str {
        "trendcast_ta"
    }

    fn columns(&self, bars: &[PriceBar]) -> Result<Vec<(FeatureName, Vec<f64>)>> {
        ensure!(
            bars.windows(2).all(|pair| pair[0].date <= pair[1].date),
            "bars must be sorted by date"
        );
        let close: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        let high: Vec<f64> = bars.iter().map(|bar| bar.high).collect();
        let low: Vec<f64> = bars.iter().map(|bar| bar.low).collect();

        let columns = vec![
            (FeatureName::Macd, macd_line(&close)),
            (FeatureName::Atr, atr(&high, &low, &close, ATR_PERIOD)),
            (
                FeatureName::StochK,
                stochastic_k(&close, &high, &low, STOCH_PERIOD, STOCH_SMOOTH),
            ),
        ];
        debug!(bars = bars.len(), columns = columns.len(), "Computed oscillator columns");
        Ok(columns)
    }
}
