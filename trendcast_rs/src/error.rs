use thiserror::Error;

use crate::feature::FeatureName;

/// Per-ticker outcomes that stop short of a full analysis.
///
/// The first three variants are data conditions: callers report them and move
/// on to the next ticker. `FeatureMismatch` means a model was applied to a
/// feature vector it was not trained on, which is a programming error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error("no data found for ticker {ticker}")]
    NoData { ticker: String },

    #[error("not enough historical data for {ticker}: {available} usable rows, {required} required")]
    InsufficientHistory {
        ticker: String,
        available: usize,
        required: usize,
    },

    #[error("training data for {ticker} cannot be fit: {reason}")]
    DegenerateTraining { ticker: String, reason: String },

    #[error("model trained on [{}] applied to feature vector [{}]", join_names(.expected), join_names(.found))]
    FeatureMismatch {
        expected: Vec<FeatureName>,
        found: Vec<FeatureName>,
    },
}

impl AnalysisError {
    pub fn is_data_condition(&self) -> bool {
        !matches!(self, AnalysisError::FeatureMismatch { .. })
    }

    pub fn ticker(&self) -> Option<&str> {
        match self {
            AnalysisError::NoData { ticker }
            | AnalysisError::InsufficientHistory { ticker, .. }
            | AnalysisError::DegenerateTraining { ticker, .. } => Some(ticker),
            AnalysisError::FeatureMismatch { .. } => None,
        }
    }
}

fn join_names(names: &[FeatureName]) -> String {
    names
        .iter()
        .map(|name| name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_feature_mismatch_is_a_contract_violation() {
        let no_data = AnalysisError::NoData {
            ticker: "AAA".to_string(),
        };
        assert!(no_data.is_data_condition());
        assert_eq!(no_data.ticker(), Some("AAA"));

        let mismatch = AnalysisError::FeatureMismatch {
            expected: vec![FeatureName::Sma50, FeatureName::Rsi14],
            found: vec![FeatureName::Sma50],
        };
        assert!(!mismatch.is_data_condition());
        assert_eq!(
            mismatch.to_string(),
            "model trained on [SMA_50, RSI_14] applied to feature vector [SMA_50]"
        );
    }
}
