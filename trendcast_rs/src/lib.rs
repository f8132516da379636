pub mod config;
pub mod data;
pub mod error;
pub mod feature;
pub mod forest;
pub mod indicators;
pub mod labels;
pub mod pipeline;
pub mod prediction;
pub mod trainer;

pub use config::{Config, TrainingConfig};
pub use data::{PriceBar, PriceBook, PriceRecord};
pub use error::AnalysisError;
pub use feature::{FeatureName, FeatureProvider, FeatureTable, FeatureVector, TrainingSet};
pub use forest::{ForestParams, RandomForest};
pub use indicators::IndicatorRow;
pub use labels::{LabeledRow, Momentum, Trend};
pub use pipeline::{TickerAnalysis, TrendAnalyzer};
pub use prediction::{AnalysisRecord, AnalysisResult, ShortTermPrediction};
pub use trainer::{ModelSummary, ModelTrainer, TrainedModel};
