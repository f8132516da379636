use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::TrainingConfig;
use crate::error::AnalysisError;
use crate::feature::{FeatureName, FeatureVector, TrainingSet};
use crate::forest::{ForestParams, RandomForest};

/// Selects forest hyper-parameters by k-fold cross-validation and refits the
/// winner on the full training partition.
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: TrainingConfig,
    min_rows: usize,
}

/// A fitted classifier plus the diagnostics of how it was chosen.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    forest: RandomForest,
    feature_names: Vec<FeatureName>,
    cv_scores: Vec<(ForestParams, f64)>,
    holdout_accuracy: f64,
    train_rows: usize,
    test_rows: usize,
}

/// Serializable view of a [`TrainedModel`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub features: Vec<String>,
    pub params: ForestParams,
    pub cv_accuracy: f64,
    pub holdout_accuracy: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

struct Partition {
    train: Vec<usize>,
    test: Vec<usize>,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig, min_rows: usize) -> Self {
        Self { config, min_rows }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn train(&self, ticker: &str, set: &TrainingSet) -> Result<TrainedModel, AnalysisError> {
        let n = set.len();
        let required = self.min_rows.max(self.config.cv_folds + 1);
        if n < required {
            return Err(AnalysisError::InsufficientHistory {
                ticker: ticker.to_string(),
                available: n,
                required,
            });
        }
        let (down, up) = set.class_counts();
        if down == 0 || up == 0 {
            return Err(AnalysisError::DegenerateTraining {
                ticker: ticker.to_string(),
                reason: format!("every target row has the same direction ({down} down, {up} up)"),
            });
        }
        let candidates = self.config.candidates();
        if candidates.is_empty() {
            return Err(AnalysisError::DegenerateTraining {
                ticker: ticker.to_string(),
                reason: "the hyper-parameter grid is empty".to_string(),
            });
        }

        let features: Vec<Vec<f64>> = set.rows().iter().map(|row| row.values.clone()).collect();
        let labels: Vec<bool> = set.rows().iter().map(|row| row.target).collect();
        let partition = self.partition(n);
        let train_x = gather(&features, &partition.train);
        let train_y = gather(&labels, &partition.train);

        let cv_scores = self.cross_validate(&candidates, &train_x, &train_y);
        for (params, score) in &cv_scores {
            debug!(ticker, params = %params, cv_accuracy = score, "Scored candidate");
        }
        let (best, best_score) = select_best(&cv_scores).ok_or_else(|| {
            AnalysisError::DegenerateTraining {
                ticker: ticker.to_string(),
                reason: "no candidate produced a score".to_string(),
            }
        })?;

        let forest = RandomForest::fit(best, &train_x, &train_y, self.config.seed);
        let test_x = gather(&features, &partition.test);
        let test_y = gather(&labels, &partition.test);
        let holdout_accuracy = forest.accuracy(&test_x, &test_y);
        info!(
            ticker,
            params = %best,
            cv_accuracy = best_score,
            holdout_accuracy,
            train_rows = train_x.len(),
            test_rows = test_x.len(),
            "Selected forest parameters"
        );

        Ok(TrainedModel {
            forest,
            feature_names: set.names().to_vec(),
            cv_scores,
            holdout_accuracy,
            train_rows: train_x.len(),
            test_rows: test_x.len(),
        })
    }

    /// Seeded shuffle; the first `ceil(test_fraction * n)` indices are held
    /// out, the remainder trains.
    fn partition(&self, n: usize) -> Partition {
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        indices.shuffle(&mut rng);
        let test_len = ((self.config.test_fraction * n as f64).ceil() as usize).min(n - 1);
        let (test, train) = indices.split_at(test_len);
        Partition {
            train: train.to_vec(),
            test: test.to_vec(),
        }
    }

    /// Mean validation accuracy per candidate, in candidate order. Every
    /// (candidate, fold) pair is an independent unit of parallel work.
    fn cross_validate(
        &self,
        candidates: &[ForestParams],
        features: &[Vec<f64>],
        labels: &[bool],
    ) -> Vec<(ForestParams, f64)> {
        let fold_of = stratified_folds(labels, self.config.cv_folds);
        let n_folds = fold_of.iter().max().map_or(0, |&fold| fold + 1);
        let units: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..n_folds).map(move |f| (c, f)))
            .collect();
        let seed = self.config.seed;

        let scores: Vec<f64> = units
            .par_iter()
            .map(|&(c, f)| {
                let (fit, held): (Vec<usize>, Vec<usize>) =
                    (0..labels.len()).partition(|&row| fold_of[row] != f);
                let forest = RandomForest::fit(
                    candidates[c],
                    &gather(features, &fit),
                    &gather(labels, &fit),
                    seed,
                );
                forest.accuracy(&gather(features, &held), &gather(labels, &held))
            })
            .collect();

        candidates
            .iter()
            .enumerate()
            .map(|(c, params)| {
                let fold_scores = &scores[c * n_folds..(c + 1) * n_folds];
                let mean = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
                (*params, mean)
            })
            .collect()
    }
}

/// Fold index for every row. Each class is dealt to folds in row order so
/// every fold keeps close to the overall up/down ratio; fold sizes differ by
/// at most one.
fn stratified_folds(labels: &[bool], k: usize) -> Vec<usize> {
    let n = labels.len();
    let k = k.clamp(1, n.max(1));
    let down = labels.iter().filter(|&&label| !label).count();

    // Per-fold quota for each class: stride the class-sorted labels across
    // the folds, down rows first.
    let mut quota = vec![[0usize; 2]; k];
    for position in 0..n {
        quota[position % k][usize::from(position >= down)] += 1;
    }

    let mut next_fold = [0usize; 2];
    let mut fold_of = Vec::with_capacity(n);
    for &label in labels {
        let class = usize::from(label);
        while quota[next_fold[class]][class] == 0 {
            next_fold[class] += 1;
        }
        let fold = next_fold[class];
        quota[fold][class] -= 1;
        fold_of.push(fold);
    }
    fold_of
}

/// Highest mean score; the earliest candidate wins ties.
fn select_best(scores: &[(ForestParams, f64)]) -> Option<(ForestParams, f64)> {
    let mut best: Option<(ForestParams, f64)> = None;
    for &(params, score) in scores {
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((params, score));
        }
    }
    best
}

fn gather<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| values[i].clone()).collect()
}

impl TrainedModel {
    pub fn feature_names(&self) -> &[FeatureName] {
        &self.feature_names
    }

    pub fn params(&self) -> ForestParams {
        self.forest.params()
    }

    pub fn cv_scores(&self) -> &[(ForestParams, f64)] {
        &self.cv_scores
    }

    pub fn holdout_accuracy(&self) -> f64 {
        self.holdout_accuracy
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Probability that the close `forward_horizon` sessions ahead is higher.
    pub fn probability_up(&self, vector: &FeatureVector) -> Result<f64, AnalysisError> {
        if vector.names() != self.feature_names.as_slice() {
            return Err(AnalysisError::FeatureMismatch {
                expected: self.feature_names.clone(),
                found: vector.names().to_vec(),
            });
        }
        Ok(self.forest.predict_proba_one(vector.values()))
    }

    pub fn classify(&self, vector: &FeatureVector) -> Result<bool, AnalysisError> {
        Ok(self.probability_up(vector)? > 0.5)
    }

    pub fn summary(&self) -> ModelSummary {
        let params = self.params();
        let cv_accuracy = self
            .cv_scores
            .iter()
            .find(|(candidate, _)| *candidate == params)
            .map_or(0.0, |(_, score)| *score);
        ModelSummary {
            features: self
                .feature_names
                .iter()
                .map(|name| name.as_str().to_string())
                .collect(),
            params,
            cv_accuracy,
            holdout_accuracy: self.holdout_accuracy,
            train_rows: self.train_rows,
            test_rows: self.test_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold_sizes(fold_of: &[usize], k: usize) -> Vec<usize> {
        (0..k).map(|f| fold_of.iter().filter(|&&x| x == f).count()).collect()
    }

    #[test]
    fn folds_cover_every_row_once() {
        let labels: Vec<bool> = (0..10).map(|i| i % 3 == 0).collect();
        let fold_of = stratified_folds(&labels, 3);
        assert_eq!(fold_of.len(), 10);
        let mut sizes = fold_sizes(&fold_of, 3);
        sizes.sort_unstable();
        assert_eq!(sizes, vec![3, 3, 4]);
        assert_eq!(stratified_folds(&[true, false], 3).len(), 2);
        assert!(stratified_folds(&[true, false], 3).iter().all(|&f| f < 2));
    }

    #[test]
    fn folds_keep_the_class_ratio() {
        // Up rows bunched at the front would leave two folds without any.
        let labels: Vec<bool> = (0..120).map(|i| i < 36).collect();
        let fold_of = stratified_folds(&labels, 3);
        let up = labels.iter().filter(|&&label| label).count();
        for fold in 0..3 {
            let members: Vec<usize> = (0..120).filter(|&row| fold_of[row] == fold).collect();
            let fold_up = members.iter().filter(|&&row| labels[row]).count();
            assert_eq!(members.len(), 40);
            let expected = up as f64 * members.len() as f64 / labels.len() as f64;
            assert!((fold_up as f64 - expected).abs() <= 1.0, "fold {fold} has {fold_up} up");
        }

        let uneven: Vec<bool> = (0..101).map(|i| i % 7 == 0 || i > 90).collect();
        let fold_of = stratified_folds(&uneven, 3);
        let up = uneven.iter().filter(|&&label| label).count();
        let sizes = fold_sizes(&fold_of, 3);
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
        for fold in 0..3 {
            let fold_up = (0..101).filter(|&row| fold_of[row] == fold && uneven[row]).count();
            let expected = up as f64 * sizes[fold] as f64 / 101.0;
            assert!((fold_up as f64 - expected).abs() <= 1.0);
        }
    }

    #[test]
    fn single_direction_training_partition_still_fits() {
        use crate::feature::FeatureRow;
        use chrono::{Days, NaiveDate};

        let n = 101;
        let up_row = 50;
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let rows: Vec<FeatureRow> = (0..n)
            .map(|i| FeatureRow {
                date: start + Days::new(i as u64),
                values: vec![i as f64, (i % 9) as f64, (i % 4) as f64],
                target: i == up_row,
            })
            .collect();
        let set = TrainingSet::new(FeatureName::BASE.to_vec(), rows);

        // Find a seed whose held-out share takes the only up row.
        let config = (0..200)
            .map(|seed| TrainingConfig {
                seed,
                tree_counts: vec![5],
                max_depths: vec![Some(3)],
                ..TrainingConfig::default()
            })
            .find(|config| {
                ModelTrainer::new(config.clone(), 10)
                    .partition(n)
                    .test
                    .contains(&up_row)
            })
            .unwrap();
        let model = ModelTrainer::new(config, 10).train("ONE", &set).unwrap();
        let vector = FeatureVector::new(FeatureName::BASE.to_vec(), vec![50.0, 5.0, 2.0]);
        assert!(!model.classify(&vector).unwrap());
        assert_eq!(model.summary().test_rows, 21);
    }

    #[test]
    fn ties_resolve_to_the_first_candidate() {
        let a = ForestParams {
            n_trees: 100,
            max_depth: Some(10),
        };
        let b = ForestParams {
            n_trees: 200,
            max_depth: Some(10),
        };
        let c = ForestParams {
            n_trees: 100,
            max_depth: None,
        };
        assert_eq!(select_best(&[(a, 0.6), (b, 0.6), (c, 0.5)]), Some((a, 0.6)));
        assert_eq!(select_best(&[(a, 0.5), (b, 0.6), (c, 0.6)]), Some((b, 0.6)));
        assert_eq!(select_best(&[]), None);
    }

    #[test]
    fn partition_holds_out_the_ceiling_share() {
        let trainer = ModelTrainer::new(TrainingConfig::default(), 100);
        let partition = trainer.partition(101);
        assert_eq!(partition.test.len(), 21);
        assert_eq!(partition.train.len(), 80);
        let mut all: Vec<usize> = partition.train.iter().chain(&partition.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..101).collect::<Vec<_>>());
        assert_eq!(trainer.partition(101).test, partition.test);
    }
}
