use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::forest::ForestParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of most recent labeled rows exposed for reporting.
    #[serde(default = "default_report_rows")]
    pub report_rows: usize,
    /// Sessions ahead used to build the binary direction target.
    #[serde(default = "default_forward_horizon")]
    pub forward_horizon: usize,
    /// Training is skipped when fewer feature rows than this survive the
    /// drop-on-missing pass.
    #[serde(default = "default_min_training_rows")]
    pub min_training_rows: usize,
    /// Worker threads for ticker fan-out and the hyper-parameter search.
    /// Zero means one per logical core.
    #[serde(default)]
    pub n_workers: usize,
    #[serde(default)]
    pub training: TrainingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report_rows: default_report_rows(),
            forward_horizon: default_forward_horizon(),
            min_training_rows: default_min_training_rows(),
            n_workers: 0,
            training: TrainingConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.report_rows >= 1, "report_rows must be at least 1");
        ensure!(self.forward_horizon >= 1, "forward_horizon must be at least 1");
        self.training.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Share of usable rows held out for the accuracy diagnostic.
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    /// Seed for the partition, bootstrap draws and split feature sampling.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_tree_counts")]
    pub tree_counts: Vec<usize>,
    /// `None` grows trees until leaves are pure.
    #[serde(default = "default_max_depths")]
    pub max_depths: Vec<Option<usize>>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            cv_folds: default_cv_folds(),
            seed: default_seed(),
            tree_counts: default_tree_counts(),
            max_depths: default_max_depths(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.test_fraction > 0.0 && self.test_fraction < 1.0,
            "test_fraction must be in (0, 1), got {}",
            self.test_fraction
        );
        ensure!(self.cv_folds >= 2, "cv_folds must be at least 2, got {}", self.cv_folds);
        ensure!(!self.tree_counts.is_empty(), "tree_counts must not be empty");
        ensure!(
            self.tree_counts.iter().all(|&n| n >= 1),
            "every tree count must be at least 1"
        );
        ensure!(!self.max_depths.is_empty(), "max_depths must not be empty");
        ensure!(
            self.max_depths.iter().flatten().all(|&d| d >= 1),
            "every bounded depth must be at least 1"
        );
        Ok(())
    }

    /// Candidates in evaluation order: depth is the outer loop, tree count
    /// the inner one. Ties in CV accuracy resolve to the earliest entry.
    pub fn candidates(&self) -> Vec<ForestParams> {
        self.max_depths
            .iter()
            .flat_map(|depth| {
                self.tree_counts.iter().map(move |trees| ForestParams {
                    n_trees: *trees,
                    max_depth: *depth,
                })
            })
            .collect()
    }
}

const fn default_report_rows() -> usize {
    252
}

const fn default_forward_horizon() -> usize {
    5
}

const fn default_min_training_rows() -> usize {
    100
}

const fn default_test_fraction() -> f64 {
    0.2
}

const fn default_cv_folds() -> usize {
    3
}

const fn default_seed() -> u64 {
    42
}

fn default_tree_counts() -> Vec<usize> {
    vec![100, 200]
}

fn default_max_depths() -> Vec<Option<usize>> {
    vec![Some(10), Some(20), None]
}
