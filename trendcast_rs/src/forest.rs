//! Bagged CART classifier for the binary forward-direction target.
//!
//! Each tree is grown on a bootstrap draw of the training rows, choosing every
//! split by Gini impurity over a random subset of `floor(sqrt(n_features))`
//! features (at least one). The forest's probability for "up" is the mean of the leaf
//! probabilities, and the class is "up" only when that mean exceeds one half.

use std::fmt;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const MIN_SAMPLES_SPLIT: usize = 2;

/// One hyper-parameter candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    /// `None` grows until leaves are pure or cannot be split.
    pub max_depth: Option<usize>,
}

impl fmt::Display for ForestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_depth {
            Some(depth) => write!(f, "trees={} depth={}", self.n_trees, depth),
            None => write!(f, "trees={} depth=unbounded", self.n_trees),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        p_up: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A binary classification tree stored as a flat node arena; index 0 is the
/// root.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl DecisionTree {
    /// Grows a tree on the rows named by `sample` (duplicates allowed).
    pub fn fit(
        features: &[Vec<f64>],
        labels: &[bool],
        sample: Vec<usize>,
        max_depth: Option<usize>,
        max_features: usize,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let n_features = features.first().map_or(0, Vec::len);
        let mut nodes = vec![Node::Leaf { p_up: 0.0 }];
        let mut pending = vec![(0usize, sample, 0usize)];

        while let Some((slot, rows, depth)) = pending.pop() {
            let up = rows.iter().filter(|&&row| labels[row]).count();
            let p_up = if rows.is_empty() {
                0.0
            } else {
                up as f64 / rows.len() as f64
            };
            let can_split = rows.len() >= MIN_SAMPLES_SPLIT
                && up > 0
                && up < rows.len()
                && max_depth.is_none_or(|limit| depth < limit);
            let best = if can_split {
                best_split(features, labels, &rows, n_features, max_features, rng)
            } else {
                None
            };
            let Some(best) = best else {
                nodes[slot] = Node::Leaf { p_up };
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                .into_iter()
                .partition(|&row| features[row][best.feature] <= best.threshold);
            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { p_up: 0.0 });
            nodes.push(Node::Leaf { p_up: 0.0 });
            nodes[slot] = Node::Split {
                feature: best.feature,
                threshold: best.threshold,
                left,
                right,
            };
            pending.push((right, right_rows, depth + 1));
            pending.push((left, left_rows, depth + 1));
        }

        Self { nodes }
    }

    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { p_up } => return *p_up,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((index, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[index] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        deepest
    }
}

/// Sorted sweep over each sampled feature. Features that are constant within
/// the node do not count toward `max_features`.
fn best_split(
    features: &[Vec<f64>],
    labels: &[bool],
    rows: &[usize],
    n_features: usize,
    max_features: usize,
    rng: &mut ChaCha8Rng,
) -> Option<Candidate> {
    let mut order: Vec<usize> = (0..n_features).collect();
    order.shuffle(rng);

    let total = rows.len() as f64;
    let total_up = rows.iter().filter(|&&row| labels[row]).count() as f64;
    let mut best: Option<Candidate> = None;
    let mut visited = 0;
    let mut column: Vec<(f64, bool)> = Vec::with_capacity(rows.len());

    for feature in order {
        if visited >= max_features {
            break;
        }
        column.clear();
        column.extend(rows.iter().map(|&row| (features[row][feature], labels[row])));
        column.sort_by(|a, b| a.0.total_cmp(&b.0));
        if column[0].0 >= column[column.len() - 1].0 {
            continue;
        }
        visited += 1;

        let mut left_n = 0.0;
        let mut left_up = 0.0;
        for i in 0..column.len() - 1 {
            left_n += 1.0;
            if column[i].1 {
                left_up += 1.0;
            }
            let (value, next) = (column[i].0, column[i + 1].0);
            if value >= next {
                continue;
            }
            let right_n = total - left_n;
            let right_up = total_up - left_up;
            let impurity =
                (left_n * gini(left_up, left_n) + right_n * gini(right_up, right_n)) / total;
            if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                let mid = value + (next - value) / 2.0;
                let threshold = if mid < next { mid } else { value };
                best = Some(Candidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
    }
    best
}

/// Features sampled per split: `floor(sqrt(n_features))`, never below one.
pub fn split_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt() as usize).max(1)
}

fn gini(up: f64, n: f64) -> f64 {
    let p = up / n;
    2.0 * p * (1.0 - p)
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fits `params.n_trees` trees in parallel. Tree `i` draws its bootstrap
    /// sample and split features from a generator seeded with `seed + i`, so
    /// the result does not depend on thread scheduling.
    pub fn fit(params: ForestParams, features: &[Vec<f64>], labels: &[bool], seed: u64) -> Self {
        let n_rows = features.len().min(labels.len());
        let n_features = features.first().map_or(0, Vec::len);
        let max_features = split_features(n_features);

        let trees = (0..params.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
                let sample: Vec<usize> = if n_rows == 0 {
                    Vec::new()
                } else {
                    (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect()
                };
                DecisionTree::fit(
                    features,
                    labels,
                    sample,
                    params.max_depth,
                    max_features,
                    &mut rng,
                )
            })
            .collect();

        Self {
            params,
            n_features,
            trees,
        }
    }

    pub fn params(&self) -> ForestParams {
        self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean leaf probability of the "up" class across trees.
    pub fn predict_proba_one(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.predict_proba(x)).sum();
        sum / self.trees.len() as f64
    }

    pub fn predict_one(&self, x: &[f64]) -> bool {
        self.predict_proba_one(x) > 0.5
    }

    /// Share of rows whose predicted class matches the label.
    pub fn accuracy(&self, features: &[Vec<f64>], labels: &[bool]) -> f64 {
        if features.is_empty() {
            return 0.0;
        }
        let correct = features
            .iter()
            .zip(labels.iter())
            .filter(|(x, label)| self.predict_one(x) == **label)
            .count();
        correct as f64 / features.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold_data(n: usize) -> (Vec<Vec<f64>>, Vec<bool>) {
        let features: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![i as f64, ((i * 7) % 13) as f64])
            .collect();
        let labels = (0..n).map(|i| i >= n / 2).collect();
        (features, labels)
    }

    #[test]
    fn single_tree_separates_a_threshold() {
        let (features, labels) = threshold_data(40);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let tree = DecisionTree::fit(&features, &labels, (0..40).collect(), None, 2, &mut rng);
        for (x, label) in features.iter().zip(&labels) {
            assert_eq!(tree.predict_proba(x) > 0.5, *label);
        }
    }

    #[test]
    fn depth_limit_is_respected() {
        let features: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64]).collect();
        let labels: Vec<bool> = (0..64).map(|i| i % 2 == 0).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = DecisionTree::fit(&features, &labels, (0..64).collect(), Some(3), 1, &mut rng);
        assert!(tree.depth() <= 3);
    }

    #[test]
    fn pure_node_is_a_single_leaf() {
        let features: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let labels = vec![true; 10];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = DecisionTree::fit(&features, &labels, (0..10).collect(), None, 1, &mut rng);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict_proba(&[3.0]), 1.0);
    }

    #[test]
    fn forest_is_deterministic_for_a_seed() {
        let (features, labels) = threshold_data(60);
        let params = ForestParams {
            n_trees: 15,
            max_depth: Some(4),
        };
        let a = RandomForest::fit(params, &features, &labels, 42);
        let b = RandomForest::fit(params, &features, &labels, 42);
        assert_eq!(a.trees(), b.trees());
        assert_eq!(a.trees().len(), 15);
        assert!(a.accuracy(&features, &labels) > 0.9);
    }

    #[test]
    fn split_features_takes_the_floor_of_the_root() {
        assert_eq!(split_features(1), 1);
        assert_eq!(split_features(3), 1);
        assert_eq!(split_features(4), 2);
        assert_eq!(split_features(6), 2);
        assert_eq!(split_features(9), 3);
    }

    #[test]
    fn three_features_sample_one_per_split() {
        // Only feature 0 separates the classes; stumps that split on it are
        // the ones that happened to draw it.
        let features: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![i as f64, ((i * 7) % 11) as f64, ((i * 5) % 13) as f64])
            .collect();
        let labels: Vec<bool> = (0..60).map(|i| i >= 30).collect();
        let params = ForestParams {
            n_trees: 600,
            max_depth: Some(1),
        };
        let forest = RandomForest::fit(params, &features, &labels, 9);
        let on_informative = forest
            .trees()
            .iter()
            .filter(|tree| matches!(tree.nodes[0], Node::Split { feature: 0, .. }))
            .count();
        assert!(
            (120..=280).contains(&on_informative),
            "{on_informative} of 600 roots split on feature 0"
        );
    }

    #[test]
    fn class_needs_strict_majority() {
        let forest = RandomForest {
            params: ForestParams {
                n_trees: 2,
                max_depth: None,
            },
            n_features: 1,
            trees: vec![
                DecisionTree {
                    nodes: vec![Node::Leaf { p_up: 1.0 }],
                },
                DecisionTree {
                    nodes: vec![Node::Leaf { p_up: 0.0 }],
                },
            ],
        };
        assert_eq!(forest.predict_proba_one(&[0.0]), 0.5);
        assert!(!forest.predict_one(&[0.0]));
    }
}
