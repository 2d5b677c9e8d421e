//! Random forest of CART trees over scaled document embeddings
//!
//! Each tree is grown on a bootstrap sample with weighted Gini impurity and
//! `max_features` candidate dimensions per split. Tree `i` draws from its own
//! `ChaCha8Rng` seeded with `seed + i`, so fitting in parallel stays
//! deterministic.

use crate::classifier::{balanced_class_weights, clamp_probability, BinaryClassifier};
use crate::config::ForestConfig;
use ndarray::{Array1, Array2};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use reviewlens_core::{Error, Recommendation, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Node of a tree stored as a flat arena; children are indices into it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        /// Weighted fraction of positive samples
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Single fitted classification tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Positive-class probability of the leaf `features` falls into
    pub fn predict_value(&self, features: &Array1<f64>) -> f64 {
        let mut node = 0;
        loop {
            match self.nodes.get(node) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = features.get(*feature).copied().unwrap_or(0.0);
                    node = if x <= *threshold { *left } else { *right };
                }
                None => return 0.5,
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Length of the longest root-to-leaf path, in edges
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            match self.nodes.get(node) {
                Some(TreeNode::Split { left, right, .. }) => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
                _ => deepest = deepest.max(depth),
            }
        }
        deepest
    }
}

/// Parameters shared by every tree of a forest
#[derive(Debug, Clone, Copy)]
struct TreeParams {
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: usize,
}

struct CandidateSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

struct TreeBuilder<'a> {
    samples: &'a Array2<f64>,
    classes: &'a [usize],
    class_weights: [f64; 2],
    params: TreeParams,
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    fn new(
        samples: &'a Array2<f64>,
        classes: &'a [usize],
        class_weights: [f64; 2],
        params: TreeParams,
    ) -> Self {
        Self {
            samples,
            classes,
            class_weights,
            params,
            nodes: Vec::new(),
            importances: vec![0.0; samples.ncols()],
        }
    }

    fn build(mut self, mut indices: Vec<usize>, rng: &mut ChaCha8Rng) -> (DecisionTree, Vec<f64>) {
        self.nodes.push(TreeNode::Leaf { value: 0.5 });
        let mut stack = vec![(0usize, 0usize, indices.len(), 0usize)];

        while let Some((node, start, end, depth)) = stack.pop() {
            let members = &mut indices[start..end];
            let totals = self.class_totals(members);
            let weight = totals[0] + totals[1];
            let value = if weight > 0.0 { totals[1] / weight } else { 0.5 };

            let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
            let pure = totals[0] <= 0.0 || totals[1] <= 0.0;
            if depth_reached || pure || members.len() < self.params.min_samples_split {
                self.nodes[node] = TreeNode::Leaf { value };
                continue;
            }

            let Some(split) = self.best_split(members, totals, rng) else {
                self.nodes[node] = TreeNode::Leaf { value };
                continue;
            };

            let (left_members, right_members): (Vec<usize>, Vec<usize>) = members
                .iter()
                .partition(|&&i| self.samples[[i, split.feature]] <= split.threshold);
            let mid = left_members.len();
            members[..mid].copy_from_slice(&left_members);
            members[mid..].copy_from_slice(&right_members);

            self.importances[split.feature] += weight * (gini(totals) - split.impurity);

            let left = self.nodes.len();
            let right = left + 1;
            self.nodes.push(TreeNode::Leaf { value });
            self.nodes.push(TreeNode::Leaf { value });
            self.nodes[node] = TreeNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };

            stack.push((right, start + mid, end, depth + 1));
            stack.push((left, start, start + mid, depth + 1));
        }

        (DecisionTree { nodes: self.nodes }, self.importances)
    }

    fn class_totals(&self, members: &[usize]) -> [f64; 2] {
        let mut totals = [0.0; 2];
        for &i in members {
            let class = self.classes[i];
            totals[class] += self.class_weights[class];
        }
        totals
    }

    fn best_split(
        &self,
        members: &[usize],
        totals: [f64; 2],
        rng: &mut ChaCha8Rng,
    ) -> Option<CandidateSplit> {
        let n_features = self.samples.ncols();
        let parent = gini(totals);
        let total_weight = totals[0] + totals[1];
        let min_leaf = self.params.min_samples_leaf;

        let mut best: Option<CandidateSplit> = None;
        let mut column: Vec<(f64, usize)> = Vec::with_capacity(members.len());

        for feature in index::sample(rng, n_features, self.params.max_features) {
            column.clear();
            column.extend(members.iter().map(|&i| (self.samples[[i, feature]], self.classes[i])));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = [0.0; 2];
            for k in 0..column.len() - 1 {
                let (value, class) = column[k];
                left[class] += self.class_weights[class];

                let next = column[k + 1].0;
                let left_count = k + 1;
                if next <= value || left_count < min_leaf || column.len() - left_count < min_leaf {
                    continue;
                }

                let right = [totals[0] - left[0], totals[1] - left[1]];
                let left_weight = left[0] + left[1];
                let right_weight = right[0] + right[1];
                let impurity =
                    (left_weight * gini(left) + right_weight * gini(right)) / total_weight;

                if impurity < parent - 1e-12
                    && best.as_ref().map_or(true, |b| impurity < b.impurity)
                {
                    let mut threshold = value + (next - value) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(CandidateSplit {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }

        best
    }
}

fn gini(weights: [f64; 2]) -> f64 {
    let total = weights[0] + weights[1];
    if total <= 0.0 {
        return 0.0;
    }
    let p0 = weights[0] / total;
    let p1 = weights[1] / total;
    1.0 - p0 * p0 - p1 * p1
}

/// Fitted random forest (classifier B)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(
        samples: &Array2<f64>,
        labels: &[Recommendation],
        config: &ForestConfig,
        seed: u64,
    ) -> Result<Self> {
        let (n_samples, n_features) = samples.dim();
        if n_samples != labels.len() {
            return Err(Error::internal(format!(
                "{} samples but {} labels",
                n_samples,
                labels.len()
            )));
        }
        if n_features == 0 {
            return Err(Error::feature_extraction("cannot fit a forest on zero features"));
        }

        let class_weights = balanced_class_weights(labels)?;
        let classes: Vec<usize> = labels.iter().map(|l| usize::from(l.as_u8())).collect();

        let max_features = config
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .clamp(1, n_features);
        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features,
        };

        let start = Instant::now();
        let fitted: Vec<(DecisionTree, Vec<f64>)> = (0..config.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
                let indices: Vec<usize> = if config.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                TreeBuilder::new(samples, &classes, class_weights, params).build(indices, &mut rng)
            })
            .collect();

        let mut feature_importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(fitted.len());
        for (tree, importances) in fitted {
            for (total, value) in feature_importances.iter_mut().zip(importances) {
                *total += value;
            }
            trees.push(tree);
        }
        let sum: f64 = feature_importances.iter().sum();
        if sum > 0.0 {
            for value in &mut feature_importances {
                *value /= sum;
            }
        }

        info!(
            "Random forest fitted: {} trees, max_features={}, mean nodes {:.1}, in {:?}",
            trees.len(),
            max_features,
            trees.iter().map(DecisionTree::n_nodes).sum::<usize>() as f64 / trees.len().max(1) as f64,
            start.elapsed()
        );

        Ok(Self {
            trees,
            n_features,
            feature_importances,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Normalized total impurity decrease per dimension
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

impl BinaryClassifier for RandomForest {
    type Input = Array1<f64>;

    fn predict_probability(&self, features: &Array1<f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict_value(features)).sum();
        clamp_probability(sum / self.trees.len() as f64)
    }
}
