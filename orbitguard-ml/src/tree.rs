//! Isolation tree implementation
//!
//! Trees are built by recursively partitioning a sub-sample on a random
//! feature at a random split value until every point is isolated or the
//! maximum depth is reached.

use orbitguard_core::{FeatureVector, FEATURE_COUNT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{MLError, MLResult, Node, NodeKind};

/// Configuration for isolation tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum depth of tree
    pub max_depth: usize,
    /// Random seed for this tree
    pub seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 8, // ceil(log2(256))
            seed: 42,
        }
    }
}

/// Isolation tree structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    /// Tree nodes in arena representation, root at index 0
    nodes: Vec<Node>,
    /// Configuration
    config: TreeConfig,
}

impl IsolationTree {
    /// Create a new, unfitted tree
    pub fn new(config: TreeConfig) -> Self {
        Self {
            nodes: Vec::new(),
            config,
        }
    }

    /// Train the tree on samples
    pub fn fit(&mut self, samples: &[FeatureVector]) -> MLResult<()> {
        if samples.is_empty() {
            return Err(MLError::InsufficientData {
                required: 1,
                available: 0,
            });
        }

        self.nodes.clear();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut working = samples.to_vec();
        self.build(&mut working, 0, &mut rng);
        Ok(())
    }

    /// Build the subtree for `samples`, returning its root index
    fn build(&mut self, samples: &mut [FeatureVector], depth: u16, rng: &mut StdRng) -> u32 {
        let index = self.nodes.len() as u32;

        if depth as usize >= self.config.max_depth || samples.len() <= 1 {
            self.nodes.push(Node::external(samples.len() as u32, depth));
            return index;
        }

        let Some((feature, split)) = select_split(samples, rng) else {
            // All samples identical on every feature
            self.nodes.push(Node::external(samples.len() as u32, depth));
            return index;
        };

        let pivot = partition(samples, feature, split);
        if pivot == 0 || pivot == samples.len() {
            self.nodes.push(Node::external(samples.len() as u32, depth));
            return index;
        }

        // Reserve this slot, then fill in once the children exist
        self.nodes.push(Node::external(0, depth));
        let (left_samples, right_samples) = samples.split_at_mut(pivot);
        let left = self.build(left_samples, depth + 1, rng);
        let right = self.build(right_samples, depth + 1, rng);
        self.nodes[index as usize] = Node::internal(feature as u8, split, left, right, depth);

        index
    }

    /// Path length for a sample
    pub fn path_length(&self, features: &FeatureVector) -> f32 {
        let Some(mut node) = self.nodes.first() else {
            return 0.0;
        };

        // A root-to-leaf path never visits more than every node once
        for _ in 0..self.nodes.len() {
            let Some(next) = node.traverse(features) else {
                return node.path_length();
            };
            match self.nodes.get(next as usize) {
                Some(child) => node = child,
                // Corrupt artifact; stop where we are
                None => return node.depth as f32,
            }
        }
        log::warn!("Isolation tree traversal exceeded {} nodes", self.nodes.len());
        node.depth as f32
    }

    /// Check the arena links of a deserialized tree.
    ///
    /// Every internal node must split on a real feature and point at two
    /// children stored after it, which rules out cycles.
    pub fn validate(&self) -> MLResult<()> {
        if self.nodes.is_empty() {
            return Err(MLError::InvalidModel("tree has no nodes"));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if let NodeKind::Internal {
                feature,
                left,
                right,
                ..
            } = node.kind
            {
                if feature as usize >= FEATURE_COUNT {
                    return Err(MLError::InvalidModel("split feature out of range"));
                }
                for child in [left, right] {
                    let child = child as usize;
                    if child <= index || child >= self.nodes.len() {
                        return Err(MLError::InvalidModel("child index must point forward"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Get the number of nodes in the tree
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get tree depth
    pub fn depth(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.depth as usize)
            .max()
            .unwrap_or(0)
    }
}

/// Pick a random feature with spread and a uniform split inside its range
fn select_split(samples: &[FeatureVector], rng: &mut StdRng) -> Option<(usize, f32)> {
    let candidates: Vec<(usize, f32, f32)> = (0..FEATURE_COUNT)
        .filter_map(|feature| {
            let (min, max) = feature_range(samples, feature);
            (max - min > f32::EPSILON).then_some((feature, min, max))
        })
        .collect();

    if candidates.is_empty() {
        return None;
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    Some((feature, rng.gen_range(min..max)))
}

fn feature_range(samples: &[FeatureVector], feature: usize) -> (f32, f32) {
    samples.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s[feature]), hi.max(s[feature]))
    })
}

/// Move samples with `x[feature] < split` to the front; returns their count
fn partition(samples: &mut [FeatureVector], feature: usize, split: f32) -> usize {
    let mut pivot = 0;
    for i in 0..samples.len() {
        if samples[i][feature] < split {
            samples.swap(i, pivot);
            pivot += 1;
        }
    }
    pivot
}
