//! Isolation tree node implementation
//!
//! Nodes live in a flat arena owned by the tree; children are referenced by
//! index, which keeps trees compact and trivially serializable.

use orbitguard_core::FeatureVector;
use serde::{Deserialize, Serialize};

/// Node variant in the isolation tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Internal node with split condition
    Internal {
        /// Feature index to split on
        feature: u8,
        /// Split value; `x[feature] < split` goes left
        split: f32,
        /// Left child index
        left: u32,
        /// Right child index
        right: u32,
    },
    /// Leaf node (external)
    External {
        /// Number of training samples that reached this leaf
        size: u32,
    },
}

/// Arena node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node variant and data
    pub kind: NodeKind,
    /// Path length from root
    pub depth: u16,
}

impl Node {
    /// Create an internal node
    pub fn internal(feature: u8, split: f32, left: u32, right: u32, depth: u16) -> Self {
        Self {
            kind: NodeKind::Internal {
                feature,
                split,
                left,
                right,
            },
            depth,
        }
    }

    /// Create an external (leaf) node
    pub fn external(size: u32, depth: u16) -> Self {
        Self {
            kind: NodeKind::External { size },
            depth,
        }
    }

    /// Check if node is a leaf
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::External { .. })
    }

    /// Path length credited when a sample terminates here
    ///
    /// Leaves that still hold several samples add `c(size)`, the expected
    /// remaining depth had the tree kept splitting.
    pub fn path_length(&self) -> f32 {
        match self.kind {
            NodeKind::External { size } => self.depth as f32 + c_factor(size as usize),
            NodeKind::Internal { .. } => self.depth as f32,
        }
    }

    /// Child index to visit next, `None` for leaves
    pub fn traverse(&self, features: &FeatureVector) -> Option<u32> {
        match self.kind {
            NodeKind::Internal {
                feature,
                split,
                left,
                right,
            } => {
                let value = features.get(feature as usize).copied()?;
                if value < split {
                    Some(left)
                } else {
                    Some(right)
                }
            }
            NodeKind::External { .. } => None,
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
///
/// `c(n) = 2·H(n-1) - 2·(n-1)/n`, with `H(i) ≈ ln(i) + γ`.
pub fn c_factor(n: usize) -> f32 {
    const EULER: f64 = 0.577_215_664_9;
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            let harmonic = (n - 1.0).ln() + EULER;
            (2.0 * harmonic - 2.0 * (n - 1.0) / n) as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_creation() {
        let internal = Node::internal(0, 25.0, 1, 2, 3);
        assert!(!internal.is_leaf());
        assert_eq!(internal.depth, 3);

        let external = Node::external(10, 5);
        assert!(external.is_leaf());
        assert_eq!(external.depth, 5);
    }

    #[test]
    fn test_node_traverse() {
        let node = Node::internal(2, 25.0, 1, 2, 0);

        let mut low = [0.0; 12];
        low[2] = 20.0;
        assert_eq!(node.traverse(&low), Some(1));

        let mut high = [0.0; 12];
        high[2] = 30.0;
        assert_eq!(node.traverse(&high), Some(2));

        assert_eq!(Node::external(3, 1).traverse(&high), None);
    }

    #[test]
    fn test_c_factor() {
        assert_eq!(c_factor(0), 0.0);
        assert_eq!(c_factor(1), 0.0);
        assert_eq!(c_factor(2), 1.0);
        // c(256) ≈ 10.24, the usual normaliser for ψ = 256
        assert!((c_factor(256) - 10.24).abs() < 0.01);
    }

    #[test]
    fn leaf_path_includes_correction() {
        let leaf = Node::external(1, 4);
        assert_eq!(leaf.path_length(), 4.0);
        let crowded = Node::external(2, 4);
        assert_eq!(crowded.path_length(), 5.0);
    }
}
