//! Compiled decision trees for the triage classifier.
//!
//! Three trees consume the 82-float feature vector: a vital gate (0/1), an
//! intent classifier (10 classes) and an urgency classifier (0..3). Each
//! tree is a flat node table in the trainer's export layout: feature index,
//! split threshold, left/right child indices, and a leaf class with the
//! sentinel 255 marking internal nodes. The evaluator is a plain binary
//! descent; anything out of range maps to the documented fallbacks at the
//! call site.

use super::FEATURE_DIM;

pub(crate) const LEAF_SENTINEL: u8 = 255;

#[derive(Clone, Copy)]
pub(crate) struct TreeNode {
    pub feature: u8,
    pub threshold: f32,
    pub left: u16,
    pub right: u16,
    pub leaf: u8,
}

const fn split(feature: u8, threshold: f32, left: u16, right: u16) -> TreeNode {
    TreeNode {
        feature,
        threshold,
        left,
        right,
        leaf: LEAF_SENTINEL,
    }
}

const fn leaf(class: u8) -> TreeNode {
    TreeNode {
        feature: 0,
        threshold: 0.0,
        left: 0,
        right: 0,
        leaf: class,
    }
}

// Feature indices used by the trees:
//   3 = has '!'   6 = has time word
//   8..17 = bucket counts (medic, water, food, shelter, danger, evac,
//           info, disaster, sickness, chat)

// vital: 21 nodes, depth 10
static VITAL_TREE: [TreeNode; 21] = [
    split(12, 0.5, 1, 10),
    split(8, 0.5, 2, 11),
    split(15, 0.5, 3, 12),
    split(16, 0.5, 4, 13),
    split(9, 0.5, 5, 14),
    split(10, 0.5, 6, 15),
    split(11, 0.5, 7, 16),
    split(13, 0.5, 8, 17),
    split(14, 0.5, 18, 9),
    split(6, 0.5, 19, 20),
    leaf(1),
    leaf(1),
    leaf(1),
    leaf(1),
    leaf(1),
    leaf(1),
    leaf(1),
    leaf(1),
    leaf(0),
    leaf(0),
    leaf(1),
];

// intent: 19 nodes, depth 9; classes in intent-label order
static INTENT_TREE: [TreeNode; 19] = [
    split(15, 0.5, 1, 9),
    split(12, 0.5, 2, 10),
    split(8, 0.5, 3, 11),
    split(16, 0.5, 4, 12),
    split(13, 0.5, 5, 13),
    split(9, 0.5, 6, 14),
    split(10, 0.5, 7, 15),
    split(11, 0.5, 8, 16),
    split(14, 0.5, 17, 18),
    leaf(7),
    leaf(4),
    leaf(0),
    leaf(8),
    leaf(5),
    leaf(1),
    leaf(2),
    leaf(3),
    leaf(9),
    leaf(6),
];

// urgency: 35 nodes, depth 9
static URGENCY_TREE: [TreeNode; 35] = [
    split(12, 0.5, 1, 9),
    split(15, 0.5, 2, 10),
    split(8, 0.5, 3, 11),
    split(16, 0.5, 4, 12),
    split(13, 0.5, 5, 13),
    split(9, 0.5, 6, 14),
    split(10, 0.5, 7, 15),
    split(11, 0.5, 8, 16),
    split(3, 0.5, 17, 18),
    split(6, 0.5, 19, 20),
    split(6, 0.5, 21, 22),
    split(6, 0.5, 23, 24),
    split(6, 0.5, 25, 26),
    split(6, 0.5, 27, 28),
    split(6, 0.5, 29, 30),
    split(6, 0.5, 31, 32),
    split(6, 0.5, 33, 34),
    leaf(0),
    leaf(1),
    leaf(2),
    leaf(3),
    leaf(2),
    leaf(3),
    leaf(2),
    leaf(3),
    leaf(2),
    leaf(3),
    leaf(2),
    leaf(3),
    leaf(1),
    leaf(2),
    leaf(1),
    leaf(2),
    leaf(1),
    leaf(2),
];

fn eval(tree: &'static [TreeNode], x: &[f32; FEATURE_DIM]) -> i8 {
    let mut index = 0usize;
    // Bounded by node count; a well-formed tree reaches a leaf well before.
    for _ in 0..tree.len() {
        let node = tree[index];
        if node.leaf != LEAF_SENTINEL {
            return node.leaf as i8;
        }
        let feature = node.feature as usize;
        if feature >= FEATURE_DIM {
            return -1;
        }
        index = if x[feature] <= node.threshold { node.left as usize } else { node.right as usize };
        if index >= tree.len() {
            return -1;
        }
    }
    -1
}

pub(crate) fn vital_predict(x: &[f32; FEATURE_DIM]) -> i8 {
    eval(&VITAL_TREE, x)
}

pub(crate) fn intent_predict(x: &[f32; FEATURE_DIM]) -> i8 {
    eval(&INTENT_TREE, x)
}

pub(crate) fn urgency_predict(x: &[f32; FEATURE_DIM]) -> i8 {
    eval(&URGENCY_TREE, x)
}
