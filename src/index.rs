//! Bipartition index: every node's leaf-set, in both directions.
//!
//! # Overview
//! A [`CladeIndex`] captures, for one tree, the set of taxa at or below each
//! node. Clades are compared across trees by these sets only, never by node
//! labels, since the two trees label their internal nodes independently.
//!
//! ```text
//!            ROOT                 NODE_0 → {A,B}     {A,B}     → NODE_0
//!          /      \               NODE_1 → {C,D}     {C,D}     → NODE_1
//!      NODE_0    NODE_1           ROOT   → {A,B,C,D} {A,B,C,D} → ROOT
//!      /   \     /   \            A      → {A}       {A}       → A
//!     A     B   C     D           ...
//! ```
//!
//! # Shared bit positions
//! Both trees are indexed against the same [`TaxonUniverse`], so identical
//! clades get identical [`Bitset`]s regardless of which tree they came from.
//!
//! # Duplicate leaf-sets
//! A degree-2 node has the same leaf-set as its only child. The inverse map
//! keeps the first node in post-order (the deeper one) and counts the
//! collision instead of silently overwriting.

use crate::bitset::Bitset;
use crate::taxon::TaxonUniverse;
use crate::tree::{LabeledTree, NodeId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CladeIndex {
    /// Label → leaf-set, for every labeled node.
    pub forward: HashMap<String, Bitset>,

    /// Leaf-set → label of the first node (post-order) realizing it.
    pub inverse: HashMap<Bitset, String>,

    /// Leaf-set of every node, for reads during the ancestral walk.
    node_sets: HashMap<NodeId, Bitset>,

    /// Inverse-map insertions that hit an already realized leaf-set.
    pub collisions: usize,
}

impl CladeIndex {
    /// Builds both maps in a single post-order pass.
    ///
    /// # Algorithm
    /// - **Leaf**: bitset with the taxon's universe bit set
    /// - **Internal node**: OR of its children's bitsets, which are already
    ///   computed because children precede parents in post-order
    ///
    /// Leaves whose taxon is not in `universe` contribute nothing.
    pub fn build(tree: &LabeledTree, universe: &TaxonUniverse) -> Self {
        let words = universe.words();
        let mut node_sets: HashMap<NodeId, Bitset> = HashMap::with_capacity(tree.len());
        let mut forward = HashMap::with_capacity(tree.len());
        let mut inverse = HashMap::with_capacity(tree.len());
        let mut collisions = 0;

        for &id in tree.postorder() {
            let mut set = Bitset::zeros(words);
            if tree.is_leaf(id) {
                if let Some(bit) = tree.label(id).and_then(|t| universe.index_of(t)) {
                    set.set(bit);
                }
            } else {
                for child in tree.children(id) {
                    if let Some(child_set) = node_sets.get(child) {
                        set.or_assign(child_set);
                    }
                }
            }

            if let Some(label) = tree.label(id) {
                // First in post-order wins, matching `LabeledTree::find`.
                forward.entry(label.to_string()).or_insert_with(|| set.clone());
                if inverse.contains_key(&set) {
                    collisions += 1;
                } else {
                    inverse.insert(set.clone(), label.to_string());
                }
            }
            node_sets.insert(id, set);
        }

        if collisions > 0 {
            tracing::debug!("{collisions} nodes share a leaf-set with a descendant; kept the deepest");
        }

        CladeIndex { forward, inverse, node_sets, collisions }
    }

    pub fn leaf_set(&self, label: &str) -> Option<&Bitset> {
        self.forward.get(label)
    }

    pub fn node_set(&self, id: NodeId) -> Option<&Bitset> {
        self.node_sets.get(&id)
    }

    /// Label of the node whose leaf-set equals `set` exactly.
    pub fn exact(&self, set: &Bitset) -> Option<&str> {
        self.inverse.get(set).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LabelRules;
    use crate::tree::ingest;
    use std::path::Path;

    fn indexed(text: &str) -> (LabeledTree, TaxonUniverse, CladeIndex) {
        let tree = ingest(text, Path::new("t.nwk"), &LabelRules::default()).unwrap();
        let universe = TaxonUniverse::new(tree.taxa());
        let index = CladeIndex::build(&tree, &universe);
        (tree, universe, index)
    }

    #[test]
    fn test_root_covers_universe() {
        let (tree, universe, index) = indexed("(((A,B),C),(D,(E,F)));");
        let root = index.node_set(tree.root()).unwrap();
        assert_eq!(root.count_ones(), universe.len());
        assert_eq!(root, &universe.leaf_set(["A", "B", "C", "D", "E", "F"]));
    }

    #[test]
    fn test_node_set_is_union_of_children() {
        let (tree, universe, index) = indexed("(((A,B),C),(D,(E,F)),G);");
        for &id in tree.postorder() {
            let set = index.node_set(id).unwrap();
            if tree.is_leaf(id) {
                assert_eq!(set.count_ones(), 1);
                assert_eq!(set, &universe.leaf_set([tree.label(id).unwrap()]));
            } else {
                let mut union = Bitset::zeros(universe.words());
                for child in tree.children(id) {
                    union.or_assign(index.node_set(*child).unwrap());
                }
                assert_eq!(set, &union);
            }
        }
    }

    #[test]
    fn test_forward_and_inverse_agree() {
        let (_, universe, index) = indexed("((A,B)NODE_0,(C,D)NODE_1)ROOT;");
        let ab = universe.leaf_set(["A", "B"]);
        assert_eq!(index.leaf_set("NODE_0"), Some(&ab));
        assert_eq!(index.exact(&ab), Some("NODE_0"));
        assert_eq!(index.exact(&universe.leaf_set(["A"])), Some("A"));
        assert_eq!(index.exact(&universe.leaf_set(["A", "C"])), None);
        for (label, set) in &index.forward {
            assert_eq!(index.exact(set), Some(label.as_str()));
        }
        assert_eq!(index.collisions, 0);
    }

    #[test]
    fn test_degree_two_node_keeps_deepest() {
        // OUTER has INNER as its only child: both realize {A,B}.
        let (_, universe, index) = indexed("(((A,B)INNER)OUTER,C)ROOT;");
        assert_eq!(index.exact(&universe.leaf_set(["A", "B"])), Some("INNER"));
        assert_eq!(index.collisions, 1);
        assert_eq!(index.leaf_set("OUTER"), index.leaf_set("INNER"));
    }

    #[test]
    fn test_forward_agrees_with_tree_lookup() {
        let (tree, universe, index) = indexed("((A,B)100,(C,D)100,(E,F))100;");
        assert_eq!(index.leaf_set("100"), Some(&universe.leaf_set(["A", "B"])));
        for (label, set) in &index.forward {
            let id = tree.find(label).unwrap();
            assert_eq!(index.node_set(id), Some(set), "{label}");
        }
        assert_eq!(index.forward.len(), tree.len());
    }

    #[test]
    fn test_index_is_independent_of_child_order() {
        let (_, u1, i1) = indexed("((A,B)X,(C,(D,E)Y)Z)R;");
        let (_, u2, i2) = indexed("(((E,D)Y,C)Z,(B,A)X)R;");
        for label in ["X", "Y", "Z", "R"] {
            assert_eq!(
                u1.names_of(i1.leaf_set(label).unwrap()),
                u2.names_of(i2.leaf_set(label).unwrap())
            );
        }
    }
}
