//! Clade correspondence: find a source clade's counterpart in the target tree.
//!
//! Three strategies, all driven by leaf-sets over the shared taxon universe:
//!
//! 1. **Exact match**: hash lookup of the leaf-set in the target's inverse
//!    index. O(1) after hashing; the common case when both trees agree on the
//!    clade.
//! 2. **Ancestral walk**: starting at the target leaf of one member taxon,
//!    walk strictly upward and stop at the first ancestor whose leaf-set
//!    contains the whole query. Leaf-sets only grow towards the root, and the
//!    root holds every taxon, so the first hit is the nearest (smallest)
//!    enclosing clade. O(H) subset tests, H bounded by tree height.
//! 3. **Minimum container scan**: test every target node and keep the
//!    smallest leaf-set that contains the query, ties broken by post-order.
//!    O(N); used where no single witness leaf is trusted.
//!
//! Whichever member taxon starts the walk, the walk ends at the lowest common
//! ancestor of the query, so the result does not depend on that choice.
//!
//! ```text
//!            ROOT                 query {A,C}:
//!          /      \                 exact:  none
//!        X          D               walk from A: A → Y {A,B} ✗ → X {A,B,C} ✓
//!      /   \                        walk from C: C → X {A,B,C} ✓
//!     Y     C
//!    / \
//!   A   B
//! ```

use crate::bitset::Bitset;
use crate::index::CladeIndex;
use crate::taxon::TaxonUniverse;
use crate::tree::{LabeledTree, NodeId};

/// How a correspondence was established.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MatchKind {
    /// The target node's leaf-set equals the query.
    Exact,
    /// The target node is the smallest clade strictly containing the query.
    Enclosing,
}

/// A resolved target node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Correspondence {
    pub node: NodeId,
    pub label: String,
    pub kind: MatchKind,
}

/// Resolves leaf-sets against one indexed target tree.
pub struct CladeResolver<'a> {
    tree: &'a LabeledTree,
    index: &'a CladeIndex,
    universe: &'a TaxonUniverse,
}

impl<'a> CladeResolver<'a> {
    pub fn new(tree: &'a LabeledTree, index: &'a CladeIndex, universe: &'a TaxonUniverse) -> Self {
        CladeResolver { tree, index, universe }
    }

    pub fn universe(&self) -> &'a TaxonUniverse {
        self.universe
    }

    /// Step 1 only: the node whose leaf-set equals `set`.
    pub fn exact(&self, set: &Bitset) -> Option<Correspondence> {
        let label = self.index.exact(set)?;
        let node = self.tree.find(label)?;
        Some(Correspondence { node, label: label.to_string(), kind: MatchKind::Exact })
    }

    /// Exact match on an internal clade, else ancestral walk from the
    /// lowest-indexed member taxon. A single taxon therefore resolves to the
    /// clade just above its leaf.
    ///
    /// `None` when the set is empty, when the witness taxon has no leaf in
    /// the target, or when no ancestor contains the whole set (some member
    /// is missing from the target). Callers treat `None` as "no mapping".
    pub fn resolve(&self, set: &Bitset) -> Option<Correspondence> {
        if let Some(found) = self.exact(set).filter(|c| !self.tree.is_leaf(c.node)) {
            tracing::debug!("  direct match at '{}'", found.label);
            return Some(found);
        }
        let witness = set.first_one()?;
        self.walk_from(set, witness)
    }

    /// Ancestral walk from the target leaf of taxon `witness`.
    pub fn walk_from(&self, set: &Bitset, witness: usize) -> Option<Correspondence> {
        if !set.contains(witness) {
            return None;
        }
        let taxon = self.universe.name(witness)?;
        let Some(leaf) = self.tree.leaf_of(taxon) else {
            tracing::debug!("  could not find leaf '{taxon}' in target tree");
            return None;
        };
        tracing::debug!("  ancestral walk from '{taxon}'");

        for ancestor in self.tree.ancestors(leaf) {
            let Some(ancestor_set) = self.index.node_set(ancestor) else { continue };
            if set.is_subset_of(ancestor_set) {
                let label = self.tree.label(ancestor)?.to_string();
                tracing::debug!("  containing clade at '{label}'");
                let kind = if ancestor_set == set { MatchKind::Exact } else { MatchKind::Enclosing };
                return Some(Correspondence { node: ancestor, label, kind });
            }
        }

        tracing::debug!("  ancestral walk from '{taxon}' found no containing clade");
        None
    }

    /// Smallest internal clade containing `set`, scanning every target node.
    ///
    /// Ties (only possible with duplicate leaf-sets) go to the first node in
    /// post-order.
    pub fn smallest_container(&self, set: &Bitset) -> Option<Correspondence> {
        if set.is_empty() {
            return None;
        }
        let mut best: Option<(NodeId, usize)> = None;
        for &id in self.tree.postorder() {
            if self.tree.is_leaf(id) {
                continue;
            }
            let Some(candidate) = self.index.node_set(id) else { continue };
            if !set.is_subset_of(candidate) {
                continue;
            }
            let size = candidate.count_ones();
            if best.is_none_or(|(_, best_size)| size < best_size) {
                best = Some((id, size));
            }
        }

        let (node, size) = best?;
        let label = self.tree.label(node)?.to_string();
        let kind = if size == set.count_ones() { MatchKind::Exact } else { MatchKind::Enclosing };
        Some(Correspondence { node, label, kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LabelRules;
    use crate::tree::ingest;
    use itertools::Itertools;
    use std::path::Path;

    struct Fixture {
        tree: LabeledTree,
        universe: TaxonUniverse,
        index: CladeIndex,
    }

    impl Fixture {
        fn new(target: &str, extra_taxa: &[&str]) -> Self {
            let tree = ingest(target, Path::new("target.nwk"), &LabelRules::default()).unwrap();
            let universe = TaxonUniverse::new(tree.taxa().chain(extra_taxa.iter().copied()));
            let index = CladeIndex::build(&tree, &universe);
            Fixture { tree, universe, index }
        }

        fn resolver(&self) -> CladeResolver<'_> {
            CladeResolver::new(&self.tree, &self.index, &self.universe)
        }

        fn set(&self, taxa: &[&str]) -> Bitset {
            self.universe.leaf_set(taxa.iter().copied())
        }
    }

    const TREE: &str = "((((A,B)Y,C)X,D)W,((E,F)V,(G,H)U)T)ROOT;";

    #[test]
    fn test_exact_match_returns_that_node() {
        let f = Fixture::new(TREE, &[]);
        let r = f.resolver();
        for label in ["Y", "X", "W", "V", "U", "T", "ROOT"] {
            let set = f.index.leaf_set(label).unwrap().clone();
            let found = r.resolve(&set).unwrap();
            assert_eq!(found.label, label);
            assert_eq!(found.kind, MatchKind::Exact);
        }
    }

    #[test]
    fn test_walk_finds_nearest_container() {
        let f = Fixture::new(TREE, &[]);
        let r = f.resolver();
        let found = r.resolve(&f.set(&["A", "C"])).unwrap();
        assert_eq!(found.label, "X");
        assert_eq!(found.kind, MatchKind::Enclosing);

        let found = r.resolve(&f.set(&["B", "E"])).unwrap();
        assert_eq!(found.label, "ROOT");
    }

    #[test]
    fn test_walk_result_always_contains_query() {
        let f = Fixture::new(TREE, &[]);
        let r = f.resolver();
        let taxa = ["A", "B", "C", "D", "E", "F", "G", "H"];
        for k in 1..=3 {
            for combo in taxa.iter().copied().combinations(k) {
                let set = f.set(&combo);
                let found = r.resolve(&set).unwrap();
                assert!(set.is_subset_of(f.index.node_set(found.node).unwrap()));
            }
        }
    }

    #[test]
    fn test_walk_is_witness_invariant() {
        let f = Fixture::new(TREE, &[]);
        let r = f.resolver();
        let taxa = ["A", "B", "C", "D", "E", "F", "G", "H"];
        for combo in taxa.iter().copied().combinations(3) {
            let set = f.set(&combo);
            let results: Vec<_> = set.iter_ones().map(|w| r.walk_from(&set, w).unwrap().node).collect();
            assert!(results.iter().all_equal(), "walk depends on witness for {combo:?}");
        }
    }

    #[test]
    fn test_walk_agrees_with_smallest_container() {
        let f = Fixture::new(TREE, &[]);
        let r = f.resolver();
        let taxa = ["A", "B", "C", "D", "E", "F", "G", "H"];
        for combo in taxa.iter().copied().combinations(2) {
            let set = f.set(&combo);
            assert_eq!(r.resolve(&set).map(|c| c.node), r.smallest_container(&set).map(|c| c.node));
        }
    }

    #[test]
    fn test_single_taxon_walk_goes_to_parent() {
        let f = Fixture::new("((A,B)NODE_0,(C,D)NODE_1)ROOT;", &[]);
        let set = f.set(&["A"]);
        let witness = set.first_one().unwrap();
        let found = f.resolver().walk_from(&set, witness).unwrap();
        assert_eq!(found.label, "NODE_0");
        assert_eq!(found.kind, MatchKind::Enclosing);
    }

    #[test]
    fn test_single_taxon_resolves_to_enclosing_clade() {
        let f = Fixture::new(TREE, &[]);
        let r = f.resolver();
        for (taxon, clade) in [("A", "Y"), ("C", "X"), ("D", "W"), ("H", "U")] {
            let found = r.resolve(&f.set(&[taxon])).unwrap();
            assert_eq!(found.label, clade);
            assert_eq!(found.kind, MatchKind::Enclosing);
            assert!(!f.tree.is_leaf(found.node));
        }
    }

    #[test]
    fn test_missing_taxon_is_not_found() {
        let f = Fixture::new("((A,B)NODE_0,(C,D)NODE_1)ROOT;", &["Z"]);
        let r = f.resolver();
        let set = f.set(&["A", "Z"]);
        assert_eq!(r.resolve(&set), None);
        assert_eq!(r.smallest_container(&set), None);
        assert_eq!(r.resolve(&f.set(&["Z"])), None);
    }

    #[test]
    fn test_empty_set_is_not_found() {
        let f = Fixture::new(TREE, &[]);
        let empty = Bitset::zeros(f.universe.words());
        assert_eq!(f.resolver().resolve(&empty), None);
        assert_eq!(f.resolver().smallest_container(&empty), None);
    }
}
