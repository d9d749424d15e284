//! Compact bitset representation for clade leaf-sets.
//!
//! # Overview
//! Every taxon in the shared [`TaxonUniverse`](crate::taxon::TaxonUniverse)
//! owns one bit position. A node's leaf-set is the bitset of the taxa at or
//! below it, so two nodes from different trees denote the same clade exactly
//! when their bitsets are equal.
//!
//! # Example
//! For a universe [A, B, C, D] mapped to indices [0, 1, 2, 3]:
//! - Clade {A, B} → bitset `0b0011` (bits 0 and 1 set)
//! - Clade {B, C, D} → bitset `0b1110` (bits 1, 2, 3 set)
//!
//! Bitsets are used as hash-map keys in the inverse clade index. They are
//! built once during indexing and never mutated after being inserted.

/// A compact bitset for representing which taxa belong to a clade.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily large trees.
/// Each u64 word holds 64 taxon indices.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(Vec<u64>);

impl Bitset {
    /// Number of u64 words needed to hold `n_taxa` bits.
    pub fn words_for(n_taxa: usize) -> usize {
        n_taxa.div_ceil(64).max(1)
    }

    /// Creates a new bitset with all bits set to 0.
    ///
    /// ```
    /// # use reassort_mapper::bitset::Bitset;
    /// let bs = Bitset::zeros(Bitset::words_for(100));
    /// assert!(bs.is_empty());
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Builds a bitset with the given indices set.
    ///
    /// ```
    /// # use reassort_mapper::bitset::Bitset;
    /// let bs = Bitset::from_indices(1, [0, 5]);
    /// assert_eq!(bs.count_ones(), 2);
    /// assert!(bs.contains(5));
    /// ```
    pub fn from_indices(words: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut bs = Bitset::zeros(words);
        for idx in indices {
            bs.set(idx);
        }
        bs
    }

    /// Sets the bit at the given index to 1.
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6;     // Equivalent to idx / 64
        let bit = idx & 63;      // Equivalent to idx % 64
        self.0[word] |= 1u64 << bit;
    }

    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        let word = idx >> 6;
        self.0.get(word).is_some_and(|w| w & (1u64 << (idx & 63)) != 0)
    }

    /// Merges two leaf-sets: `self` becomes `self ∪ other`.
    ///
    /// ```
    /// # use reassort_mapper::bitset::Bitset;
    /// let mut left = Bitset::from_indices(1, [0]);
    /// left.or_assign(&Bitset::from_indices(1, [1]));
    /// assert_eq!(left, Bitset::from_indices(1, [0, 1]));
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// True when every taxon of `self` is also in `other`.
    ///
    /// ```
    /// # use reassort_mapper::bitset::Bitset;
    /// let ab = Bitset::from_indices(1, [0, 1]);
    /// let abc = Bitset::from_indices(1, [0, 1, 2]);
    /// assert!(ab.is_subset_of(&abc));
    /// assert!(!abc.is_subset_of(&ab));
    /// ```
    #[inline]
    pub fn is_subset_of(&self, other: &Bitset) -> bool {
        self.0
            .iter()
            .enumerate()
            .all(|(i, w)| w & !other.0.get(i).copied().unwrap_or(0) == 0)
    }

    /// Counts the number of set bits, i.e. the clade size.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// Lowest set index, if any.
    pub fn first_one(&self) -> Option<usize> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| (i << 6) + w.trailing_zeros() as usize)
    }

    /// Iterates set indices in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(i, &w)| {
            (0..64).filter(move |bit| w & (1u64 << bit) != 0).map(move |bit| (i << 6) + bit)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = Bitset::zeros(1);
        bs.set(0);
        bs.set(2);
        assert_eq!(bs.0[0], 0b0101);
        assert!(bs.contains(2));
        assert!(!bs.contains(1));
        assert!(!bs.contains(500));
    }

    #[test]
    fn test_bitset_or() {
        let mut bs1 = Bitset::from_indices(1, [0, 1]);
        let bs2 = Bitset::from_indices(1, [2, 3]);
        bs1.or_assign(&bs2);
        assert_eq!(bs1.0[0], 0b1111);
    }

    /// Visual example: leaf-sets of a small tree
    ///
    /// ```text
    ///           root
    ///          /    \
    ///        node1   D
    ///        /   \
    ///       A    node2
    ///            /   \
    ///           B     C
    /// ```
    ///
    /// Taxa: A=0, B=1, C=2, D=3
    ///
    /// - node2: {B, C} → `0b0110`
    /// - node1: {A, B, C} → `0b0111`
    /// - root:  {A, B, C, D} → `0b1111`
    #[test]
    fn test_mini_tree_containment() {
        let node2 = Bitset::from_indices(1, [1, 2]);
        let mut node1 = Bitset::from_indices(1, [0]);
        node1.or_assign(&node2);
        let mut root = node1.clone();
        root.set(3);

        assert_eq!(node1.0[0], 0b0111);
        assert!(node2.is_subset_of(&node1));
        assert!(node1.is_subset_of(&root));
        assert!(!root.is_subset_of(&node1));
        assert!(node2.is_subset_of(&node2));
    }

    #[test]
    fn test_large_universe() {
        let words = Bitset::words_for(128);
        assert_eq!(words, 2);

        let bs = Bitset::from_indices(words, [0, 63, 64, 127]);
        assert_eq!(bs.count_ones(), 4);
        assert_eq!(bs.0[0], 1u64 | (1u64 << 63));
        assert_eq!(bs.0[1], 1u64 | (1u64 << 63));
        assert_eq!(bs.iter_ones().collect::<Vec<_>>(), vec![0, 63, 64, 127]);
    }

    #[test]
    fn test_first_one() {
        assert_eq!(Bitset::zeros(2).first_one(), None);
        assert_eq!(Bitset::from_indices(2, [70, 100]).first_one(), Some(70));
    }

    #[test]
    fn test_empty_is_subset_of_anything() {
        let empty = Bitset::zeros(1);
        assert!(empty.is_empty());
        assert!(empty.is_subset_of(&Bitset::from_indices(1, [3])));
    }
}
