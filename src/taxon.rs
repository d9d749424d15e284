//! Taxon identity: label normalization and the shared bit-index universe.
//!
//! The same sample may be written `A/x/2021|2021-05-01` in one tree and
//! `'A/x/2021|2021-05-01|2021-05-01'` in the other. Both must produce the
//! same key before any leaf-set is computed, otherwise every clade containing
//! that sample silently stops matching.

use crate::bitset::Bitset;
use itertools::Itertools;
use std::collections::{BTreeSet, HashMap};

/// Field separator inside taxon labels (`strain|date`).
pub const FIELD_DELIMITER: char = '|';

/// Canonical `strain|date` key for a raw leaf label.
///
/// Strips surrounding whitespace and quote characters, then keeps only the
/// first two `|`-separated fields. Labels with fewer than two fields are
/// returned cleaned but otherwise unchanged. Idempotent and total.
pub fn normalize_taxon_label(raw: &str) -> String {
    let clean = strip_decoration(raw);
    let mut fields = clean.splitn(3, FIELD_DELIMITER);
    match (fields.next(), fields.next()) {
        (Some(strain), Some(date)) => {
            strip_decoration(&format!("{strain}{FIELD_DELIMITER}{date}")).to_string()
        }
        _ => clean.to_string(),
    }
}

// Dropping a third field can expose trailing whitespace or a quote, so the
// same trim runs again on the rejoined key.
fn strip_decoration(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '\'' || c == '"')
}

/// Sorted union of taxa across trees, mapping each taxon to a bit position.
///
/// Sorting by name makes the index assignment independent of the order in
/// which trees list their leaves, so a clade has one bitset no matter which
/// tree it was read from.
#[derive(Debug, Clone)]
pub struct TaxonUniverse {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl TaxonUniverse {
    pub fn new<I, S>(taxa: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = taxa
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index = names.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect();
        TaxonUniverse { names, index }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn words(&self) -> usize {
        Bitset::words_for(self.names.len())
    }

    pub fn index_of(&self, taxon: &str) -> Option<usize> {
        self.index.get(taxon).copied()
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    /// Leaf-set of the given taxa. Unknown taxa are skipped.
    pub fn leaf_set<'a>(&self, taxa: impl IntoIterator<Item = &'a str>) -> Bitset {
        Bitset::from_indices(self.words(), taxa.into_iter().filter_map(|t| self.index_of(t)))
    }

    /// Taxon names of a leaf-set, in universe order.
    pub fn names_of(&self, set: &Bitset) -> Vec<&str> {
        set.iter_ones().filter_map(|i| self.name(i)).collect()
    }
}

/// Taxa present in one tree but not in the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonDiscrepancy {
    pub missing_in_target: Vec<String>,
    pub missing_in_source: Vec<String>,
}

impl TaxonDiscrepancy {
    pub fn between<'a>(
        source: impl IntoIterator<Item = &'a str>,
        target: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let source: BTreeSet<&str> = source.into_iter().collect();
        let target: BTreeSet<&str> = target.into_iter().collect();
        TaxonDiscrepancy {
            missing_in_target: source.difference(&target).map(|s| s.to_string()).collect(),
            missing_in_source: target.difference(&source).map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing_in_target.is_empty() && self.missing_in_source.is_empty()
    }

    /// Logs one warning per non-empty direction with a count and a short sample.
    pub fn log(&self) {
        if !self.missing_in_target.is_empty() {
            tracing::warn!(
                "{} leaves in source not found in target (e.g. {})",
                self.missing_in_target.len(),
                sample(&self.missing_in_target)
            );
        }
        if !self.missing_in_source.is_empty() {
            tracing::warn!(
                "{} leaves in target not found in source (e.g. {})",
                self.missing_in_source.len(),
                sample(&self.missing_in_source)
            );
        }
    }
}

fn sample(names: &[String]) -> String {
    names.iter().take(5).join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drops_duplicate_date() {
        assert_eq!(normalize_taxon_label("A/x/2021|2021-05-01"), "A/x/2021|2021-05-01");
        assert_eq!(
            normalize_taxon_label("A/x/2021|2021-05-01|2021-05-01"),
            normalize_taxon_label("A/x/2021|2021-05-01")
        );
    }

    #[test]
    fn test_normalize_strips_quotes_and_whitespace() {
        assert_eq!(normalize_taxon_label("  'A/x/2021|2021-05-01'  "), "A/x/2021|2021-05-01");
        assert_eq!(normalize_taxon_label("\"B/y|2020\""), "B/y|2020");
    }

    #[test]
    fn test_normalize_single_field_unchanged() {
        assert_eq!(normalize_taxon_label("A"), "A");
        assert_eq!(normalize_taxon_label(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in [
            "A/x/2021|2021-05-01|2021-05-01",
            "'C|d|e|f'",
            " plain ",
            "|",
            "||",
            "x|y |z",
            "x|y'|z",
            "' 'a",
            "'",
            "",
        ] {
            let once = normalize_taxon_label(raw);
            assert_eq!(normalize_taxon_label(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_universe_is_sorted_and_deduplicated() {
        let u = TaxonUniverse::new(["C", "A", "B", "A"]);
        assert_eq!(u.len(), 3);
        assert_eq!(u.index_of("A"), Some(0));
        assert_eq!(u.index_of("C"), Some(2));
        assert_eq!(u.index_of("Z"), None);

        let set = u.leaf_set(["C", "A", "Z"]);
        assert_eq!(u.names_of(&set), vec!["A", "C"]);
    }

    #[test]
    fn test_discrepancy_both_directions() {
        let d = TaxonDiscrepancy::between(["A", "B", "Z"], ["A", "B", "C"]);
        assert_eq!(d.missing_in_target, vec!["Z"]);
        assert_eq!(d.missing_in_source, vec!["C"]);
        assert!(!d.is_empty());
        assert!(TaxonDiscrepancy::between(["A"], ["A"]).is_empty());
    }
}
