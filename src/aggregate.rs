//! Accumulates source annotations onto their corresponding target clades.
//!
//! Placement rules for one eligible annotation with source leaf-set `S`:
//!
//! | Situation                                   | Strategy                  | Provenance |
//! |---------------------------------------------|---------------------------|------------|
//! | `S` equals an internal target clade         | exact match               | `DIRECT`   |
//! | `S` is one taxon present in the target      | ancestral walk from it    | `SUBCLADE` |
//! | `S` has several taxa, no exact clade        | smallest containing clade | `SUBCLADE` |
//! | `S` is one taxon missing from the target    | dropped with a warning    |            |
//! | no clade contains all of `S`                | dropped                   |            |
//!
//! Reports are keyed by internal target nodes: a source terminal branch maps
//! to the clade just above the matching target leaf.
//!
//! Annotations never overwrite each other. Every placed annotation is
//! appended to its node's record in arrival order.

use crate::bitset::Bitset;
use crate::config::MapperConfig;
use crate::index::CladeIndex;
use crate::resolve::{CladeResolver, Correspondence, MatchKind};
use crate::summary::Annotation;
use crate::taxon::normalize_taxon_label;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Provenance {
    Direct,
    Subclade,
}

impl Provenance {
    pub fn tag(self) -> &'static str {
        match self {
            Provenance::Direct => "DIRECT",
            Provenance::Subclade => "SUBCLADE",
        }
    }
}

/// An annotation placed on an enclosing clade, with the source clade it came from.
#[derive(Debug, Clone)]
pub struct Inherited {
    pub annotation: Annotation,
    pub source_clade: Bitset,
}

#[derive(Debug, Clone, Default)]
pub struct NodeRecord {
    pub direct: Vec<Annotation>,
    pub inherited: Vec<Inherited>,
}

impl NodeRecord {
    /// `DIRECT`, `SUBCLADE` or `DIRECT+SUBCLADE`.
    pub fn provenance(&self) -> String {
        let mut tags = Vec::with_capacity(2);
        if !self.direct.is_empty() {
            tags.push(Provenance::Direct.tag());
        }
        if !self.inherited.is_empty() {
            tags.push(Provenance::Subclade.tag());
        }
        tags.join("+")
    }

    /// Direct annotations first, then inherited ones, each in arrival order.
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.direct.iter().chain(self.inherited.iter().map(|i| &i.annotation))
    }

    pub fn len(&self) -> usize {
        self.direct.len() + self.inherited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Target node label → accumulated annotations.
#[derive(Debug, Clone, Default)]
pub struct Report {
    nodes: BTreeMap<String, NodeRecord>,
}

impl Report {
    pub fn record_direct(&mut self, target: &str, annotation: Annotation) {
        self.nodes.entry(target.to_string()).or_default().direct.push(annotation);
    }

    pub fn record_inherited(&mut self, target: &str, annotation: Annotation, source_clade: Bitset) {
        self.nodes
            .entry(target.to_string())
            .or_default()
            .inherited
            .push(Inherited { annotation, source_clade });
    }

    pub fn get(&self, target: &str) -> Option<&NodeRecord> {
        self.nodes.get(target)
    }

    /// Records ordered by target label.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeRecord)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingStats {
    pub total: usize,
    pub eligible: usize,
    pub direct: usize,
    pub subclade: usize,
    /// Eligible annotations whose label is not a node of the source tree.
    pub missing_source: usize,
    pub unresolved: usize,
}

impl MappingStats {
    pub fn mapped(&self) -> usize {
        self.direct + self.subclade
    }

    /// `mapped / eligible` in percent; 0 when nothing was eligible.
    pub fn success_rate(&self) -> f64 {
        if self.eligible == 0 {
            0.0
        } else {
            self.mapped() as f64 / self.eligible as f64 * 100.0
        }
    }

    pub fn log(&self) {
        info!("High confidence events in summary: {}", self.eligible);
        info!(
            "Successfully mapped to target tree: {} ({} direct, {} subclade)",
            self.mapped(),
            self.direct,
            self.subclade
        );
        if self.unresolved > 0 {
            info!("Events with no corresponding target clade: {}", self.unresolved);
        }
        if self.missing_source > 0 {
            info!("Events whose node is absent from the source tree: {}", self.missing_source);
        }
        info!("Mapping success rate: {:.1}%", self.success_rate());
    }
}

/// Places every eligible annotation on the target tree.
pub fn aggregate(
    annotations: &[Annotation],
    source_index: &CladeIndex,
    resolver: &CladeResolver<'_>,
    config: &MapperConfig,
) -> (Report, MappingStats) {
    let mut report = Report::default();
    let mut stats = MappingStats { total: annotations.len(), ..Default::default() };

    for annotation in annotations {
        if !annotation.is_eligible(config.confidence_threshold) {
            continue;
        }
        stats.eligible += 1;
        let label = annotation.source_label.as_str();
        if config.debug {
            debug!("--- Processing {label} (confidence: {:.3}) ---", annotation.confidence);
        }

        let Some(source_set) = source_leaf_set(source_index, label) else {
            stats.missing_source += 1;
            if config.debug {
                debug!("  {label} not found in source leaf map");
            }
            continue;
        };

        match place(source_set, resolver) {
            Some((target, Provenance::Direct)) => {
                stats.direct += 1;
                report.record_direct(&target.label, annotation.clone());
            }
            Some((target, Provenance::Subclade)) => {
                stats.subclade += 1;
                report.record_inherited(&target.label, annotation.clone(), source_set.clone());
            }
            None => {
                stats.unresolved += 1;
                if source_set.count_ones() == 1 {
                    let taxon = source_set.first_one().and_then(|i| resolver.universe().name(i)).unwrap_or(label);
                    warn!("{label}: leaf '{taxon}' missing in target tree, annotation dropped");
                } else if config.debug {
                    debug!("  failed to map {label}");
                }
            }
        }
    }

    (report, stats)
}

/// Source leaf-set for a summary key: the label as written, or the
/// normalized taxon when the key names a leaf.
fn source_leaf_set<'i>(index: &'i CladeIndex, label: &str) -> Option<&'i Bitset> {
    index.leaf_set(label).or_else(|| index.leaf_set(&normalize_taxon_label(label)))
}

/// Target clade and provenance for one source leaf-set.
pub fn place(set: &Bitset, resolver: &CladeResolver<'_>) -> Option<(Correspondence, Provenance)> {
    let found = match set.count_ones() {
        0 => return None,
        // A terminal branch reports on the clade above the matching leaf.
        1 => resolver.resolve(set)?,
        _ => resolver.exact(set).or_else(|| resolver.smallest_container(set))?,
    };
    let provenance = match found.kind {
        MatchKind::Exact => Provenance::Direct,
        MatchKind::Enclosing => Provenance::Subclade,
    };
    debug!("  {} -> '{}'", provenance.tag(), found.label);
    Some((found, provenance))
}
