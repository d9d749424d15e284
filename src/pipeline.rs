//! End-to-end run: read → label → index → resolve → aggregate → export.
//!
//! All inputs are read and validated before anything is written, so a
//! malformed tree or summary never leaves partial outputs behind.

use crate::aggregate::{MappingStats, Report, aggregate};
use crate::config::MapperConfig;
use crate::error::Result;
use crate::export::{event_rows, node_data, write_event_table, write_node_data};
use crate::index::CladeIndex;
use crate::io::write_labeled_tree;
use crate::resolve::CladeResolver;
use crate::summary::{fill_segments_from_tree, load_summary};
use crate::taxon::{TaxonDiscrepancy, TaxonUniverse};
use crate::tree::{LabeledTree, read_tree};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct MappingPaths {
    pub summary: PathBuf,
    pub source_tree: PathBuf,
    pub target_tree: PathBuf,
    pub labeled_tree: PathBuf,
    pub node_data: PathBuf,
    pub table: Option<PathBuf>,
}

/// Everything a mapping run produced, before export.
#[derive(Debug)]
pub struct MappingRun {
    pub target: LabeledTree,
    pub report: Report,
    pub stats: MappingStats,
    pub discrepancy: TaxonDiscrepancy,
}

/// Reads the inputs and maps every eligible summary event onto the target.
pub fn map_annotations(paths: &MappingPaths, config: &MapperConfig) -> Result<MappingRun> {
    info!("Using confidence threshold: {}", config.confidence_threshold);

    let t0 = Instant::now();
    let mut annotations = load_summary(&paths.summary)?;
    let target = read_tree(&paths.target_tree, &config.label_rules)?;
    let source = read_tree(&paths.source_tree, &config.label_rules)?;
    fill_segments_from_tree(&mut annotations, &source, &config.segments_key);
    info!(
        "Read {} summary entries, source {} nodes, target {} nodes ({} newly labeled) in {:.3}s",
        annotations.len(),
        source.len(),
        target.len(),
        target.synthetic_labels(),
        t0.elapsed().as_secs_f64()
    );

    let discrepancy = TaxonDiscrepancy::between(source.taxa(), target.taxa());
    discrepancy.log();

    let t1 = Instant::now();
    let universe = TaxonUniverse::new(source.taxa().chain(target.taxa()));
    let source_index = CladeIndex::build(&source, &universe);
    let target_index = CladeIndex::build(&target, &universe);
    info!(
        "Indexed {} taxa ({} source clades, {} target clades) in {:.3}s",
        universe.len(),
        source_index.forward.len(),
        target_index.forward.len(),
        t1.elapsed().as_secs_f64()
    );

    let t2 = Instant::now();
    let resolver = CladeResolver::new(&target, &target_index, &universe);
    let (report, stats) = aggregate(&annotations, &source_index, &resolver, config);
    info!("Mapped annotations onto {} target nodes in {:.3}s", report.len(), t2.elapsed().as_secs_f64());
    stats.log();

    Ok(MappingRun { target, report, stats, discrepancy })
}

/// Full run including writing every output.
pub fn run(paths: &MappingPaths, config: &MapperConfig) -> Result<MappingRun> {
    let mapped = map_annotations(paths, config)?;

    let t3 = Instant::now();
    write_labeled_tree(&paths.labeled_tree, &mapped.target)?;
    info!("Labeled target tree: {}", paths.labeled_tree.display());

    if mapped.report.is_empty() {
        warn!("No annotation was mapped; skipping node data and event table");
        return Ok(mapped);
    }

    write_node_data(&paths.node_data, &node_data(&mapped.report))?;
    info!("Node data: {}", paths.node_data.display());

    if let Some(table) = &paths.table {
        write_event_table(table, &event_rows(&mapped.report))?;
        info!("Event table: {}", table.display());
    }
    info!("Writing outputs {:.3}s", t3.elapsed().as_secs_f64());

    Ok(mapped)
}
