//! Python binding layer for reassortment mapping.
//!
//! Exposes taxon normalization and an in-memory mapping run that returns
//! the event table rows instead of writing files.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::path::PathBuf;

use crate::config::MapperConfig;
use crate::export::event_rows;
use crate::pipeline::{MappingPaths, map_annotations};

/// Canonical `strain|date` key for a leaf label.
///
/// Args:
///     label: Raw leaf label, possibly quoted or carrying extra `|` fields
///
/// Returns:
///     The first two `|`-separated fields, stripped of whitespace and quotes
#[pyfunction]
fn normalize_taxon_label(label: &str) -> String {
    crate::taxon::normalize_taxon_label(label)
}

/// Map summary events from a source tree onto a target tree.
///
/// Args:
///     summary_json: Path to the reassortment summary JSON
///     source_tree: Path to the newick tree the summary refers to
///     target_tree: Path to the newick tree to annotate
///     confidence_threshold: Minimum reassortment probability (default: 0.95)
///
/// Returns:
///     A list of (node, events, provenance) tuples ordered by node label
///
/// Raises:
///     ValueError: If an input cannot be read or parsed
#[pyfunction]
#[pyo3(signature = (summary_json, source_tree, target_tree, confidence_threshold=0.95))]
fn map_reassortment(
    summary_json: String,
    source_tree: String,
    target_tree: String,
    confidence_threshold: f64,
) -> PyResult<Vec<(String, String, String)>> {
    let paths = MappingPaths {
        summary: PathBuf::from(summary_json),
        source_tree: PathBuf::from(source_tree),
        target_tree: PathBuf::from(target_tree),
        labeled_tree: PathBuf::new(),
        node_data: PathBuf::new(),
        table: None,
    };
    let config = MapperConfig { confidence_threshold, ..Default::default() };

    let mapped = map_annotations(&paths, &config).map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(event_rows(&mapped.report)
        .into_iter()
        .map(|row| (row.node, row.events, row.provenance))
        .collect())
}

/// Python module definition
#[pymodule]
fn reassort_mapper(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(normalize_taxon_label, m)?)?;
    m.add_function(wrap_pyfunction!(map_reassortment, m)?)?;
    Ok(())
}
