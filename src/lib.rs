//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `taxon`: leaf label normalization and the shared taxon universe.
//! - `annotation`: `[&key=value]` newick comment extraction and escaping.
//! - `tree`: newick ingestion into a labeled tree with stable node labels.
//! - `bitset`: compact bitset representation for clade leaf-sets.
//! - `index`: per-tree clade index (label → leaf-set and back).
//! - `resolve`: exact and enclosing clade resolution on the target tree.
//! - `summary`: reassortment summary JSON loading.
//! - `aggregate`: placing annotations on target clades with provenance.
//! - `export`: event table and node-data JSON.
//! - `io`: text/gzip reading and writing, newick serialization.
//! - `pipeline`: the end-to-end mapping run.
//! - `config` / `error`: run configuration and the shared error type.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod aggregate;
pub mod annotation;
pub mod bitset;
pub mod config;
pub mod error;
pub mod export;
pub mod index;
pub mod io;
pub mod pipeline;
pub mod resolve;
pub mod summary;
pub mod taxon;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use aggregate::{MappingStats, Provenance, Report, aggregate};
pub use bitset::Bitset;
pub use config::{LabelRules, MapperConfig};
pub use error::{MapperError, Result};
pub use index::CladeIndex;
pub use pipeline::{MappingPaths, MappingRun, map_annotations, run};
pub use resolve::{CladeResolver, Correspondence, MatchKind};
pub use taxon::{TaxonUniverse, normalize_taxon_label};
pub use tree::{LabeledTree, ingest, read_tree};
