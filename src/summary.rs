//! Per-node reassortment summary records.
//!
//! The summary is a JSON object keyed by source node label:
//!
//! ```json
//! {
//!   "TS_NODE_12": {
//!     "reassorted": "True",
//!     "reassorted confidence": {"True": 0.981, "False": 0.019},
//!     "segments": "PB2, PA",
//!     "segments confidence": {"PB2": 0.99, "PA": 0.97}
//!   }
//! }
//! ```
//!
//! Entries are kept in file order, which is the order their annotations
//! accumulate in the report.

use crate::error::{MapperError, Result};
use crate::tree::LabeledTree;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

/// One source-node event, carried unchanged into the report.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub source_label: String,
    pub reassorted: bool,
    pub confidence: f64,
    /// Free-text, comma separated list of affected segments.
    pub segments: String,
    pub segments_confidence: Option<Value>,
}

impl Annotation {
    /// Reassorted with at least the given confidence.
    pub fn is_eligible(&self, threshold: f64) -> bool {
        self.reassorted && self.confidence >= threshold
    }

    pub fn segment_list(&self) -> Vec<&str> {
        self.segments.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
    }
}

#[derive(Debug, Deserialize)]
struct SummaryEntry {
    reassorted: Flag,
    #[serde(rename = "reassorted confidence")]
    reassorted_confidence: Map<String, Value>,
    #[serde(default)]
    segments: Option<String>,
    #[serde(rename = "segments confidence", default)]
    segments_confidence: Option<Value>,
}

/// `"True"` / `"False"` as written by the detection tool, or a JSON bool.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Text(s) => s.eq_ignore_ascii_case("true"),
        }
    }
}

pub fn load_summary(path: &Path) -> Result<Vec<Annotation>> {
    let text = crate::io::read_text(path)?;
    parse_summary(&text, path)
}

/// Parses summary JSON. `origin` only names the file in error messages.
pub fn parse_summary(text: &str, origin: &Path) -> Result<Vec<Annotation>> {
    let malformed = |reason: String| MapperError::MalformedSummary { path: origin.to_path_buf(), reason };

    let entries: Map<String, Value> = serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;

    entries
        .into_iter()
        .map(|(label, value)| -> Result<Annotation> {
            let entry: SummaryEntry =
                serde_json::from_value(value).map_err(|e| malformed(format!("entry '{label}': {e}")))?;
            Ok(Annotation {
                confidence: entry.reassorted_confidence.get("True").and_then(Value::as_f64).unwrap_or(0.0),
                reassorted: entry.reassorted.is_set(),
                segments: entry.segments.unwrap_or_default(),
                segments_confidence: entry.segments_confidence,
                source_label: label,
            })
        })
        .collect()
}

/// Fills empty segment descriptions from an embedded source-tree annotation.
pub fn fill_segments_from_tree(annotations: &mut [Annotation], source: &LabeledTree, key: &str) {
    for annotation in annotations.iter_mut().filter(|a| a.segments.trim().is_empty()) {
        if let Some(value) = source.annotation(&annotation.source_label, key) {
            annotation.segments = value.to_string();
        }
    }
}
