//! Output artifacts built from a finished [`Report`].
//!
//! - an event table, one row per mapped target node
//!   (`node`, `events`, `provenance`), CSV or TSV by extension;
//! - node-data JSON for the tree visualization tool, with per-node
//!   attributes under `nodes` and short branch labels under `branches`.

use crate::aggregate::{NodeRecord, Report};
use crate::error::{MapperError, Result};
use crate::io::create_writer;
use itertools::Itertools;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

pub const BRANCH_LABEL_KEY: &str = "Reassorted Segments";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub node: String,
    /// Segment descriptions of all annotations on the node, joined with `", "`.
    pub events: String,
    pub provenance: String,
}

pub fn event_rows(report: &Report) -> Vec<EventRow> {
    report
        .iter()
        .map(|(node, record)| EventRow {
            node: node.to_string(),
            events: record
                .annotations()
                .map(|a| a.segments.trim())
                .filter(|s| !s.is_empty())
                .join(", "),
            provenance: record.provenance(),
        })
        .collect()
}

/// Write the event table. Paths ending in `.tsv` (or `.tsv.gz`) are
/// tab-separated, anything else comma-separated.
pub fn write_event_table(path: &Path, rows: &[EventRow]) -> Result<()> {
    let name = path.to_string_lossy();
    let delimiter = if name.trim_end_matches(".gz").ends_with(".tsv") { '\t' } else { ',' };

    let mut out = create_writer(path).map_err(|e| MapperError::io(path, e))?;
    let mut emit = |fields: [&str; 3]| -> std::io::Result<()> {
        let line = fields.iter().map(|f| csv_field(f, delimiter)).join(&delimiter.to_string());
        writeln!(out, "{line}")
    };

    emit(["node", "events", "provenance"]).map_err(|e| MapperError::io(path, e))?;
    for row in rows {
        emit([row.node.as_str(), row.events.as_str(), row.provenance.as_str()]).map_err(|e| MapperError::io(path, e))?;
    }
    out.flush().map_err(|e| MapperError::io(path, e))?;
    Ok(())
}

fn csv_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Node-data document consumed by the visualization export step.
#[derive(Debug, Clone, Serialize)]
pub struct NodeData {
    pub branch_attrs: BranchAttrs,
    pub nodes: BTreeMap<String, NodeAttrs>,
    pub branches: BTreeMap<String, BranchLabels>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchAttrs {
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeAttrs {
    #[serde(rename = "Reassorted")]
    pub reassorted: bool,
    /// Highest confidence among the node's annotations, 3 decimals.
    pub confidence: String,
    pub reassortment_events: String,
    pub segments_confidence: Map<String, Value>,
    pub provenance: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchLabels {
    pub labels: BTreeMap<String, String>,
}

pub fn node_data(report: &Report) -> NodeData {
    let mut nodes = BTreeMap::new();
    let mut branches = BTreeMap::new();

    for (node, record) in report.iter() {
        let segments = merged_segments(record);
        nodes.insert(
            node.to_string(),
            NodeAttrs {
                reassorted: true,
                confidence: format!("{:.3}", max_confidence(record)),
                reassortment_events: segments.join(", "),
                segments_confidence: merged_segment_confidence(record),
                provenance: record.provenance(),
            },
        );
        if !segments.is_empty() {
            let text = format!("{} ({})", segments.len(), segments.join(", "));
            branches.insert(
                node.to_string(),
                BranchLabels { labels: BTreeMap::from([(BRANCH_LABEL_KEY.to_string(), text)]) },
            );
        }
    }

    NodeData {
        branch_attrs: BranchAttrs {
            labels: BTreeMap::from([("text".to_string(), BRANCH_LABEL_KEY.to_string())]),
        },
        nodes,
        branches,
    }
}

pub fn write_node_data(path: &Path, data: &NodeData) -> Result<()> {
    let mut out = create_writer(path).map_err(|e| MapperError::io(path, e))?;
    serde_json::to_writer_pretty(&mut out, data)
        .map_err(|e| MapperError::Export { path: path.to_path_buf(), reason: e.to_string() })?;
    writeln!(out).map_err(|e| MapperError::io(path, e))?;
    out.flush().map_err(|e| MapperError::io(path, e))?;
    Ok(())
}

/// Segment names across all annotations, first occurrence order, no repeats.
fn merged_segments(record: &NodeRecord) -> Vec<&str> {
    record.annotations().flat_map(|a| a.segment_list()).unique().collect()
}

fn max_confidence(record: &NodeRecord) -> f64 {
    record.annotations().map(|a| a.confidence).fold(0.0, f64::max)
}

// First annotation to mention a segment wins.
fn merged_segment_confidence(record: &NodeRecord) -> Map<String, Value> {
    let mut merged = Map::new();
    for annotation in record.annotations() {
        if let Some(Value::Object(entries)) = &annotation.segments_confidence {
            for (segment, value) in entries {
                merged.entry(segment.clone()).or_insert_with(|| value.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::Bitset;
    use crate::summary::Annotation;

    fn event(label: &str, confidence: f64, segments: &str) -> Annotation {
        Annotation {
            source_label: label.to_string(),
            reassorted: true,
            confidence,
            segments: segments.to_string(),
            segments_confidence: None,
        }
    }

    fn sample_report() -> Report {
        let mut report = Report::default();
        report.record_direct("NODE_0", event("TS_1", 0.97, "PB2, PA"));
        report.record_inherited("NODE_0", event("TS_7", 0.991, "PA, HA"), Bitset::zeros(1));
        report.record_direct("NODE_1", event("TS_2", 0.96, ""));
        report
    }

    #[test]
    fn test_event_rows_concatenate_descriptions() {
        let rows = event_rows(&sample_report());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].node, "NODE_0");
        assert_eq!(rows[0].events, "PB2, PA, PA, HA");
        assert_eq!(rows[0].provenance, "DIRECT+SUBCLADE");
        assert_eq!(rows[1].events, "");
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("PB2, PA", ','), "\"PB2, PA\"");
        assert_eq!(csv_field("PB2, PA", '\t'), "PB2, PA");
        assert_eq!(csv_field("say \"hi\"", ','), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_write_event_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");
        write_event_table(&path, &event_rows(&sample_report())).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "node,events,provenance");
        assert_eq!(lines[1], "NODE_0,\"PB2, PA, PA, HA\",DIRECT+SUBCLADE");
        assert_eq!(lines[2], "NODE_1,,DIRECT");
    }

    #[test]
    fn test_node_data_merges_annotations() {
        let data = node_data(&sample_report());
        let node = &data.nodes["NODE_0"];
        assert_eq!(node.confidence, "0.991");
        assert_eq!(node.reassortment_events, "PB2, PA, HA");
        assert_eq!(data.branches["NODE_0"].labels[BRANCH_LABEL_KEY], "3 (PB2, PA, HA)");
        // No segments, no branch label.
        assert!(data.nodes.contains_key("NODE_1"));
        assert!(!data.branches.contains_key("NODE_1"));
    }

    #[test]
    fn test_node_data_json_shape() {
        let json = serde_json::to_value(node_data(&sample_report())).unwrap();
        assert_eq!(json["branch_attrs"]["labels"]["text"], BRANCH_LABEL_KEY);
        assert_eq!(json["nodes"]["NODE_0"]["Reassorted"], true);
        assert_eq!(json["nodes"]["NODE_1"]["provenance"], "DIRECT");
    }

    #[test]
    fn test_segment_confidence_first_wins() {
        let mut a = event("TS_1", 0.99, "PB2");
        a.segments_confidence = Some(serde_json::json!({"PB2": 0.9}));
        let mut b = event("TS_2", 0.99, "PB2, HA");
        b.segments_confidence = Some(serde_json::json!({"PB2": 0.5, "HA": 0.8}));
        let mut report = Report::default();
        report.record_direct("N", a);
        report.record_direct("N", b);
        let merged = &node_data(&report).nodes["N"].segments_confidence;
        assert_eq!(merged["PB2"], 0.9);
        assert_eq!(merged["HA"], 0.8);
    }
}
