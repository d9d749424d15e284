//! Run configuration passed explicitly into ingestion, resolution and aggregation.

/// How internal nodes without a label get their synthetic identifier.
///
/// Labels look like `NODE_0000000`, `NODE_0000001`, ... with the sequence
/// zero-padded to `width` digits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelRules {
    pub prefix: String,
    pub width: usize,
}

impl Default for LabelRules {
    fn default() -> Self {
        LabelRules { prefix: "NODE_".to_string(), width: 7 }
    }
}

impl LabelRules {
    pub fn label(&self, seq: usize) -> String {
        format!("{}{:0width$}", self.prefix, seq, width = self.width)
    }
}

#[derive(Clone, Debug)]
pub struct MapperConfig {
    /// Minimum reassortment probability for an event to be mapped at all.
    pub confidence_threshold: f64,

    /// Emit per-node resolution tracing at debug level.
    pub debug: bool,

    pub label_rules: LabelRules,

    /// Embedded source-tree annotation holding the segment text, used when a
    /// summary entry has no `segments` field.
    pub segments_key: String,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            confidence_threshold: 0.95,
            debug: false,
            label_rules: LabelRules::default(),
            segments_key: "rea".to_string(),
        }
    }
}
