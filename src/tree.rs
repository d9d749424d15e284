//! Tree ingestion and bottom-up internal labeling.
//!
//! # Pipeline
//! 1. Structural sanity check (balanced parentheses, terminating `;`).
//! 2. Quoted labels and annotation values are protected and `[&...]` blocks
//!    extracted (see [`crate::annotation`]).
//! 3. The remaining newick is parsed by `phylotree`.
//! 4. A single post-order pass (children before parents):
//!    - re-attaches the extracted annotation fields to their nodes,
//!    - normalizes every leaf label into its taxon key,
//!    - names every unlabeled internal node `NODE_<seq>`, skipping sequence
//!      numbers whose label already occurs in the input,
//!    - renames a repeated internal label the same way, so every internal
//!      label is unique.
//!
//! Because the pass is post-order, every descendant has its final label
//! before its parent is considered, and the sequence numbers depend only on
//! the input text.

use crate::annotation::{self, Fields, FieldCodec, PLACEHOLDER_PREFIX};
use crate::config::LabelRules;
use crate::error::{MapperError, Result};
use crate::taxon::normalize_taxon_label;
use phylotree::tree::Tree as PhyloTree;
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub type NodeId = usize;

/// A parsed tree with final labels, parent back-references and annotations.
pub struct LabeledTree {
    tree: PhyloTree,
    root: NodeId,
    parents: HashMap<NodeId, NodeId>,
    postorder: Vec<NodeId>,
    by_label: HashMap<String, NodeId>,
    leaf_by_taxon: HashMap<String, NodeId>,
    annotations: HashMap<NodeId, Fields>,
    synthetic: usize,
}

/// Parses tree text into a [`LabeledTree`].
///
/// `origin` only names the file in error messages. Ingestion either fully
/// succeeds or returns [`MapperError::MalformedTree`].
pub fn ingest(text: &str, origin: &Path, rules: &LabelRules) -> Result<LabeledTree> {
    let text = text.trim();
    check_structure(text).map_err(|reason| MapperError::malformed_tree(origin, reason))?;

    let protected = FieldCodec::protect_quoted(text);
    let extracted = annotation::extract_annotations(&protected)
        .map_err(|reason| MapperError::malformed_tree(origin, reason))?;

    let mut tree = PhyloTree::from_newick(extracted.newick.trim())
        .map_err(|e| MapperError::malformed_tree(origin, e.to_string()))?;
    let root = tree
        .get_root()
        .map_err(|e| MapperError::malformed_tree(origin, e.to_string()))?;

    let (postorder, parents) = postorder_with_parents(&tree, root)
        .map_err(|reason| MapperError::malformed_tree(origin, reason))?;

    let mut fields = extracted.fields;
    let taken = existing_labels(&tree, &postorder);
    let mut annotations = HashMap::new();
    let mut by_label: HashMap<String, NodeId> = HashMap::new();
    let mut leaf_by_taxon = HashMap::new();
    let mut seq = 0usize;
    let mut synthetic = 0usize;

    for &id in &postorder {
        let node = tree
            .get_mut(&id)
            .map_err(|e| MapperError::malformed_tree(origin, e.to_string()))?;
        let raw = node.name.take().unwrap_or_default();
        let is_leaf = node.children.is_empty();

        let raw = if raw.starts_with(PLACEHOLDER_PREFIX) {
            if let Some(f) = fields.remove(&raw) {
                annotations.insert(id, f);
            }
            String::new()
        } else {
            if let Some(f) = fields.remove(annotation::unquote(&raw)) {
                annotations.insert(id, f);
            }
            FieldCodec::decode(&raw)
        };

        let label = if is_leaf {
            Some(normalize_taxon_label(&raw)).filter(|t| !t.is_empty())
        } else {
            let kept = annotation::unquote(&raw);
            if kept.is_empty() {
                synthetic += 1;
                Some(next_free_label(rules, &taken, &mut seq))
            } else if by_label.contains_key(kept) {
                let label = next_free_label(rules, &taken, &mut seq);
                tracing::warn!("internal label {kept:?} repeats in {}; renamed to {label}", origin.display());
                synthetic += 1;
                Some(label)
            } else {
                Some(kept.to_string())
            }
        };

        if let Some(label) = &label {
            if is_leaf {
                if leaf_by_taxon.contains_key(label) {
                    tracing::warn!("duplicate taxon {label:?} in {}; keeping the first leaf", origin.display());
                } else {
                    leaf_by_taxon.insert(label.clone(), id);
                }
            }
            by_label.entry(label.clone()).or_insert(id);
        }
        node.name = label;
    }

    Ok(LabeledTree { tree, root, parents, postorder, by_label, leaf_by_taxon, annotations, synthetic })
}

/// Reads a tree file (plain or `.gz`) and ingests it.
pub fn read_tree(path: &Path, rules: &LabelRules) -> Result<LabeledTree> {
    let text = crate::io::read_text(path)?;
    ingest(&text, path, rules)
}

impl std::fmt::Debug for LabeledTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabeledTree")
            .field("root", &self.root)
            .field("nodes", &self.postorder.len())
            .field("leaves", &self.leaf_by_taxon.len())
            .field("synthetic", &self.synthetic)
            .finish()
    }
}

impl LabeledTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// All nodes, children before parents.
    pub fn postorder(&self) -> &[NodeId] {
        &self.postorder
    }

    pub fn len(&self) -> usize {
        self.postorder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postorder.is_empty()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    /// Strict ancestors of `id`, nearest first, ending at the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.tree.get(&id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.children(id).is_empty()
    }

    /// Final label: normalized taxon for leaves, original or synthetic name otherwise.
    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.tree.get(&id).ok().and_then(|n| n.name.as_deref())
    }

    pub fn branch_length(&self, id: NodeId) -> Option<f64> {
        self.tree.get(&id).ok().and_then(|n| n.parent_edge)
    }

    pub fn find(&self, label: &str) -> Option<NodeId> {
        self.by_label.get(label).copied()
    }

    /// Leaf node carrying the given normalized taxon.
    pub fn leaf_of(&self, taxon: &str) -> Option<NodeId> {
        self.leaf_by_taxon.get(taxon).copied()
    }

    /// Normalized taxa of all leaves.
    pub fn taxa(&self) -> impl Iterator<Item = &str> + '_ {
        self.leaf_by_taxon.keys().map(String::as_str)
    }

    pub fn annotations(&self, id: NodeId) -> Option<&Fields> {
        self.annotations.get(&id)
    }

    /// Value of one embedded annotation field on the node named `label`.
    pub fn annotation(&self, label: &str, key: &str) -> Option<&str> {
        let id = self.find(label)?;
        self.annotations(id)?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of internal nodes that received a synthetic label.
    pub fn synthetic_labels(&self) -> usize {
        self.synthetic
    }
}

/// Final labels already present in the input, so synthetic ones never reuse them.
fn existing_labels(tree: &PhyloTree, postorder: &[NodeId]) -> HashSet<String> {
    postorder
        .iter()
        .filter_map(|id| tree.get(id).ok())
        .filter_map(|node| {
            let raw = node.name.as_deref()?;
            if raw.starts_with(PLACEHOLDER_PREFIX) {
                return None;
            }
            let decoded = FieldCodec::decode(raw);
            let label = if node.children.is_empty() {
                normalize_taxon_label(&decoded)
            } else {
                annotation::unquote(&decoded).to_string()
            };
            Some(label).filter(|l| !l.is_empty())
        })
        .collect()
}

fn next_free_label(rules: &LabelRules, taken: &HashSet<String>, seq: &mut usize) -> String {
    loop {
        let label = rules.label(*seq);
        *seq += 1;
        if !taken.contains(&label) {
            return label;
        }
    }
}

fn postorder_with_parents(
    tree: &PhyloTree,
    root: NodeId,
) -> std::result::Result<(Vec<NodeId>, HashMap<NodeId, NodeId>), String> {
    let mut order = Vec::new();
    let mut parents = HashMap::new();
    // (node, children already pushed)
    let mut stack = vec![(root, false)];

    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            order.push(id);
            continue;
        }
        let node = tree.get(&id).map_err(|e| e.to_string())?;
        stack.push((id, true));
        for &child in node.children.iter().rev() {
            if parents.insert(child, id).is_some() {
                return Err(format!("node {child} has more than one parent"));
            }
            stack.push((child, false));
        }
    }

    Ok((order, parents))
}

/// Cheap structural validation before handing text to the parser.
fn check_structure(text: &str) -> std::result::Result<(), String> {
    if text.is_empty() {
        return Err("empty tree text".to_string());
    }
    if !text.ends_with(';') {
        return Err(format!("missing terminating ';' near '{}'", tail(text)));
    }

    let mut depth = 0i64;
    let mut in_comment = false;
    let mut in_quotes = false;
    let mut in_label = false;
    let mut chars = text.char_indices().peekable();
    while let Some((pos, ch)) = chars.next() {
        if in_label {
            if ch == '\'' {
                // `''` is an escaped apostrophe inside a quoted label.
                if chars.peek().is_some_and(|&(_, next)| next == '\'') {
                    chars.next();
                } else {
                    in_label = false;
                }
            }
            continue;
        }
        match ch {
            '"' if !in_comment => in_quotes = !in_quotes,
            '\'' if !in_quotes && !in_comment => in_label = true,
            '[' if !in_quotes => in_comment = true,
            ']' if !in_quotes => in_comment = false,
            '(' if !in_quotes && !in_comment => depth += 1,
            ')' if !in_quotes && !in_comment => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("unbalanced ')' at byte {pos}"));
                }
            }
            _ => {}
        }
    }

    if in_label || in_quotes {
        return Err(format!("unterminated quote near '{}'", tail(text)));
    }
    if depth != 0 {
        return Err(format!("{depth} unclosed '(' near '{}'", tail(text)));
    }
    Ok(())
}

fn tail(text: &str) -> &str {
    let start = text.char_indices().rev().nth(30).map(|(i, _)| i).unwrap_or(0);
    &text[start..]
}
