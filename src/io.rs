use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{MapperError, Result};
use crate::tree::{LabeledTree, NodeId};

fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

/// Read a whole text file. If `path` ends with `.gz`, it is decompressed first.
pub fn read_text(path: &Path) -> Result<String> {
    let mut text = String::new();
    if is_gz(path) {
        let f = File::open(path).map_err(|e| MapperError::io(path, e))?;
        GzDecoder::new(f)
            .read_to_string(&mut text)
            .map_err(|e| MapperError::io(path, e))?;
    } else {
        text = fs::read_to_string(path).map_err(|e| MapperError::io(path, e))?;
    }
    Ok(text)
}

/// Open an output sink.
/// If `path` ends with `.gz`, the output is gzip-compressed.
/// If `path` equals `-`, output goes to stdout (uncompressed).
pub fn create_writer(path: &Path) -> io::Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }

    let f = File::create(path)?;
    let out: Box<dyn Write> = if is_gz(path) {
        Box::new(BufWriter::new(GzEncoder::new(f, Compression::default())))
    } else {
        Box::new(BufWriter::new(f))
    };
    Ok(out)
}

/// Write `content` to `path` through [`create_writer`].
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    let mut out = create_writer(path).map_err(|e| MapperError::io(path, e))?;
    out.write_all(content.as_bytes()).map_err(|e| MapperError::io(path, e))?;
    out.flush().map_err(|e| MapperError::io(path, e))?;
    Ok(())
}

/// Serialize a labeled tree as newick, every node carrying its final label.
///
/// Branch lengths are kept where present. Labels containing characters
/// reserved by the format are single-quoted.
pub fn format_newick(tree: &LabeledTree) -> String {
    enum Step {
        Enter(NodeId),
        Sep,
        Exit(NodeId),
    }

    let mut out = String::new();
    let mut stack = vec![Step::Enter(tree.root())];

    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(id) if tree.is_leaf(id) => push_node_suffix(&mut out, tree, id),
            Step::Enter(id) => {
                out.push('(');
                stack.push(Step::Exit(id));
                for (i, &child) in tree.children(id).iter().enumerate().rev() {
                    stack.push(Step::Enter(child));
                    if i > 0 {
                        stack.push(Step::Sep);
                    }
                }
            }
            Step::Sep => out.push(','),
            Step::Exit(id) => {
                out.push(')');
                push_node_suffix(&mut out, tree, id);
            }
        }
    }

    out.push(';');
    out
}

fn push_node_suffix(out: &mut String, tree: &LabeledTree, id: NodeId) {
    if let Some(label) = tree.label(id) {
        out.push_str(&quote_label(label));
    }
    if let Some(length) = tree.branch_length(id) {
        out.push(':');
        out.push_str(&length.to_string());
    }
}

fn quote_label(label: &str) -> String {
    let reserved = |c: char| c.is_whitespace() || "()[]':;,".contains(c);
    if label.contains(reserved) {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}

/// Write the labeled target tree, gzip-compressed if `path` ends with `.gz`.
pub fn write_labeled_tree(path: &Path, tree: &LabeledTree) -> Result<()> {
    let mut newick = format_newick(tree);
    newick.push('\n');
    write_text(path, &newick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LabelRules;
    use crate::tree::ingest;

    fn parse(text: &str) -> LabeledTree {
        ingest(text, Path::new("t.nwk"), &LabelRules::default()).unwrap()
    }

    #[test]
    fn test_format_keeps_labels_and_lengths() {
        let t = parse("((A:1,B:2)NODE_0:0.5,(C,D)NODE_1)ROOT;");
        assert_eq!(format_newick(&t), "((A:1,B:2)NODE_0:0.5,(C,D)NODE_1)ROOT;");
    }

    #[test]
    fn test_format_writes_synthetic_labels() {
        let t = parse("((A,B),(C,D));");
        assert_eq!(
            format_newick(&t),
            "((A,B)NODE_0000000,(C,D)NODE_0000001)NODE_0000002;"
        );
    }

    #[test]
    fn test_format_round_trips_through_ingest() {
        let first = parse("(((A|2020|2020,B|2021):0.1,C|2019),(D|2018,E|2017));");
        let text = format_newick(&first);
        let second = parse(&text);
        assert_eq!(format_newick(&second), text);
        assert_eq!(second.synthetic_labels(), 0);
    }

    #[test]
    fn test_quoted_labels_round_trip() {
        let first = parse("(('A/North Carolina/1/2020|2020-01-01':0.1,B|2020),'A,x|2020','it''s (2)')'my clade';");
        let text = format_newick(&first);
        assert_eq!(
            text,
            "(('A/North Carolina/1/2020|2020-01-01':0.1,B|2020)NODE_0000000,'A,x|2020','it''s (2)')'my clade';"
        );
        let second = parse(&text);
        assert_eq!(format_newick(&second), text);
        let mut taxa: Vec<_> = second.taxa().collect();
        taxa.sort();
        assert_eq!(taxa, vec!["A,x|2020", "A/North Carolina/1/2020|2020-01-01", "B|2020", "it's (2)"]);
    }

    #[test]
    fn test_quote_label() {
        assert_eq!(quote_label("A/x/2021|2021-05-01"), "A/x/2021|2021-05-01");
        assert_eq!(quote_label("has space"), "'has space'");
        assert_eq!(quote_label("it's"), "'it''s'");
    }

    #[test]
    fn test_gz_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.nwk.gz");
        let t = parse("((A,B),(C,D));");
        write_labeled_tree(&path, &t).unwrap();
        let text = read_text(&path).unwrap();
        assert_eq!(text.trim(), format_newick(&t));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_text(Path::new("/nonexistent/tree.nwk")).unwrap_err();
        assert!(matches!(err, MapperError::Io { .. }));
    }
}
