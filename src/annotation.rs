//! Embedded node annotations in tree text.
//!
//! TreeSort-style trees carry per-node fields inside bracket comments, e.g.
//!
//! ```text
//! ((A,B)[&rea="PB2,PA",conf=0.98]:0.1,C);
//! ```
//!
//! The quoted value contains the same `,` that separates siblings and fields,
//! so annotation handling happens in two steps:
//!
//! 1. [`FieldCodec::protect_quoted`] replaces every reserved character inside
//!    a quoted value or quoted label with a `%XX` placeholder. After this, no
//!    structural character of the text is hidden inside a value or label.
//! 2. [`extract_annotations`] strips the `[...]` blocks out of the protected
//!    text, remembering which node each `[&...]` block belongs to, and leaves
//!    plain newick for the structural parser. Values are decoded with
//!    [`FieldCodec::decode`] when they are read back out.

use std::collections::HashMap;

/// Ordered `key = value` pairs attached to one node.
pub type Fields = Vec<(String, String)>;

/// Name given to an unlabeled node that owns an annotation block, so the
/// block can be re-attached after parsing. Removed again during ingestion.
pub const PLACEHOLDER_PREFIX: &str = "__annotated_node_";

/// Reversible `%XX` escaping of the characters the tree grammar reserves.
pub struct FieldCodec;

impl FieldCodec {
    // `%` must stay first so encoding never produces an ambiguous sequence.
    const RESERVED: [(char, &'static str); 12] = [
        ('%', "%25"),
        (',', "%2C"),
        ('(', "%28"),
        (')', "%29"),
        (':', "%3A"),
        (';', "%3B"),
        ('=', "%3D"),
        ('[', "%5B"),
        (']', "%5D"),
        ('\'', "%27"),
        (' ', "%20"),
        ('\t', "%09"),
    ];

    pub fn encode(value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for ch in value.chars() {
            Self::push_encoded(&mut out, ch);
        }
        out
    }

    fn push_encoded(out: &mut String, ch: char) {
        match Self::RESERVED.iter().find(|(c, _)| *c == ch) {
            Some((_, code)) => out.push_str(code),
            None => out.push(ch),
        }
    }

    pub fn decode(value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            match Self::RESERVED
                .iter()
                .find(|(_, code)| tail.get(..3).is_some_and(|t| t.eq_ignore_ascii_case(code)))
            {
                Some((ch, _)) => {
                    out.push(*ch);
                    rest = &tail[3..];
                }
                None => {
                    out.push('%');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Makes quoted runs opaque to the tree grammar.
    ///
    /// - `'single quoted'` labels lose their quotes and get every reserved
    ///   character, blank and `''` escape encoded, so the parser sees one
    ///   plain token and [`FieldCodec::decode`] restores the label exactly.
    /// - `"double quoted"` annotation values keep their quotes and get their
    ///   contents encoded.
    /// - A bare `%` is encoded everywhere so decoding never invents characters.
    ///
    /// Apostrophes inside `[...]` comments are left alone.
    pub fn protect_quoted(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        let mut in_double = false;
        let mut in_single = false;
        let mut in_comment = false;

        while let Some(ch) = chars.next() {
            if in_single {
                match ch {
                    '\'' if chars.peek() == Some(&'\'') => {
                        chars.next();
                        Self::push_encoded(&mut out, '\'');
                    }
                    '\'' => in_single = false,
                    _ => Self::push_encoded(&mut out, ch),
                }
                continue;
            }
            match ch {
                '"' => {
                    in_double = !in_double;
                    out.push(ch);
                }
                _ if in_double => Self::push_encoded(&mut out, ch),
                '\'' if !in_comment => in_single = true,
                '[' => {
                    in_comment = true;
                    out.push(ch);
                }
                ']' => {
                    in_comment = false;
                    out.push(ch);
                }
                '%' => Self::push_encoded(&mut out, ch),
                _ => out.push(ch),
            }
        }
        out
    }
}

/// Tree text with annotation blocks removed, plus the blocks themselves.
#[derive(Debug, Default)]
pub struct Extracted {
    /// Plain newick safe for the structural parser.
    pub newick: String,
    /// Fields keyed by the (unquoted) name of the node that owns them, or by
    /// the placeholder name inserted for an unlabeled owner.
    pub fields: HashMap<String, Fields>,
}

/// Splits `[...]` comments out of protected tree text.
///
/// `[&...]` blocks are parsed into fields and attached to the node token they
/// follow; this covers `name[&..]:len`, `name:[&..]len` and `name:len[&..]`.
/// Other bracket comments are dropped. Fails on an unterminated bracket.
pub fn extract_annotations(protected: &str) -> Result<Extracted, String> {
    let mut newick = String::with_capacity(protected.len());
    let mut fields: HashMap<String, Fields> = HashMap::new();
    let mut token_start = 0usize;
    let mut placeholders = 0usize;
    let mut chars = protected.char_indices();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '[' => {
                let body_start = pos + 1;
                let body_end = protected[body_start..]
                    .find(']')
                    .map(|off| body_start + off)
                    .ok_or_else(|| format!("unterminated comment at byte {pos}: '{}'", fragment(protected, pos)))?;
                let body = &protected[body_start..body_end];
                // Skip the consumed comment body and the closing bracket.
                for _ in protected[body_start..=body_end].chars() {
                    chars.next();
                }

                let Some(pairs) = body.strip_prefix('&') else { continue };
                let owner = owner_name(&newick[token_start..]);
                let key = if owner.is_empty() {
                    let placeholder = format!("{PLACEHOLDER_PREFIX}{placeholders}");
                    placeholders += 1;
                    insert_owner_name(&mut newick, token_start, &placeholder);
                    placeholder
                } else {
                    owner
                };
                fields.entry(key).or_default().extend(parse_fields(pairs));
            }
            '(' | ')' | ',' => {
                newick.push(ch);
                token_start = newick.len();
            }
            _ => newick.push(ch),
        }
    }

    Ok(Extracted { newick, fields })
}

/// Name part of a node token such as `NODE_1:0.25`, without quotes or padding.
pub(crate) fn owner_name(token: &str) -> String {
    let name = token.split(':').next().unwrap_or_default();
    unquote(name).to_string()
}

pub(crate) fn unquote(name: &str) -> &str {
    name.trim().trim_matches('\'').trim()
}

// Leading whitespace stays in front of the inserted name.
fn insert_owner_name(newick: &mut String, token_start: usize, name: &str) {
    let ws = newick[token_start..].len() - newick[token_start..].trim_start().len();
    newick.insert_str(token_start + ws, name);
}

fn parse_fields(pairs: &str) -> Fields {
    pairs
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (
                FieldCodec::decode(key.trim()),
                FieldCodec::decode(value.trim().trim_matches('"')),
            )
        })
        .collect()
}

fn fragment(text: &str, pos: usize) -> &str {
    let end = text[pos..].char_indices().nth(40).map(|(i, _)| pos + i).unwrap_or(text.len());
    &text[pos..end]
}
