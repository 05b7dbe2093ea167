//! Encode CIF documents to CIF and other output formats.
//!
//! [`quote`] gives the form in which a string can be written as a CIF value.
//! [`encode`] writes a whole [`Document`]: `Format::Cif` is a canonical CIF
//! that parses back to an equal document, `Format::Json` maps blocks to
//! objects keyed by data name. Other formats go through [`Node`], the
//! format-neutral tree also used by the command-line transcoders.

use num_bigint::BigInt;

use crate::document::{DataBlock, DataCell, Document, Loop};
use crate::error::EncodeError;
use crate::escape;
use crate::value::{CifValue, NumberValue, StringValue};

/// Output format for encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// CIF (canonical)
    Cif,
    /// JSON, one object per data block
    Json,
    /// YAML
    Yaml,
    /// TOML
    Toml,
    /// CBOR (binary)
    Cbor,
    /// CBOR diagnostic notation (RFC 8949 §8)
    CborDiag,
}

impl Format {
    /// The conventional file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Cif => "cif",
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Toml => "toml",
            Format::Cbor => "cbor",
            Format::CborDiag => "diag",
        }
    }
}

/// Encode a document in the specified format.
///
/// YAML, TOML, and CBOR are produced by the command-line tool from
/// [`Node`]; asking for them here returns [`EncodeError::UnsupportedFormat`].
pub fn encode(doc: &Document, format: Format) -> Result<String, EncodeError> {
    match format {
        Format::Cif => encode_cif(doc),
        Format::Json => Ok(encode_json(&Node::from_document(doc, false), 0)),
        Format::Yaml => Err(EncodeError::UnsupportedFormat("YAML")),
        Format::Toml => Err(EncodeError::UnsupportedFormat("TOML")),
        Format::Cbor | Format::CborDiag => Err(EncodeError::UnsupportedFormat("CBOR")),
    }
}

// =============================================================================
// Quoting
// =============================================================================

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{c}')
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{b}')
}

/// Whether `quote` followed by a blank occurs in `text`, which would end an
/// inline value delimited by `quote`.
fn closes(text: &str, quote: char) -> bool {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == quote && chars.peek().is_some_and(|&next| is_blank(next)) {
            return true;
        }
    }
    false
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.as_bytes()
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
}

fn is_reserved(text: &str) -> bool {
    starts_with_ignore_case(text, "data_")
        || starts_with_ignore_case(text, "save_")
        || ["loop_", "stop_", "global_"]
            .iter()
            .any(|word| text.eq_ignore_ascii_case(word))
}

/// Whether a single-line string must be quoted.
fn needs_quotes(text: &str) -> bool {
    let Some(first) = text.chars().next() else {
        return true;
    };
    text == "."
        || text == "?"
        || is_reserved(text)
        || first.is_ascii_digit()
        || ".+-_#$;[]'\"".contains(first)
        || text.chars().any(is_blank)
}

fn text_block(text: &str) -> Result<String, EncodeError> {
    let mut lines = text.split(is_line_terminator);
    lines.next();
    if lines.any(|line| line.starts_with(';')) {
        return Err(EncodeError::TextBlockDelimiter(text.to_string()));
    }
    Ok(wrap_text_block(text))
}

/// Delimit `text` as a text block without checking its lines.
///
/// The terminator before the closing `;` is dropped on reading. After a
/// trailing CR it must be another CR, since CR LF would read as one.
fn wrap_text_block(text: &str) -> String {
    let terminator = if text.ends_with('\r') { '\r' } else { '\n' };
    format!("\n;{}{};", text, terminator)
}

fn inline_quote(text: &str) -> Result<String, EncodeError> {
    if !closes(text, '\'') {
        Ok(format!("'{}'", text))
    } else if !closes(text, '"') {
        Ok(format!("\"{}\"", text))
    } else {
        Err(EncodeError::Unquotable(text.to_string()))
    }
}

/// Format a string as a CIF value, quoting only where necessary.
///
/// Strings with line terminators become text blocks, returned with the
/// leading line break they need: `"\n;line 1\nline 2\n;"`. Other strings
/// are quoted when they would otherwise read as something else (a reserved
/// word, a data name, a number, `.`, `?`) or contain blanks.
pub fn quote(text: &str) -> Result<String, EncodeError> {
    if text.contains(is_line_terminator) {
        text_block(text)
    } else if needs_quotes(text) {
        inline_quote(text)
    } else {
        Ok(text.to_string())
    }
}

/// Format a string that must read back as a quoted value.
fn quote_always(text: &str) -> Result<String, EncodeError> {
    if text.contains(is_line_terminator) {
        return text_block(text);
    }
    // A single-line text block holds what no inline quote can.
    inline_quote(text).or_else(|_| Ok(wrap_text_block(text)))
}

/// Whether unquoted `text` reads back as the same unquoted string.
fn is_bare(text: &str) -> bool {
    let Some(first) = text.chars().next() else {
        return false;
    };
    !is_reserved(text)
        && !"_#$'\";[]".contains(first)
        && !text.chars().any(|c| is_blank(c) || is_line_terminator(c))
        && matches!(CifValue::from_unquoted(text), CifValue::Text(_))
}

fn encode_value(value: &CifValue) -> Result<String, EncodeError> {
    match value {
        CifValue::NotApplicable => Ok(".".to_string()),
        CifValue::Unknown => Ok("?".to_string()),
        CifValue::Number(n) => Ok(n.to_string()),
        CifValue::Text(s) => encode_string(s),
    }
}

/// The CIF form of a string value: bare only if it was unquoted and reads
/// back the same way, quoted otherwise.
pub(crate) fn encode_string(value: &StringValue) -> Result<String, EncodeError> {
    if !value.was_quoted() && is_bare(value.as_str()) {
        Ok(value.as_str().to_string())
    } else {
        quote_always(value.as_str())
    }
}

// =============================================================================
// CIF Encoder
// =============================================================================

fn encode_cif(doc: &Document) -> Result<String, EncodeError> {
    let mut out = String::from("#\\#CIF_1.1\n");
    for block in doc.blocks() {
        out.push_str(&format!("\ndata_{}\n", block.name()));
        encode_cif_cell(block, &mut out)?;
        for frame in block.frames() {
            out.push_str(&format!("\nsave_{}\n", frame.name()));
            encode_cif_cell(frame, &mut out)?;
            out.push_str("save_\n");
        }
    }
    Ok(out)
}

fn encode_cif_cell(cell: &dyn DataCell, out: &mut String) -> Result<(), EncodeError> {
    for item in cell.items() {
        let value = encode_value(&item.value)?;
        out.push_str(&item.name);
        if !value.starts_with('\n') {
            out.push(' ');
        }
        out.push_str(&value);
        out.push('\n');
    }
    for lp in cell.loops() {
        encode_cif_loop(lp, out)?;
    }
    Ok(())
}

fn encode_cif_loop(lp: &Loop, out: &mut String) -> Result<(), EncodeError> {
    out.push_str("\nloop_\n");
    for name in lp.names() {
        out.push_str(name);
        out.push('\n');
    }
    for record in lp.records() {
        let values = record
            .iter()
            .map(encode_value)
            .collect::<Result<Vec<_>, _>>()?;
        let line = values.join(" ");
        out.push_str(line.strip_prefix('\n').unwrap_or(&line));
        out.push('\n');
    }
    Ok(())
}

// =============================================================================
// Format-Neutral Tree
// =============================================================================

/// A document as nested maps, lists and scalars.
///
/// Each data block is an object keyed by data name; looped names map to
/// arrays; save frames are nested objects keyed `save_<code>`. Unknown
/// values are null, inapplicable values the string `"."`. Integers and
/// plain decimals become numbers; a number with a standard uncertainty
/// stays a string so that the uncertainty is not lost.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Integer(BigInt),
    Float(f64),
    String(String),
    Array(Vec<Node>),
    /// Entries in document order.
    Object(Vec<(String, Node)>),
}

impl Node {
    /// Convert a document, optionally decoding text escapes in string values.
    pub fn from_document(doc: &Document, decode_escapes: bool) -> Node {
        Node::Object(
            doc.blocks()
                .iter()
                .map(|block| (block.name().to_string(), block_node(block, decode_escapes)))
                .collect(),
        )
    }

    /// Convert a single value.
    pub fn from_value(value: &CifValue, decode_escapes: bool) -> Node {
        match value {
            CifValue::Unknown => Node::Null,
            CifValue::NotApplicable => Node::String(".".to_string()),
            CifValue::Number(n) => number_node(n),
            CifValue::Text(s) if decode_escapes => Node::String(escape::decode(s.as_str())),
            CifValue::Text(s) => Node::String(s.as_str().to_string()),
        }
    }

    /// Render as JSON, in the layout `encode(doc, Format::Json)` uses.
    pub fn to_json(&self) -> String {
        encode_json(self, 0)
    }
}

fn number_node(n: &NumberValue) -> Node {
    if n.su().is_some() {
        return Node::String(n.to_string());
    }
    match n.to_bigint() {
        Some(i) => Node::Integer(i),
        None => Node::Float(n.to_f64()),
    }
}

fn cell_entries(cell: &dyn DataCell, decode_escapes: bool) -> Vec<(String, Node)> {
    let mut entries: Vec<(String, Node)> = cell
        .items()
        .iter()
        .map(|item| (item.name.clone(), Node::from_value(&item.value, decode_escapes)))
        .collect();
    for lp in cell.loops() {
        for name in lp.names() {
            let column = lp
                .column(name)
                .map(|values| values.map(|v| Node::from_value(v, decode_escapes)).collect())
                .unwrap_or_default();
            entries.push((name.clone(), Node::Array(column)));
        }
    }
    entries
}

fn block_node(block: &DataBlock, decode_escapes: bool) -> Node {
    let mut entries = cell_entries(block, decode_escapes);
    for frame in block.frames() {
        entries.push((
            format!("save_{}", frame.name()),
            Node::Object(cell_entries(frame, decode_escapes)),
        ));
    }
    Node::Object(entries)
}

// =============================================================================
// JSON Encoder
// =============================================================================

fn encode_json(node: &Node, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    let pad1 = "  ".repeat(indent + 1);

    match node {
        Node::Null => "null".to_string(),
        Node::Integer(n) => n.to_string(),
        Node::Float(f) => {
            if f.is_nan() || f.is_infinite() {
                "null".to_string() // JSON doesn't support NaN/Infinity
            } else {
                format!("{}", f)
            }
        }
        Node::String(s) => encode_json_string(s),
        Node::Array(arr) => {
            if arr.is_empty() {
                "[]".to_string()
            } else {
                let items: Vec<String> = arr.iter().map(|v| encode_json(v, indent + 1)).collect();
                format!("[{}]", items.join(", "))
            }
        }
        Node::Object(entries) => {
            if entries.is_empty() {
                "{}".to_string()
            } else {
                let items: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| {
                        format!("{}{}: {}", pad1, encode_json_string(k), encode_json(v, indent + 1))
                    })
                    .collect();
                format!("{{\n{}\n{}}}", items.join(",\n"), pad)
            }
        }
    }
}

fn encode_json_string(s: &str) -> String {
    let mut result = String::from("\"");
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\x08' => result.push_str("\\b"),
            '\x0c' => result.push_str("\\f"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result.push('"');
    result
}
