//! CIF (Crystallographic Information File) parser implementation.
//!
//! CIF is the text format in which crystal structures and the experiments
//! behind them are exchanged: data blocks of named items and looped tables.
//! This crate reads CIF 1.0 and 1.1 into a [`Document`], reporting every
//! violation it finds to a caller-supplied [`ErrorPolicy`] and recovering
//! from all of them unless told to stop.
//!
//! # Parsing Pipeline
//!
//! The parser operates in two phases driven by one pass over the input:
//!
//! 1. **Scanner**: Reads characters through a [`Cursor`] that tracks line
//!    and column, classifies them with the [`Rules`] attribute table, and
//!    emits grammar tokens (block and frame headers, `loop_`, data names,
//!    values) to a [`TokenSink`].
//!
//! 2. **Builder**: Checks the token sequence against the CIF grammar and
//!    assembles data blocks, save frames, scalar items and loops.
//!
//! The [`Parser`] wires both to an error policy. Text escapes in values are
//! left as written; [`escape::decode`] turns them into Unicode on request.

mod builder;
mod cursor;
mod document;
mod encode;
mod error;
pub mod escape;
mod parser;
mod rules;
mod scanner;
mod value;

pub use builder::Builder;
pub use cursor::{Cursor, ScanState};
pub use document::{
    is_valid_cell_code, is_valid_data_name, Cell, ColumnIter, DataBlock, DataCell, Document, Loop,
    SaveFrame, ScalarItem,
};
pub use encode::{encode, quote, Format, Node};
pub use error::{
    Collect, Diagnostic, EncodeError, ErrorCode, ErrorPolicy, Flow, Ignore, ParseError, Report,
    Result, Severity, Snapshot, Strict,
};
pub use parser::Parser;
pub use rules::{
    AttributeTable, Attributes, Rules, RulesError, CIF_1_0_MAX_BLOCK_NAME_LENGTH,
    CIF_1_0_MAX_LINE_LENGTH, CIF_1_1_MAX_LINE_LENGTH, CIF_1_1_MAX_NAME_LENGTH,
};
pub use scanner::{IgnoreWhitespace, Reporter, Scanner, TokenSink, WhitespaceSink};
pub use value::{CifValue, NumberValue, StringValue};

/// Parse a CIF document from a string, ignoring recoverable violations.
///
/// # Example
///
/// ```
/// use libcif::{parse, DataCell};
///
/// let doc = parse("data_quartz\n_cell_length_a 4.9134(2)\n").unwrap();
/// let a = doc.block("quartz").and_then(|b| b.get("_cell_length_a"));
/// assert_eq!(a.and_then(|v| v.as_f64()), Some(4.9134));
/// ```
pub fn parse(input: &str) -> Result<Document> {
    Parser::new().parse_str(input, &mut Ignore)
}

/// Parse a CIF document from raw bytes, each byte taken as one character.
pub fn parse_bytes(input: &[u8]) -> Result<Document> {
    Parser::new().parse_bytes(input, &mut Ignore)
}
