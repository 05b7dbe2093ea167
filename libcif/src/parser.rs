//! Parser: wires the scanner, the grammar builder, and an error policy.
//!
//! The default [`Parser`] accepts anything that is valid under either CIF
//! 1.0 or CIF 1.1. It scans with the stricter limits of the two and
//! downgrades the reports that only one revision objects to into warnings
//! carrying a compliance note. [`Parser::cif_1_0`] and [`Parser::cif_1_1`]
//! apply one revision exactly.

use std::io::{self, BufReader, Read};

use crate::builder::Builder;
use crate::document::Document;
use crate::error::{ErrorCode, ErrorPolicy, Flow, Report, Result};
use crate::rules::{Rules, CIF_1_1_MAX_LINE_LENGTH, CIF_1_1_MAX_NAME_LENGTH};
use crate::scanner::{IgnoreWhitespace, Reporter, Scanner};

const CIF_1_0_NOTE: &str = "CIF 1.0 compliance warning";
const CIF_1_1_NOTE: &str = "CIF 1.1 compliance warning";

/// A reusable CIF parser configuration.
#[derive(Debug, Clone)]
pub struct Parser {
    scanner: Scanner,
    compatibility: bool,
    unfold_lines: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// A parser for CIF 1.0 and 1.1 alike, with CIF 1.1 line unfolding.
    pub fn new() -> Self {
        Self {
            scanner: Scanner::new(Rules::intersection()),
            compatibility: true,
            unfold_lines: true,
        }
    }

    /// Exactly the CIF 1.0 rules.
    pub fn cif_1_0() -> Self {
        Self::with_rules(Rules::cif_1_0())
    }

    /// Exactly the CIF 1.1 rules.
    pub fn cif_1_1() -> Self {
        Self::with_rules(Rules::cif_1_1())
    }

    /// Custom rules, reported as they are.
    pub fn with_rules(rules: Rules) -> Self {
        Self {
            scanner: Scanner::new(rules),
            compatibility: false,
            unfold_lines: false,
        }
    }

    pub fn rules(&self) -> &Rules {
        self.scanner.rules()
    }

    pub fn rules_mut(&mut self) -> &mut Rules {
        self.scanner.rules_mut()
    }

    pub fn set_max_line_length(&mut self, limit: Option<usize>) {
        self.rules_mut().max_line_length = limit;
    }

    pub fn set_max_block_name_length(&mut self, limit: Option<usize>) {
        self.rules_mut().max_block_name_length = limit;
    }

    pub fn set_max_frame_name_length(&mut self, limit: Option<usize>) {
        self.rules_mut().max_frame_name_length = limit;
    }

    pub fn set_max_data_name_length(&mut self, limit: Option<usize>) {
        self.rules_mut().max_data_name_length = limit;
    }

    pub fn set_vt_allowed(&mut self, allowed: bool) {
        self.rules_mut().set_vt_allowed(allowed);
    }

    pub fn set_ff_allowed(&mut self, allowed: bool) {
        self.rules_mut().set_ff_allowed(allowed);
    }

    pub fn set_square_brackets_special(&mut self, special: bool) {
        self.rules_mut().set_square_brackets_special(special);
    }

    pub fn set_unfolding_lines(&mut self, unfold: bool) {
        self.unfold_lines = unfold;
    }

    pub fn is_unfolding_lines(&self) -> bool {
        self.unfold_lines
    }

    /// Whether revision-specific reports are downgraded to warnings.
    pub fn set_compatibility(&mut self, downgrade: bool) {
        self.compatibility = downgrade;
    }

    pub fn parse_str(&self, text: &str, policy: &mut dyn ErrorPolicy) -> Result<Document> {
        self.parse_chars(text.chars().map(Ok), policy)
    }

    /// Parse raw bytes, each byte taken as the character with that code.
    pub fn parse_bytes(&self, bytes: &[u8], policy: &mut dyn ErrorPolicy) -> Result<Document> {
        self.parse_chars(bytes.iter().map(|&b| Ok(char::from(b))), policy)
    }

    /// Parse a byte stream, with the same byte-to-character mapping as
    /// [`Parser::parse_bytes`].
    pub fn parse_reader<R: Read>(
        &self,
        reader: R,
        policy: &mut dyn ErrorPolicy,
    ) -> Result<Document> {
        let bytes = BufReader::new(reader).bytes();
        self.parse_chars(bytes.map(|b| b.map(char::from)), policy)
    }

    fn parse_chars<S>(&self, source: S, policy: &mut dyn ErrorPolicy) -> Result<Document>
    where
        S: Iterator<Item = io::Result<char>>,
    {
        let mut builder = Builder::new();
        builder.set_unfolding_lines(self.unfold_lines);

        let mut compatibility;
        let policy: &mut dyn ErrorPolicy = if self.compatibility {
            compatibility = Compatibility { policy };
            &mut compatibility
        } else {
            policy
        };

        let end = self
            .scanner
            .scan(source, &mut builder, &mut IgnoreWhitespace, &mut *policy)?;
        let mut reporter = Reporter::new(&end, policy);
        builder.finish(&mut reporter)
    }
}

/// Downgrades reports that only one CIF revision objects to, then passes
/// every report on.
struct Compatibility<'a> {
    policy: &'a mut dyn ErrorPolicy,
}

impl Compatibility<'_> {
    fn note(report: &Report<'_>) -> Option<&'static str> {
        let at = &report.diagnostic().at;
        match report.code() {
            ErrorCode::LineLength if at.column < CIF_1_1_MAX_LINE_LENGTH => Some(CIF_1_0_NOTE),
            ErrorCode::BlockNameLength => {
                let name_length = at.token.chars().count().saturating_sub("data_".len());
                (name_length <= CIF_1_1_MAX_NAME_LENGTH).then_some(CIF_1_0_NOTE)
            }
            ErrorCode::DataNameLength => Some(CIF_1_1_NOTE),
            ErrorCode::IllegalChar if matches!(at.current, Some('\u{b}' | '\u{c}')) => {
                Some(CIF_1_1_NOTE)
            }
            ErrorCode::IllegalValueStart if matches!(at.current, Some('[' | ']')) => {
                Some(CIF_1_1_NOTE)
            }
            ErrorCode::ReservedWord => {
                let token = at.token.as_bytes();
                let named_frame = token.len() > "save_".len()
                    && token[.."save_".len()].eq_ignore_ascii_case(b"save_");
                named_frame.then_some(CIF_1_0_NOTE)
            }
            _ => None,
        }
    }
}

impl ErrorPolicy for Compatibility<'_> {
    fn handle(&mut self, report: &mut Report<'_>) -> Flow {
        if let Some(note) = Self::note(report) {
            match report.current_char() {
                Some('\u{b}') if report.code() == ErrorCode::IllegalChar => {
                    report.replace_current_char(' ')
                }
                Some('\u{c}') if report.code() == ErrorCode::IllegalChar => {
                    report.replace_current_char('\n')
                }
                _ => {}
            }
            report.downgrade(note);
        }
        self.policy.handle(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DataCell;
    use crate::error::{Collect, Diagnostic, ParseError, Severity, Strict};

    fn collect(parser: &Parser, input: &str) -> (Document, Vec<Diagnostic>) {
        let mut collect = Collect::new();
        let doc = parser.parse_str(input, &mut collect).unwrap();
        (doc, collect.diagnostics)
    }

    fn summary(diagnostics: &[Diagnostic]) -> Vec<(ErrorCode, Severity)> {
        diagnostics.iter().map(|d| (d.code, d.severity)).collect()
    }

    #[test]
    fn test_parse_simple() {
        let doc = crate::parse("data_x\n_a 1\n").unwrap();
        let block = doc.block("x").unwrap();
        assert_eq!(block.get("_a").and_then(|v| v.as_f64()), Some(1.0));
    }

    #[test]
    fn test_line_length_downgraded() {
        let line = format!("data_x\n_a {}\n", "x".repeat(100));
        let (_, diagnostics) = collect(&Parser::new(), &line);
        assert_eq!(summary(&diagnostics), vec![(ErrorCode::LineLength, Severity::Warning)]);
        assert_eq!(diagnostics[0].note.as_deref(), Some(CIF_1_0_NOTE));
        assert_eq!(diagnostics[0].at.line, 2);

        let (_, diagnostics) = collect(&Parser::cif_1_0(), &line);
        assert_eq!(summary(&diagnostics), vec![(ErrorCode::LineLength, Severity::Error)]);

        let (_, diagnostics) = collect(&Parser::cif_1_1(), &line);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_one_line_length_report_per_line() {
        let input = format!("data_x\n_a {}\n_b {}\n", "x".repeat(200), "y".repeat(10));
        let (_, diagnostics) = collect(&Parser::cif_1_0(), &input);
        assert_eq!(summary(&diagnostics), vec![(ErrorCode::LineLength, Severity::Error)]);
    }

    #[test]
    fn test_block_name_length() {
        let (_, diagnostics) = collect(&Parser::new(), &format!("data_{}\n", "b".repeat(40)));
        assert_eq!(
            summary(&diagnostics),
            vec![(ErrorCode::BlockNameLength, Severity::Warning)]
        );
        let (_, diagnostics) = collect(&Parser::new(), &format!("data_{}\n", "b".repeat(76)));
        assert_eq!(
            summary(&diagnostics),
            vec![
                (ErrorCode::LineLength, Severity::Warning),
                (ErrorCode::BlockNameLength, Severity::Error)
            ]
        );
    }

    #[test]
    fn test_data_name_length_downgraded() {
        let input = format!("data_x\n_{} 1\n", "n".repeat(75));
        let (doc, diagnostics) = collect(&Parser::new(), &input);
        assert_eq!(
            summary(&diagnostics),
            vec![(ErrorCode::DataNameLength, Severity::Warning)]
        );
        assert_eq!(diagnostics[0].note.as_deref(), Some(CIF_1_1_NOTE));
        assert_eq!(doc.block("x").unwrap().items().len(), 1);
    }

    #[test]
    fn test_vt_and_ff_substituted() {
        let (doc, diagnostics) = collect(&Parser::new(), "data_x\u{b}_a\u{c}1\n");
        assert_eq!(
            summary(&diagnostics),
            vec![
                (ErrorCode::IllegalChar, Severity::Warning),
                (ErrorCode::IllegalChar, Severity::Warning)
            ]
        );
        assert!(doc.block("x").unwrap().get("_a").is_some());

        let (_, diagnostics) = collect(&Parser::cif_1_0(), "data_x\u{b}_a 1\n");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_square_brackets_downgraded() {
        let (doc, diagnostics) = collect(&Parser::new(), "data_x _a [1]\n");
        assert_eq!(
            summary(&diagnostics),
            vec![(ErrorCode::IllegalValueStart, Severity::Warning)]
        );
        assert_eq!(
            doc.block("x").unwrap().get("_a").and_then(|v| v.as_str()),
            Some("[1]")
        );
    }

    #[test]
    fn test_save_frame_downgraded() {
        let (doc, diagnostics) = collect(&Parser::new(), "data_x save_f _a 1 save_ save_\n");
        assert_eq!(
            summary(&diagnostics),
            vec![
                (ErrorCode::ReservedWord, Severity::Warning),
                (ErrorCode::ReservedWord, Severity::Error)
            ]
        );
        assert!(doc.block("x").unwrap().frame("f").is_some());
    }

    #[test]
    fn test_strict_passes_warnings() {
        let doc = Parser::new()
            .parse_str("data_x _a [1]\nsave_f _b 2 save_\n", &mut Strict)
            .unwrap();
        assert!(doc.block("x").is_some());

        let result = Parser::new().parse_str("data_x _a\n", &mut Strict);
        assert!(matches!(
            result,
            Err(ParseError::Aborted(d)) if d.code == ErrorCode::DataValueMissing
        ));
    }

    #[test]
    fn test_unfolding_default() {
        let input = "data_x _a\n;\\\nab\\\ncd\n;\n";
        let (doc, diagnostics) = collect(&Parser::new(), input);
        assert_eq!(
            summary(&diagnostics),
            vec![(ErrorCode::TextUnfolded, Severity::Warning)]
        );
        assert_eq!(
            doc.block("x").unwrap().get("_a").and_then(|v| v.as_str()),
            Some("abcd")
        );
        let (doc, _) = collect(&Parser::cif_1_1(), input);
        assert_eq!(
            doc.block("x").unwrap().get("_a").and_then(|v| v.as_str()),
            Some("\\\nab\\\ncd")
        );
    }

    #[test]
    fn test_parse_bytes_maps_latin1() {
        let doc = crate::parse_bytes(b"data_x _a caf\xe9\n").unwrap();
        assert_eq!(
            doc.block("x").unwrap().get("_a").and_then(|v| v.as_str()),
            Some("caf\u{e9}")
        );
    }

    #[test]
    fn test_parse_reader() {
        let input: &[u8] = b"data_x\nloop_ _a 1 2 3\n";
        let doc = Parser::new().parse_reader(input, &mut Strict).unwrap();
        assert_eq!(doc.block("x").unwrap().loops()[0].len(), 3);
    }

    #[test]
    fn test_setters() {
        let mut parser = Parser::cif_1_1();
        parser.set_max_line_length(Some(10));
        parser.set_max_data_name_length(None);
        assert_eq!(parser.rules().max_line_length, Some(10));
        let (_, diagnostics) = collect(&parser, "data_x\n_a 12345678901\n");
        assert_eq!(summary(&diagnostics), vec![(ErrorCode::LineLength, Severity::Error)]);

        parser.set_unfolding_lines(true);
        assert!(parser.is_unfolding_lines());
    }

    #[test]
    fn test_parser_reusable() {
        let parser = Parser::new();
        let first = parser.parse_str("data_a _x 1\n", &mut Strict).unwrap();
        let second = parser.parse_str("data_b _y 2\n", &mut Strict).unwrap();
        assert!(first.block("b").is_none());
        assert!(second.block("a").is_none());
    }
}
