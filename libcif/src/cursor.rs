//! The scan cursor: one character of lookahead, position counters, and the
//! text of the token being built.

use std::io;

use crate::error::{submit, Diagnostic, ErrorCode, ErrorPolicy, Result, Snapshot};
use crate::rules::{Attributes, Rules};

/// A read-only view of the scanner's position.
///
/// Lines and columns are 1-based. The current character is `None` once the
/// input is exhausted.
pub trait ScanState {
    fn line(&self) -> usize;
    fn column(&self) -> usize;
    fn current_char(&self) -> Option<char>;
    fn previous_char(&self) -> Option<char>;
    /// The text accumulated since the current token started.
    fn token(&self) -> &str;
}

/// Reads characters from a source, classifying them through the rules'
/// attribute table.
pub struct Cursor<'r, S> {
    rules: &'r Rules,
    source: S,
    current: Option<char>,
    previous: Option<char>,
    line: usize,
    column: usize,
    token: String,
}

impl<'r, S> Cursor<'r, S>
where
    S: Iterator<Item = io::Result<char>>,
{
    /// Position a cursor on the first character of `source`.
    pub fn new(rules: &'r Rules, source: S, policy: &mut dyn ErrorPolicy) -> Result<Self> {
        // Start on a virtual line terminator before line 1.
        let mut cursor = Self {
            rules,
            source,
            current: Some('\n'),
            previous: None,
            line: 0,
            column: 0,
            token: String::new(),
        };
        cursor.advance(policy)?;
        Ok(cursor)
    }

    /// Accept the current character into the token and read the next one.
    pub fn advance(&mut self, policy: &mut dyn ErrorPolicy) -> Result<()> {
        loop {
            self.previous = self.current;
            if self.on_eof() {
                return Ok(());
            }
            if let Some(c) = self.current.filter(|_| self.line > 0) {
                self.token.push(c);
            }
            self.current = self.source.next().transpose()?;
            if self.on_eof() {
                return Ok(());
            }
            if let Some(c) = self.current {
                if !self.rules.attributes.is_legal(c) {
                    self.report(ErrorCode::IllegalChar, policy)?;
                    if self.on_eof() {
                        return Ok(());
                    }
                }
            }

            if self.previous == Some('\r') && self.current == Some('\n') {
                // The CR already advanced the line; take the LF as well.
                continue;
            }

            let after_terminator = self
                .previous
                .is_some_and(|c| self.rules.is_line_terminator(c));
            if after_terminator {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
                let at_limit = self
                    .rules
                    .max_line_length
                    .is_some_and(|limit| self.column == limit + 1);
                if at_limit && !self.on_eol() {
                    self.report(ErrorCode::LineLength, policy)?;
                }
            }
            return Ok(());
        }
    }

    /// Report an error at the current position. The policy may replace the
    /// current character.
    pub fn report(&mut self, code: ErrorCode, policy: &mut dyn ErrorPolicy) -> Result<()> {
        let diagnostic = Diagnostic::error(code, Snapshot::of(&*self));
        submit(policy, diagnostic, &mut self.current)
    }

    pub fn rules(&self) -> &'r Rules {
        self.rules
    }

    /// Forget the accumulated token text.
    pub fn start_token(&mut self) {
        self.token.clear();
    }

    fn check(&self, attr: Attributes) -> bool {
        self.current
            .is_some_and(|c| self.rules.attributes.check(attr, c))
    }

    pub fn on_eof(&self) -> bool {
        self.current.is_none() || self.check(Attributes::EOF_MARKER)
    }

    pub fn on_eol(&self) -> bool {
        self.on_eof() || self.check(Attributes::LINE_TERMINATOR)
    }

    pub fn on_whitespace(&self) -> bool {
        self.on_eol() || self.check(Attributes::WHITESPACE)
    }

    pub fn on_comment(&self) -> bool {
        self.check(Attributes::COMMENT_BEGIN)
    }

    pub fn on_inline_quote(&self) -> bool {
        self.check(Attributes::INLINE_QUOTE)
    }

    /// Block quote delimiters only count in column 1.
    pub fn on_block_quote(&self) -> bool {
        self.column == 1 && self.check(Attributes::BLOCK_QUOTE)
    }

    pub fn on_unquoted_token(&self) -> bool {
        self.check(Attributes::VALUE_BEGIN) || self.check(Attributes::NAME_BEGIN)
    }
}

impl<S> ScanState for Cursor<'_, S> {
    fn line(&self) -> usize {
        self.line
    }

    fn column(&self) -> usize {
        self.column
    }

    fn current_char(&self) -> Option<char> {
        self.current
    }

    fn previous_char(&self) -> Option<char> {
        self.previous
    }

    fn token(&self) -> &str {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Collect, Flow, Ignore, Report};

    fn chars(s: &str) -> impl Iterator<Item = io::Result<char>> + '_ {
        s.chars().map(Ok)
    }

    fn positions(input: &str) -> Vec<(char, usize, usize)> {
        let rules = Rules::cif_1_1();
        let mut cursor = Cursor::new(&rules, chars(input), &mut Ignore).unwrap();
        let mut out = Vec::new();
        while let Some(c) = cursor.current_char() {
            out.push((c, cursor.line(), cursor.column()));
            cursor.advance(&mut Ignore).unwrap();
        }
        out
    }

    #[test]
    fn test_positions() {
        assert_eq!(
            positions("ab\nc"),
            vec![('a', 1, 1), ('b', 1, 2), ('\n', 1, 3), ('c', 2, 1)]
        );
    }

    #[test]
    fn test_crlf_is_one_terminator() {
        let rules = Rules::cif_1_1();
        let mut cursor = Cursor::new(&rules, chars("a\r\nb\rc"), &mut Ignore).unwrap();
        let mut lines = Vec::new();
        while !cursor.on_eof() {
            if !cursor.on_eol() {
                lines.push((cursor.current_char(), cursor.line(), cursor.column()));
            }
            cursor.advance(&mut Ignore).unwrap();
        }
        assert_eq!(
            lines,
            vec![(Some('a'), 1, 1), (Some('b'), 2, 1), (Some('c'), 3, 1)]
        );
        assert_eq!(cursor.token(), "a\r\nb\rc");
    }

    #[test]
    fn test_token_accumulates() {
        let rules = Rules::cif_1_1();
        let mut cursor = Cursor::new(&rules, chars("abc def"), &mut Ignore).unwrap();
        assert_eq!(cursor.token(), "");
        cursor.advance(&mut Ignore).unwrap();
        cursor.advance(&mut Ignore).unwrap();
        assert_eq!(cursor.token(), "ab");
        cursor.start_token();
        cursor.advance(&mut Ignore).unwrap();
        assert_eq!(cursor.token(), "c");
        cursor.start_token();
        assert_eq!(cursor.token(), "");
        assert!(cursor.on_whitespace());
    }

    #[test]
    fn test_eof_marker_stops_input() {
        let rules = Rules::cif_1_1();
        let mut cursor = Cursor::new(&rules, chars("a\u{1a}b"), &mut Ignore).unwrap();
        cursor.advance(&mut Ignore).unwrap();
        assert!(cursor.on_eof());
        assert_eq!(cursor.current_char(), Some('\u{1a}'));
        cursor.advance(&mut Ignore).unwrap();
        assert_eq!(cursor.current_char(), Some('\u{1a}'));
    }

    #[test]
    fn test_line_length_reported_once_per_line() {
        let mut rules = Rules::cif_1_1();
        rules.max_line_length = Some(3);
        let mut collect = Collect::new();
        let mut cursor = Cursor::new(&rules, chars("abcdef\nabc\nabcd"), &mut collect).unwrap();
        while !cursor.on_eof() {
            cursor.advance(&mut collect).unwrap();
        }
        let reported: Vec<(ErrorCode, usize, usize)> = collect
            .diagnostics
            .iter()
            .map(|d| (d.code, d.at.line, d.at.column))
            .collect();
        assert_eq!(
            reported,
            vec![(ErrorCode::LineLength, 1, 4), (ErrorCode::LineLength, 3, 4)]
        );
    }

    #[test]
    fn test_no_line_limit() {
        let mut rules = Rules::cif_1_1();
        rules.max_line_length = None;
        let long = "x".repeat(5000);
        let mut collect = Collect::new();
        let mut cursor = Cursor::new(&rules, chars(&long), &mut collect).unwrap();
        while !cursor.on_eof() {
            cursor.advance(&mut collect).unwrap();
        }
        assert!(collect.diagnostics.is_empty());
    }

    #[test]
    fn test_illegal_char_substitution() {
        let rules = Rules::cif_1_1();
        let mut policy = |report: &mut Report<'_>| {
            if report.current_char() == Some('\u{b}') {
                report.replace_current_char(' ');
            }
            Flow::Continue
        };
        let mut cursor = Cursor::new(&rules, chars("a\u{b}b"), &mut policy).unwrap();
        cursor.advance(&mut policy).unwrap();
        assert_eq!(cursor.current_char(), Some(' '));
        assert!(cursor.on_whitespace());
    }

    #[test]
    fn test_illegal_char_abort() {
        let rules = Rules::cif_1_1();
        let mut abort = |_: &mut Report<'_>| Flow::Abort;
        let result = Cursor::new(&rules, chars("\u{7f}"), &mut abort);
        assert!(matches!(
            result,
            Err(crate::ParseError::Aborted(d)) if d.code == ErrorCode::IllegalChar
        ));
    }

    #[test]
    fn test_block_quote_only_in_column_one() {
        let rules = Rules::cif_1_1();
        let mut cursor = Cursor::new(&rules, chars(";x;"), &mut Ignore).unwrap();
        assert!(cursor.on_block_quote());
        cursor.advance(&mut Ignore).unwrap();
        cursor.advance(&mut Ignore).unwrap();
        assert_eq!(cursor.current_char(), Some(';'));
        assert!(!cursor.on_block_quote());
    }
}
