//! Lexical scanner
//!
//! The scanner turns a character source into grammar tokens (data block and
//! save frame headers, `loop_`, data names, values) and whitespace/comment
//! runs. It never backtracks and buffers only the token being built.
//! Lexical violations are reported to the error policy; unless the policy
//! aborts, the scanner applies a fixed recovery and keeps going.

use std::io;

use crate::cursor::{Cursor, ScanState};
use crate::error::{submit, Diagnostic, ErrorCode, ErrorPolicy, Result, Snapshot};
use crate::rules::{Attributes, Rules};

/// Passes reports from token consumers to the error policy.
pub struct Reporter<'a> {
    state: &'a dyn ScanState,
    policy: &'a mut dyn ErrorPolicy,
}

impl<'a> Reporter<'a> {
    pub fn new(state: &'a dyn ScanState, policy: &'a mut dyn ErrorPolicy) -> Self {
        Self { state, policy }
    }

    /// The scanner position at which the current token ended.
    pub fn state(&self) -> &dyn ScanState {
        self.state
    }

    /// Report an error; `Err` means the policy aborted.
    pub fn error(&mut self, code: ErrorCode) -> Result<()> {
        self.submit(Diagnostic::error(code, Snapshot::of(self.state)))
    }

    /// Report a warning; the policy may still abort.
    pub fn warning(&mut self, code: ErrorCode) -> Result<()> {
        self.submit(Diagnostic::warning(code, Snapshot::of(self.state)))
    }

    fn submit(&mut self, diagnostic: Diagnostic) -> Result<()> {
        // Consumers cannot rewrite input that has already been scanned.
        let mut current = self.state.current_char();
        submit(&mut *self.policy, diagnostic, &mut current)
    }
}

/// Consumer of grammar-relevant tokens.
pub trait TokenSink {
    /// `data_NAME`
    fn block_header(&mut self, name: &str, reporter: &mut Reporter<'_>) -> Result<()>;

    /// `save_NAME`
    fn save_frame_header(&mut self, name: &str, reporter: &mut Reporter<'_>) -> Result<()>;

    /// Bare `save_`.
    fn save_frame_end(&mut self, reporter: &mut Reporter<'_>) -> Result<()>;

    fn loop_start(&mut self, reporter: &mut Reporter<'_>) -> Result<()>;

    fn data_name(&mut self, name: &str, reporter: &mut Reporter<'_>) -> Result<()>;

    /// An inline-quoted value or a text block, without its delimiters.
    fn quoted_value(
        &mut self,
        text: &str,
        delimiter: char,
        reporter: &mut Reporter<'_>,
    ) -> Result<()>;

    fn unquoted_value(&mut self, text: &str, reporter: &mut Reporter<'_>) -> Result<()>;
}

/// Consumer of whitespace runs and comments. Ignores everything by default.
pub trait WhitespaceSink {
    fn whitespace(&mut self, _text: &str, _state: &dyn ScanState) -> Result<()> {
        Ok(())
    }

    /// Comment text, without the leading `#`.
    fn comment(&mut self, _text: &str, _state: &dyn ScanState) -> Result<()> {
        Ok(())
    }
}

/// Discards whitespace and comments.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreWhitespace;

impl WhitespaceSink for IgnoreWhitespace {}

/// A configured lexical scanner. Reusable across inputs.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    rules: Rules,
}

impl Scanner {
    pub fn new(rules: Rules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut Rules {
        &mut self.rules
    }

    /// Scan `source` to its end, returning the final cursor state.
    pub fn scan<S>(
        &self,
        source: S,
        tokens: &mut dyn TokenSink,
        whitespace: &mut dyn WhitespaceSink,
        policy: &mut dyn ErrorPolicy,
    ) -> Result<Snapshot>
    where
        S: Iterator<Item = io::Result<char>>,
    {
        tracing::debug!("scan started");
        let cursor = Cursor::new(&self.rules, source, &mut *policy)?;
        let mut scan = Scan {
            cursor,
            tokens,
            whitespace,
            policy,
        };
        scan.run()?;
        let end = Snapshot::of(&scan.cursor);
        tracing::debug!(lines = end.line, "scan finished");
        Ok(end)
    }
}

/// State of one scan in progress.
struct Scan<'a, S> {
    cursor: Cursor<'a, S>,
    tokens: &'a mut dyn TokenSink,
    whitespace: &'a mut dyn WhitespaceSink,
    policy: &'a mut dyn ErrorPolicy,
}

/// What an unquoted token turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unquoted {
    DataName,
    BlockHeader,
    FrameHeader,
    FrameEnd,
    LoopStart,
    Reserved,
    Value,
}

/// Length of `data_` and `save_`.
const HEADER_PREFIX: usize = 5;

fn starts_with_ignore_case(token: &str, prefix: &str) -> bool {
    token
        .as_bytes()
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
}

fn classify(token: &str, rules: &Rules) -> Unquoted {
    let starts_name = token
        .chars()
        .next()
        .is_some_and(|c| rules.attributes.check(Attributes::NAME_BEGIN, c));
    if starts_name {
        return Unquoted::DataName;
    }
    if starts_with_ignore_case(token, "data_") {
        return if token.len() == HEADER_PREFIX {
            Unquoted::Reserved
        } else {
            Unquoted::BlockHeader
        };
    }
    if token.eq_ignore_ascii_case("loop_") {
        return Unquoted::LoopStart;
    }
    if token.eq_ignore_ascii_case("global_") || token.eq_ignore_ascii_case("stop_") {
        return Unquoted::Reserved;
    }
    if starts_with_ignore_case(token, "save_") {
        return if token.len() == HEADER_PREFIX {
            Unquoted::FrameEnd
        } else {
            Unquoted::FrameHeader
        };
    }
    Unquoted::Value
}

fn exceeds(len: usize, limit: Option<usize>) -> bool {
    limit.is_some_and(|limit| len > limit)
}

/// Strip the line terminator that precedes a closing text block delimiter.
fn strip_line_terminator<'t>(text: &'t str, rules: &Rules) -> &'t str {
    if let Some(stripped) = text.strip_suffix("\r\n") {
        return stripped;
    }
    match text.chars().next_back() {
        Some(c) if rules.is_line_terminator(c) => &text[..text.len() - c.len_utf8()],
        _ => text,
    }
}

impl<S> Scan<'_, S>
where
    S: Iterator<Item = io::Result<char>>,
{
    fn run(&mut self) -> Result<()> {
        let mut was_whitespace = true;
        while !self.cursor.on_eof() {
            if self.cursor.on_whitespace() {
                was_whitespace = true;
                self.scan_whitespace()?;
                continue;
            }
            if !was_whitespace {
                // Only a text block can end without trailing whitespace.
                self.report(ErrorCode::MissingWhitespace)?;
            }
            was_whitespace = false;

            if self.cursor.on_comment() {
                self.scan_comment()?;
            } else if self.cursor.on_inline_quote() {
                self.scan_inline_quote()?;
            } else if self.cursor.on_block_quote() {
                self.scan_block_quote()?;
            } else if self.cursor.on_unquoted_token() {
                self.scan_unquoted_token()?;
            } else {
                self.report(ErrorCode::IllegalValueStart)?;
                // Accept the character, or whatever the policy replaced it with.
                match self.cursor.current_char() {
                    Some(c) if c.is_whitespace() || c.is_control() => {
                        was_whitespace = true;
                        self.scan_whitespace()?;
                    }
                    _ => self.scan_unquoted_token()?,
                }
            }
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        self.cursor.advance(&mut *self.policy)
    }

    fn report(&mut self, code: ErrorCode) -> Result<()> {
        self.cursor.report(code, &mut *self.policy)
    }

    fn scan_whitespace(&mut self) -> Result<()> {
        self.cursor.start_token();
        loop {
            self.advance()?;
            if !self.cursor.on_whitespace() || self.cursor.on_eof() {
                break;
            }
        }
        self.whitespace.whitespace(self.cursor.token(), &self.cursor)
    }

    fn scan_comment(&mut self) -> Result<()> {
        self.cursor.start_token();
        loop {
            self.advance()?;
            if self.cursor.on_eol() {
                break;
            }
        }
        let text = self.cursor.token();
        let text = text.strip_prefix('#').unwrap_or(text);
        tracing::trace!(line = self.cursor.line(), "comment");
        self.whitespace.comment(text, &self.cursor)
    }

    fn scan_inline_quote(&mut self) -> Result<()> {
        let Some(delimiter) = self.cursor.current_char() else {
            return Ok(());
        };
        self.advance()?;
        self.cursor.start_token();

        loop {
            if self.cursor.on_eol() {
                self.report(ErrorCode::UnterminatedInlineQuote)?;
                // The end of the line stands in for the closing delimiter.
                let len = self.cursor.token().len();
                return self.emit_quoted(len, delimiter);
            }
            let saw_delimiter = self.cursor.current_char() == Some(delimiter);
            self.advance()?;
            if saw_delimiter && self.cursor.on_whitespace() {
                let len = self.cursor.token().len() - delimiter.len_utf8();
                return self.emit_quoted(len, delimiter);
            }
        }
    }

    fn scan_block_quote(&mut self) -> Result<()> {
        let Some(delimiter) = self.cursor.current_char() else {
            return Ok(());
        };
        self.advance()?;
        self.cursor.start_token();

        loop {
            self.advance()?;
            if self.cursor.on_eof() {
                self.report(ErrorCode::UnterminatedTextBlock)?;
                // The end of input stands in for the closing delimiter.
                let len = strip_line_terminator(self.cursor.token(), self.cursor.rules()).len();
                return self.emit_quoted(len, delimiter);
            }
            if self.cursor.column() == 1 && self.cursor.current_char() == Some(delimiter) {
                break;
            }
        }

        let len = strip_line_terminator(self.cursor.token(), self.cursor.rules()).len();
        // Step past the closing delimiter without making it part of the value.
        self.advance()?;
        self.emit_quoted(len, delimiter)
    }

    fn emit_quoted(&mut self, len: usize, delimiter: char) -> Result<()> {
        let text = &self.cursor.token()[..len];
        tracing::trace!(line = self.cursor.line(), %delimiter, "quoted value");
        let mut reporter = Reporter::new(&self.cursor, &mut *self.policy);
        self.tokens.quoted_value(text, delimiter, &mut reporter)
    }

    fn scan_unquoted_token(&mut self) -> Result<()> {
        self.cursor.start_token();
        loop {
            self.advance()?;
            if self.cursor.on_whitespace() {
                break;
            }
        }

        let rules = self.cursor.rules();
        let token = self.cursor.token();
        let kind = classify(token, rules);
        let problem = match kind {
            Unquoted::DataName => exceeds(token.chars().count(), rules.max_data_name_length)
                .then_some(ErrorCode::DataNameLength),
            Unquoted::BlockHeader => {
                exceeds(token.chars().count() - HEADER_PREFIX, rules.max_block_name_length)
                    .then_some(ErrorCode::BlockNameLength)
            }
            Unquoted::FrameHeader => {
                exceeds(token.chars().count() - HEADER_PREFIX, rules.max_frame_name_length)
                    .then_some(ErrorCode::FrameNameLength)
            }
            Unquoted::Reserved => Some(ErrorCode::ReservedWord),
            _ => None,
        };
        if let Some(code) = problem {
            // Over-long names are accepted anyway; reserved words are dropped.
            self.report(code)?;
        }

        let token = self.cursor.token();
        tracing::trace!(line = self.cursor.line(), token, "token");
        let mut reporter = Reporter::new(&self.cursor, &mut *self.policy);
        match kind {
            Unquoted::DataName => self.tokens.data_name(token, &mut reporter),
            Unquoted::BlockHeader => {
                self.tokens.block_header(&token[HEADER_PREFIX..], &mut reporter)
            }
            Unquoted::FrameHeader => {
                self.tokens.save_frame_header(&token[HEADER_PREFIX..], &mut reporter)
            }
            Unquoted::FrameEnd => self.tokens.save_frame_end(&mut reporter),
            Unquoted::LoopStart => self.tokens.loop_start(&mut reporter),
            Unquoted::Reserved => Ok(()),
            Unquoted::Value => self.tokens.unquoted_value(token, &mut reporter),
        }
    }
}
