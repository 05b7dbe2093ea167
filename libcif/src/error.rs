//! Error types, diagnostics, and the error policy contract.
//!
//! Every detectable violation is described by an [`ErrorCode`] and reported,
//! together with a snapshot of the scan cursor, to an [`ErrorPolicy`]. The
//! policy decides whether to [`Flow::Abort`] the parse or let the recovery
//! defined for that code apply.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::cursor::ScanState;

/// Result type for CIF parsing operations.
pub type Result<T> = std::result::Result<T, ParseError>;

/// The fixed catalogue of recoverable CIF violations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A character without the `LEGAL` attribute.
    #[error("illegal character")]
    IllegalChar,

    /// Two tokens not separated by whitespace.
    #[error("required whitespace missing")]
    MissingWhitespace,

    /// A character that may not begin an unquoted value.
    #[error("illegal first character for an unquoted data value")]
    IllegalValueStart,

    /// An inline quoted value still open at the end of its line.
    #[error("unterminated quoted data value")]
    UnterminatedInlineQuote,

    /// A text block still open at the end of input.
    #[error("unterminated text block")]
    UnterminatedTextBlock,

    /// A physical line longer than the configured limit.
    #[error("line too long")]
    LineLength,

    /// A data name longer than the configured limit.
    #[error("data name too long")]
    DataNameLength,

    /// A save frame code longer than the configured limit.
    #[error("save frame name too long")]
    FrameNameLength,

    /// A data block code longer than the configured limit.
    #[error("data block name too long")]
    BlockNameLength,

    /// A value where a data name was expected.
    #[error("data name missing")]
    DataNameMissing,

    /// A data name (or other token) where a value was expected.
    #[error("data value missing")]
    DataValueMissing,

    /// `loop_` followed by no data names.
    #[error("empty loop header")]
    LoopEmptyHeader,

    /// A loop header followed by no values.
    #[error("loop with no data values")]
    LoopNoData,

    /// A loop whose value count is not a multiple of its width.
    #[error("incomplete loop data record")]
    LoopPartialRecord,

    /// A reserved word (`global_`, `stop_`, bare `data_`, misplaced `save_`).
    #[error("illegal use of a reserved word")]
    ReservedWord,

    /// A data name that already occurs in the same cell or loop header.
    #[error("duplicate data name")]
    DuplicateDataName,

    /// A save frame code that already occurs in the same data block.
    #[error("duplicate frame code within a data block")]
    DuplicateFrameCode,

    /// A data block code that already occurs in the document.
    #[error("duplicate data block code")]
    DuplicateBlockCode,

    /// A save frame still open when its block (or the input) ends.
    #[error("unterminated save frame")]
    UnterminatedFrame,

    /// A data name before the first data block header.
    #[error("data name outside any data block")]
    DataNameNoBlock,

    /// A value before the first data block header.
    #[error("data value outside any data block")]
    ValueNoBlock,

    /// `loop_` before the first data block header.
    #[error("loop header outside any data block")]
    LoopHeaderNoBlock,

    /// A save frame header before the first data block header.
    #[error("save frame outside any data block")]
    FrameNoBlock,

    /// A text block was unfolded according to the line-folding convention.
    #[error("text block lines unfolded per the CIF 1.1 line folding convention")]
    TextUnfolded,
}

impl ErrorCode {
    /// Whether the code is a grammar-level (structural) rather than a lexical
    /// (syntax) violation.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            ErrorCode::DataNameMissing
                | ErrorCode::DataValueMissing
                | ErrorCode::LoopEmptyHeader
                | ErrorCode::LoopNoData
                | ErrorCode::LoopPartialRecord
                | ErrorCode::DuplicateDataName
                | ErrorCode::DuplicateFrameCode
                | ErrorCode::DuplicateBlockCode
                | ErrorCode::UnterminatedFrame
                | ErrorCode::DataNameNoBlock
                | ErrorCode::ValueNoBlock
                | ErrorCode::LoopHeaderNoBlock
                | ErrorCode::FrameNoBlock
        )
    }
}

/// How serious a reported diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// A violation of the active rules.
    Error,
    /// A revision-compatibility difference, or an informational notice.
    Warning,
}

/// An owned copy of the scan cursor state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub line: usize,
    pub column: usize,
    pub current: Option<char>,
    pub previous: Option<char>,
    pub token: String,
}

impl Snapshot {
    /// Capture the state of any cursor view.
    pub fn of(state: &dyn ScanState) -> Self {
        Self {
            line: state.line(),
            column: state.column(),
            current: state.current_char(),
            previous: state.previous_char(),
            token: state.token().to_string(),
        }
    }
}

impl ScanState for Snapshot {
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

/// A reported violation: what, how serious, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub severity: Severity,
    /// Set when the diagnostic was downgraded, e.g. "CIF 1.0 compliance warning".
    pub note: Option<String>,
    pub at: Snapshot,
}

impl Diagnostic {
    /// A diagnostic of `Error` severity at the given cursor state.
    pub fn error(code: ErrorCode, at: Snapshot) -> Self {
        Self {
            code,
            severity: Severity::Error,
            note: None,
            at,
        }
    }

    /// A diagnostic of `Warning` severity at the given cursor state.
    pub fn warning(code: ErrorCode, at: Snapshot) -> Self {
        Self {
            code,
            severity: Severity::Warning,
            note: None,
            at,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(note) = &self.note {
            write!(f, "{}: ", note)?;
        }
        let category = if self.code.is_structural() {
            "structural"
        } else {
            "syntax"
        };
        write!(
            f,
            "CIF {} {} at line {}, character {}, near '{}': {}",
            category,
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            },
            self.at.line,
            self.at.column,
            self.at.token.escape_debug(),
            self.code
        )
    }
}

/// What the parse should do after a policy has seen a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Apply the defined recovery and keep going.
    Continue,
    /// Stop; the partial document is discarded.
    Abort,
}

/// The context object handed to an [`ErrorPolicy`].
///
/// Besides the diagnostic itself it exposes the one mutation point the
/// scanner allows: replacing the character under the cursor. Replacement is
/// only honored for reports raised by the scanner; for grammar-level reports
/// it is a no-op.
pub struct Report<'a> {
    diagnostic: Diagnostic,
    current: &'a mut Option<char>,
}

impl<'a> Report<'a> {
    pub(crate) fn new(diagnostic: Diagnostic, current: &'a mut Option<char>) -> Self {
        Self {
            diagnostic,
            current,
        }
    }

    pub fn diagnostic(&self) -> &Diagnostic {
        &self.diagnostic
    }

    pub fn code(&self) -> ErrorCode {
        self.diagnostic.code
    }

    /// The character under the cursor (possibly already replaced).
    pub fn current_char(&self) -> Option<char> {
        *self.current
    }

    /// Substitute the character under the cursor.
    pub fn replace_current_char(&mut self, c: char) {
        *self.current = Some(c);
        self.diagnostic.at.current = Some(c);
    }

    /// Turn an error into a warning with an explanatory note.
    pub fn downgrade(&mut self, note: &str) {
        self.diagnostic.severity = Severity::Warning;
        self.diagnostic.note = Some(note.to_string());
    }

    pub(crate) fn into_diagnostic(self) -> Diagnostic {
        self.diagnostic
    }
}

/// Decides, per violation, whether parsing continues.
pub trait ErrorPolicy {
    fn handle(&mut self, report: &mut Report<'_>) -> Flow;
}

impl<F> ErrorPolicy for F
where
    F: FnMut(&mut Report<'_>) -> Flow,
{
    fn handle(&mut self, report: &mut Report<'_>) -> Flow {
        self(report)
    }
}

/// Continue after every violation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ignore;

impl ErrorPolicy for Ignore {
    fn handle(&mut self, _report: &mut Report<'_>) -> Flow {
        Flow::Continue
    }
}

/// Abort on the first error; warnings are tolerated.
#[derive(Debug, Clone, Copy, Default)]
pub struct Strict;

impl ErrorPolicy for Strict {
    fn handle(&mut self, report: &mut Report<'_>) -> Flow {
        if report.diagnostic().is_error() {
            Flow::Abort
        } else {
            Flow::Continue
        }
    }
}

/// Record every diagnostic and continue.
#[derive(Debug, Clone, Default)]
pub struct Collect {
    pub diagnostics: Vec<Diagnostic>,
}

impl Collect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    /// The codes of all recorded diagnostics, in report order.
    pub fn codes(&self) -> Vec<ErrorCode> {
        self.diagnostics.iter().map(|d| d.code).collect()
    }
}

impl ErrorPolicy for Collect {
    fn handle(&mut self, report: &mut Report<'_>) -> Flow {
        self.diagnostics.push(report.diagnostic().clone());
        Flow::Continue
    }
}

/// Submit a diagnostic to a policy, logging it on the way.
///
/// `current` is the slot a policy may overwrite through
/// [`Report::replace_current_char`].
pub(crate) fn submit(
    policy: &mut dyn ErrorPolicy,
    diagnostic: Diagnostic,
    current: &mut Option<char>,
) -> Result<()> {
    let mut report = Report::new(diagnostic, current);
    let flow = policy.handle(&mut report);
    let diagnostic = report.into_diagnostic();
    match diagnostic.severity {
        Severity::Error => tracing::debug!(
            code = ?diagnostic.code,
            line = diagnostic.at.line,
            column = diagnostic.at.column,
            "CIF error reported"
        ),
        Severity::Warning => tracing::trace!(
            code = ?diagnostic.code,
            line = diagnostic.at.line,
            column = diagnostic.at.column,
            "CIF warning reported"
        ),
    }
    match flow {
        Flow::Continue => Ok(()),
        Flow::Abort => Err(ParseError::Aborted(diagnostic)),
    }
}

/// Error type for CIF parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The error policy chose to stop.
    #[error("parse aborted: {0}")]
    Aborted(Diagnostic),

    /// A data name that cannot be represented, even after recovery.
    #[error("invalid data name '{0}' at line {}, character {}", .1.line, .1.column)]
    InvalidDataName(String, Snapshot),

    /// A data block or save frame code that cannot be represented.
    #[error("invalid block or frame code '{0}' at line {}, character {}", .1.line, .1.column)]
    InvalidCellCode(String, Snapshot),

    /// The character source failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Error type for serializing CIF values and documents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A single-line string containing both `' ` and `" `.
    #[error("string cannot be quoted: it contains both ' and \" followed by whitespace: {0:?}")]
    Unquotable(String),

    /// A multi-line string with a line that begins with `;`.
    #[error("string cannot be written as a text block: a line begins with ';': {0:?}")]
    TextBlockDelimiter(String),

    /// The format is produced outside the library.
    #[error("format {0} must be handled by the caller")]
    UnsupportedFormat(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(line: usize, column: usize, token: &str) -> Snapshot {
        Snapshot {
            line,
            column,
            current: Some(' '),
            previous: None,
            token: token.to_string(),
        }
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::error(ErrorCode::LineLength, at(3, 81, "foo"));
        assert_eq!(
            d.to_string(),
            "CIF syntax error at line 3, character 81, near 'foo': line too long"
        );
        let d = Diagnostic::error(ErrorCode::DuplicateDataName, at(1, 5, "_a"));
        assert_eq!(
            d.to_string(),
            "CIF structural error at line 1, character 5, near '_a': duplicate data name"
        );
    }

    #[test]
    fn test_downgrade_prefixes_note() {
        let mut current = Some('[');
        let mut report = Report::new(
            Diagnostic::error(ErrorCode::IllegalValueStart, at(2, 1, "")),
            &mut current,
        );
        report.downgrade("CIF 1.0 compliance warning");
        let d = report.into_diagnostic();
        assert!(!d.is_error());
        assert!(d
            .to_string()
            .starts_with("CIF 1.0 compliance warning: CIF syntax warning at line 2"));
    }

    #[test]
    fn test_replace_current_char() {
        let mut current = Some('\u{b}');
        {
            let mut report = Report::new(
                Diagnostic::error(ErrorCode::IllegalChar, at(1, 1, "")),
                &mut current,
            );
            report.replace_current_char(' ');
            assert_eq!(report.current_char(), Some(' '));
        }
        assert_eq!(current, Some(' '));
    }

    #[test]
    fn test_policies() {
        let mut current = None;
        let diag = Diagnostic::error(ErrorCode::LoopNoData, at(1, 1, ""));
        assert!(submit(&mut Ignore, diag.clone(), &mut current).is_ok());
        assert!(matches!(
            submit(&mut Strict, diag.clone(), &mut current),
            Err(ParseError::Aborted(d)) if d.code == ErrorCode::LoopNoData
        ));
        let warning = Diagnostic::warning(ErrorCode::TextUnfolded, at(1, 1, ""));
        assert!(submit(&mut Strict, warning, &mut current).is_ok());

        let mut collect = Collect::new();
        submit(&mut collect, diag, &mut current).unwrap();
        assert_eq!(collect.codes(), vec![ErrorCode::LoopNoData]);
        assert_eq!(collect.errors().count(), 1);
        assert_eq!(collect.warnings().count(), 0);
    }

    #[test]
    fn test_closure_policy() {
        let mut seen = 0;
        let mut policy = |_: &mut Report<'_>| {
            seen += 1;
            Flow::Abort
        };
        let mut current = None;
        let diag = Diagnostic::error(ErrorCode::ReservedWord, at(1, 1, "stop_"));
        assert!(submit(&mut policy, diag, &mut current).is_err());
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_structural_category() {
        assert!(!ErrorCode::IllegalChar.is_structural());
        assert!(!ErrorCode::ReservedWord.is_structural());
        assert!(ErrorCode::LoopPartialRecord.is_structural());
        assert!(ErrorCode::FrameNoBlock.is_structural());
    }
}
