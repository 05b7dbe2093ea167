//! Grammar builder
//!
//! The builder consumes the scanner's tokens and assembles a [`Document`].
//! It is a small state machine: where the token sequence violates the CIF
//! grammar, the violation is reported and a fixed recovery applied, so that
//! any input produces some document unless the error policy aborts.
//!
//! Loops are assembled outside the document and attached to their cell when
//! they are closed; blocks and frames are attached when the next one starts
//! or input ends.

use std::mem;

use crate::document::{
    is_valid_cell_code, is_valid_data_name, Cell, DataBlock, DataCell, Document, Loop, SaveFrame,
};
use crate::error::{ErrorCode, ParseError, Result, Snapshot};
use crate::scanner::{Reporter, TokenSink};
use crate::value::CifValue;

// ============================================================================
// Parse State
// ============================================================================

/// Where the builder is in the grammar.
#[derive(Debug)]
enum State {
    /// No data block header seen yet.
    BeforeBlock,
    /// Expecting a data name, `loop_`, or a header.
    ExpectName,
    /// A data name was read; its value comes next.
    ExpectValue(String),
    /// Reading the data names of a loop header.
    LoopHeader(Loop),
    /// Reading loop values; the vector is the record being filled.
    LoopValue(Loop, Vec<CifValue>),
}

/// A block or frame under construction. Duplicates are built but not kept.
#[derive(Debug)]
struct Open<T> {
    cell: T,
    keep: bool,
}

/// Builds a [`Document`] from grammar tokens.
#[derive(Debug)]
pub struct Builder {
    document: Document,
    block: Option<Open<DataBlock>>,
    frame: Option<Open<SaveFrame>>,
    state: State,
    unfold_lines: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            document: Document::new(),
            block: None,
            frame: None,
            state: State::BeforeBlock,
            unfold_lines: false,
        }
    }

    /// Whether text blocks that start with a fold marker are unfolded.
    pub fn is_unfolding_lines(&self) -> bool {
        self.unfold_lines
    }

    pub fn set_unfolding_lines(&mut self, unfold: bool) {
        self.unfold_lines = unfold;
    }

    /// Apply the end-of-input checks and return the document.
    pub fn finish(mut self, reporter: &mut Reporter<'_>) -> Result<Document> {
        let state = mem::replace(&mut self.state, State::ExpectName);
        self.resolve_pending(state, reporter)?;
        self.end_frame_implicitly(reporter)?;
        self.close_block();
        tracing::debug!(blocks = self.document.blocks().len(), "document built");
        Ok(self.document)
    }

    // ========================================================================
    // Cells
    // ========================================================================

    /// The cell that items and loops currently go into.
    fn current_cell(&mut self) -> Option<&mut Cell> {
        match (&mut self.frame, &mut self.block) {
            (Some(frame), _) => Some(frame.cell.cell_mut()),
            (None, Some(block)) => Some(block.cell.cell_mut()),
            (None, None) => None,
        }
    }

    fn name_taken(&self, name: &str, header: Option<&Loop>) -> bool {
        let in_cell = match (&self.frame, &self.block) {
            (Some(frame), _) => frame.cell.contains_name(name),
            (None, Some(block)) => block.cell.contains_name(name),
            (None, None) => false,
        };
        in_cell || header.is_some_and(|lp| lp.contains_name(name))
    }

    fn close_frame(&mut self) {
        let Some(frame) = self.frame.take() else {
            return;
        };
        match &mut self.block {
            Some(block) if frame.keep => {
                if let Err(frame) = block.cell.push_frame(frame.cell) {
                    tracing::debug!(frame = frame.name(), "save frame code taken");
                }
            }
            _ => tracing::trace!(frame = frame.cell.name(), "save frame discarded"),
        }
    }

    fn close_block(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        if !block.keep {
            tracing::trace!(block = block.cell.name(), "data block discarded");
            return;
        }
        if let Err(block) = self.document.push_block(block.cell) {
            tracing::debug!(block = block.name(), "data block code taken");
        }
    }

    /// An open frame is closed by the start of a block or the end of input.
    fn end_frame_implicitly(&mut self, reporter: &mut Reporter<'_>) -> Result<()> {
        if self.frame.is_some() {
            reporter.error(ErrorCode::UnterminatedFrame)?;
            self.close_frame();
        }
        Ok(())
    }

    // ========================================================================
    // Loops and Pending State
    // ========================================================================

    /// Report and recover whatever `state` leaves unfinished.
    ///
    /// The caller has already moved the builder on to `ExpectName`; a
    /// `BeforeBlock` state is put back.
    fn resolve_pending(&mut self, state: State, reporter: &mut Reporter<'_>) -> Result<()> {
        match state {
            State::BeforeBlock => {
                self.state = State::BeforeBlock;
                Ok(())
            }
            State::ExpectName => Ok(()),
            State::ExpectValue(name) => {
                tracing::trace!(%name, "data name without value dropped");
                reporter.error(ErrorCode::DataValueMissing)
            }
            State::LoopHeader(lp) => reporter.error(if lp.width() == 0 {
                ErrorCode::LoopEmptyHeader
            } else {
                ErrorCode::LoopNoData
            }),
            State::LoopValue(lp, record) => self.close_loop(lp, record, reporter),
        }
    }

    /// Finish a loop, completing a partial record with unknown values.
    fn close_loop(
        &mut self,
        mut lp: Loop,
        mut record: Vec<CifValue>,
        reporter: &mut Reporter<'_>,
    ) -> Result<()> {
        if !record.is_empty() {
            reporter.error(ErrorCode::LoopPartialRecord)?;
            record.resize(lp.width(), CifValue::Unknown);
            lp.push_record(record);
        }
        if lp.is_empty() {
            return Ok(());
        }
        tracing::trace!(columns = lp.width(), records = lp.len(), "loop closed");
        if let Some(cell) = self.current_cell() {
            cell.push_loop(lp);
        }
        Ok(())
    }

    fn push_loop_value(&mut self, mut lp: Loop, mut record: Vec<CifValue>, value: CifValue) {
        record.push(value);
        if record.len() == lp.width() {
            lp.push_record(mem::take(&mut record));
        }
        self.state = State::LoopValue(lp, record);
    }

    fn value(&mut self, value: CifValue, reporter: &mut Reporter<'_>) -> Result<()> {
        match mem::replace(&mut self.state, State::ExpectName) {
            State::BeforeBlock => {
                self.state = State::BeforeBlock;
                reporter.error(ErrorCode::ValueNoBlock)
            }
            State::ExpectName => reporter.error(ErrorCode::DataNameMissing),
            State::LoopHeader(lp) if lp.width() == 0 => {
                reporter.error(ErrorCode::LoopEmptyHeader)?;
                reporter.error(ErrorCode::DataNameMissing)
            }
            State::LoopHeader(lp) => {
                let record = Vec::with_capacity(lp.width());
                self.push_loop_value(lp, record, value);
                Ok(())
            }
            State::LoopValue(lp, record) => {
                self.push_loop_value(lp, record, value);
                Ok(())
            }
            State::ExpectValue(name) => {
                if let Some(cell) = self.current_cell() {
                    cell.push_item(&name, value);
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// Line Unfolding
// ============================================================================

/// Length of the fold marker at the start of `text`: a backslash, optional
/// blanks, and a line terminator.
fn fold_len(text: &str) -> Option<usize> {
    let rest = text.strip_prefix('\\')?;
    let body = rest.trim_start_matches([' ', '\t', '\u{b}']);
    let terminator = if body.starts_with("\r\n") {
        2
    } else if body.starts_with(['\r', '\n', '\u{c}']) {
        1
    } else {
        return None;
    };
    Some(text.len() - body.len() + terminator)
}

/// Remove every fold marker, provided the text starts with one.
fn unfold(text: &str) -> Option<String> {
    fold_len(text)?;
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        match fold_len(&rest[pos..]) {
            Some(len) => rest = &rest[pos + len..],
            None => {
                out.push('\\');
                rest = &rest[pos + 1..];
            }
        }
    }
    out.push_str(rest);
    Some(out)
}

// ============================================================================
// Token Handling
// ============================================================================

impl TokenSink for Builder {
    fn block_header(&mut self, name: &str, reporter: &mut Reporter<'_>) -> Result<()> {
        tracing::trace!(block = name, "block header");
        let state = mem::replace(&mut self.state, State::ExpectName);
        self.resolve_pending(state, reporter)?;
        self.state = State::ExpectName;
        self.end_frame_implicitly(reporter)?;
        self.close_block();

        if !is_valid_cell_code(name) {
            return Err(ParseError::InvalidCellCode(
                name.to_string(),
                Snapshot::of(reporter.state()),
            ));
        }
        let keep = !self.document.contains_block(name);
        self.block = Some(Open {
            cell: DataBlock::new(name),
            keep,
        });
        if !keep {
            reporter.error(ErrorCode::DuplicateBlockCode)?;
        }
        Ok(())
    }

    fn save_frame_header(&mut self, name: &str, reporter: &mut Reporter<'_>) -> Result<()> {
        tracing::trace!(frame = name, "save frame header");
        if matches!(self.state, State::BeforeBlock) {
            reporter.error(ErrorCode::ReservedWord)?;
            return reporter.error(ErrorCode::FrameNoBlock);
        }
        let state = mem::replace(&mut self.state, State::ExpectName);
        self.resolve_pending(state, reporter)?;
        self.end_frame_implicitly(reporter)?;
        // Save frames belong to dictionaries, not data files.
        reporter.error(ErrorCode::ReservedWord)?;

        if !is_valid_cell_code(name) {
            return Err(ParseError::InvalidCellCode(
                name.to_string(),
                Snapshot::of(reporter.state()),
            ));
        }
        let keep = self
            .block
            .as_ref()
            .is_some_and(|block| !block.cell.contains_frame(name));
        self.frame = Some(Open {
            cell: SaveFrame::new(name),
            keep,
        });
        if !keep {
            reporter.error(ErrorCode::DuplicateFrameCode)?;
        }
        Ok(())
    }

    fn save_frame_end(&mut self, reporter: &mut Reporter<'_>) -> Result<()> {
        tracing::trace!("save frame end");
        if self.frame.is_none() {
            return reporter.error(ErrorCode::ReservedWord);
        }
        let state = mem::replace(&mut self.state, State::ExpectName);
        self.resolve_pending(state, reporter)?;
        self.close_frame();
        Ok(())
    }

    fn loop_start(&mut self, reporter: &mut Reporter<'_>) -> Result<()> {
        tracing::trace!("loop start");
        match mem::replace(&mut self.state, State::ExpectName) {
            State::BeforeBlock => {
                self.state = State::BeforeBlock;
                return reporter.error(ErrorCode::LoopHeaderNoBlock);
            }
            State::LoopHeader(_) => reporter.error(ErrorCode::LoopEmptyHeader)?,
            state => self.resolve_pending(state, reporter)?,
        }
        self.state = State::LoopHeader(Loop::new());
        Ok(())
    }

    fn data_name(&mut self, name: &str, reporter: &mut Reporter<'_>) -> Result<()> {
        tracing::trace!(name, "data name");
        let header = match mem::replace(&mut self.state, State::ExpectName) {
            State::BeforeBlock => {
                self.state = State::BeforeBlock;
                return reporter.error(ErrorCode::DataNameNoBlock);
            }
            State::LoopHeader(lp) if lp.contains_name(name) => {
                self.state = State::LoopHeader(lp);
                return reporter.error(ErrorCode::DuplicateDataName);
            }
            State::LoopHeader(lp) => Some(lp),
            state => {
                self.resolve_pending(state, reporter)?;
                None
            }
        };

        let mut name = name.to_string();
        if self.name_taken(&name, header.as_ref()) {
            reporter.error(ErrorCode::DuplicateDataName)?;
            while self.name_taken(&name, header.as_ref()) {
                name.push('_');
            }
            tracing::debug!(%name, "duplicate data name renamed");
        }
        if !is_valid_data_name(&name) {
            return Err(ParseError::InvalidDataName(
                name,
                Snapshot::of(reporter.state()),
            ));
        }

        self.state = match header {
            Some(mut lp) => {
                lp.push_name(&name);
                State::LoopHeader(lp)
            }
            None => State::ExpectValue(name),
        };
        Ok(())
    }

    fn quoted_value(
        &mut self,
        text: &str,
        delimiter: char,
        reporter: &mut Reporter<'_>,
    ) -> Result<()> {
        let unfolded = if self.unfold_lines && delimiter == ';' {
            unfold(text)
        } else {
            None
        };
        let value = match unfolded {
            Some(text) => {
                reporter.warning(ErrorCode::TextUnfolded)?;
                CifValue::quoted(&text)
            }
            None => CifValue::quoted(text),
        };
        self.value(value, reporter)
    }

    fn unquoted_value(&mut self, text: &str, reporter: &mut Reporter<'_>) -> Result<()> {
        self.value(CifValue::from_unquoted(text), reporter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Collect, Strict};
    use crate::scanner::{IgnoreWhitespace, Scanner};

    fn build_with(mut builder: Builder, input: &str) -> (Document, Vec<ErrorCode>) {
        let mut collect = Collect::new();
        let end = Scanner::default()
            .scan(
                input.chars().map(Ok),
                &mut builder,
                &mut IgnoreWhitespace,
                &mut collect,
            )
            .unwrap();
        let mut reporter = Reporter::new(&end, &mut collect);
        let doc = builder.finish(&mut reporter).unwrap();
        (doc, collect.codes())
    }

    fn build(input: &str) -> (Document, Vec<ErrorCode>) {
        build_with(Builder::new(), input)
    }

    fn item_names(cell: &dyn DataCell) -> Vec<&str> {
        cell.items().iter().map(|item| item.name.as_str()).collect()
    }

    #[test]
    fn test_scalar_item() {
        let (doc, errors) = build("data_x\n_a 1\n");
        assert!(errors.is_empty());
        assert_eq!(doc.block_names().collect::<Vec<_>>(), vec!["x"]);
        let block = doc.block("x").unwrap();
        let value = block.get("_a").unwrap();
        assert_eq!(value.as_number().map(|n| n.mantissa()), Some("1"));
    }

    #[test]
    fn test_value_kinds() {
        let (doc, errors) = build("data_x _a . _b ? _c '1' _d abc _e\n;\ntext\n;\n");
        assert!(errors.is_empty());
        let block = doc.block("x").unwrap();
        assert_eq!(block.get("_a"), Some(&CifValue::NotApplicable));
        assert_eq!(block.get("_b"), Some(&CifValue::Unknown));
        assert_eq!(block.get("_c"), Some(&CifValue::quoted("1")));
        assert_eq!(block.get("_d"), Some(&CifValue::text("abc")));
        assert_eq!(block.get("_e"), Some(&CifValue::quoted("\ntext")));
    }

    #[test]
    fn test_loop() {
        let (doc, errors) = build("data_x loop_ _a _b 1 2 3 4 _c 5");
        assert!(errors.is_empty());
        let block = doc.block("x").unwrap();
        assert_eq!(block.loops().len(), 1);
        let lp = &block.loops()[0];
        assert_eq!(lp.width(), 2);
        assert_eq!(lp.len(), 2);
        let first: Vec<String> = lp.record(0).unwrap().iter().map(|v| v.to_string()).collect();
        assert_eq!(first, vec!["1", "2"]);
        let column: Vec<String> = block
            .column("_b")
            .unwrap()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(column, vec!["2", "4"]);
        assert_eq!(item_names(block), vec!["_c"]);
    }

    #[test]
    fn test_partial_record_at_end_of_input() {
        let (doc, errors) = build("data_x loop_ _a _b 1 2 3");
        assert_eq!(errors, vec![ErrorCode::LoopPartialRecord]);
        let lp = &doc.block("x").unwrap().loops()[0];
        assert_eq!(lp.len(), 2);
        assert_eq!(lp.record(1).unwrap()[1], CifValue::Unknown);
    }

    #[test]
    fn test_partial_record_before_name() {
        let (doc, errors) = build("data_x loop_ _a _b _c 1 2 _d 4");
        assert_eq!(errors, vec![ErrorCode::LoopPartialRecord]);
        let block = doc.block("x").unwrap();
        let record = block.loops()[0].record(0).unwrap();
        assert_eq!(record[2], CifValue::Unknown);
        assert!(block.get("_d").is_some());
    }

    #[test]
    fn test_duplicate_data_name_renamed() {
        let (doc, errors) = build("data_x _a 1 _a 2 _A 3");
        assert_eq!(
            errors,
            vec![ErrorCode::DuplicateDataName, ErrorCode::DuplicateDataName]
        );
        let block = doc.block("x").unwrap();
        assert_eq!(item_names(block), vec!["_a", "_a_", "_A__"]);
        assert_eq!(block.get("_a_").map(|v| v.to_string()), Some("2".to_string()));
    }

    #[test]
    fn test_duplicate_name_in_loop_header_ignored() {
        let (doc, errors) = build("data_x loop_ _a _a 1 2");
        assert_eq!(errors, vec![ErrorCode::DuplicateDataName]);
        let lp = &doc.block("x").unwrap().loops()[0];
        assert_eq!(lp.width(), 1);
        assert_eq!(lp.len(), 2);
    }

    #[test]
    fn test_loop_name_clashing_with_item() {
        let (doc, errors) = build("data_x _a 1 loop_ _a _b 2 3");
        assert_eq!(errors, vec![ErrorCode::DuplicateDataName]);
        let lp = &doc.block("x").unwrap().loops()[0];
        assert_eq!(lp.names(), &["_a_".to_string(), "_b".to_string()]);
    }

    #[test]
    fn test_item_name_clashing_with_loop() {
        let (doc, errors) = build("data_x loop_ _a 1 2 _a 3");
        assert_eq!(errors, vec![ErrorCode::DuplicateDataName]);
        assert_eq!(item_names(doc.block("x").unwrap()), vec!["_a_"]);
    }

    #[test]
    fn test_frame_without_block() {
        let (doc, errors) = build("save_foo _a 1 save_");
        assert_eq!(
            errors,
            vec![
                ErrorCode::ReservedWord,
                ErrorCode::FrameNoBlock,
                ErrorCode::DataNameNoBlock,
                ErrorCode::ValueNoBlock,
                ErrorCode::ReservedWord
            ]
        );
        assert!(doc.is_empty());
    }

    #[test]
    fn test_save_frame() {
        let (doc, errors) = build("data_x save_f _a 1 loop_ _l 1 2 save_ _b 2");
        assert_eq!(errors, vec![ErrorCode::ReservedWord]);
        let block = doc.block("x").unwrap();
        let frame = block.frame("f").unwrap();
        assert_eq!(item_names(frame), vec!["_a"]);
        assert_eq!(frame.loops()[0].len(), 2);
        assert_eq!(item_names(block), vec!["_b"]);
        assert!(block.loops().is_empty());
    }

    #[test]
    fn test_unterminated_frame() {
        let (doc, errors) = build("data_x save_f _a 1 data_y _b 2");
        assert_eq!(
            errors,
            vec![ErrorCode::ReservedWord, ErrorCode::UnterminatedFrame]
        );
        assert!(doc.block("x").unwrap().frame("f").is_some());
        assert!(doc.block("y").unwrap().get("_b").is_some());

        let (doc, errors) = build("data_x save_f _a 1");
        assert_eq!(
            errors,
            vec![ErrorCode::ReservedWord, ErrorCode::UnterminatedFrame]
        );
        assert!(doc.block("x").unwrap().frame("f").is_some());
    }

    #[test]
    fn test_frame_end_outside_frame() {
        let (doc, errors) = build("data_x _a 1 save_ _b 2");
        assert_eq!(errors, vec![ErrorCode::ReservedWord]);
        assert_eq!(item_names(doc.block("x").unwrap()), vec!["_a", "_b"]);
    }

    #[test]
    fn test_duplicate_block_discarded() {
        let (doc, errors) = build("data_x _a 1 data_X _b 2 data_y _c 3");
        assert_eq!(errors, vec![ErrorCode::DuplicateBlockCode]);
        assert_eq!(doc.block_names().collect::<Vec<_>>(), vec!["x", "y"]);
        assert!(doc.block("x").unwrap().get("_b").is_none());
    }

    #[test]
    fn test_duplicate_frame_discarded() {
        let (doc, errors) = build("data_x save_f _a 1 save_ save_F _b 2 save_");
        assert_eq!(
            errors,
            vec![
                ErrorCode::ReservedWord,
                ErrorCode::ReservedWord,
                ErrorCode::DuplicateFrameCode
            ]
        );
        let block = doc.block("x").unwrap();
        assert_eq!(block.frames().len(), 1);
        assert_eq!(item_names(block.frame("f").unwrap()), vec!["_a"]);
    }

    #[test]
    fn test_missing_value() {
        let (doc, errors) = build("data_x _a _b 1");
        assert_eq!(errors, vec![ErrorCode::DataValueMissing]);
        assert_eq!(item_names(doc.block("x").unwrap()), vec!["_b"]);

        let (_, errors) = build("data_x _a");
        assert_eq!(errors, vec![ErrorCode::DataValueMissing]);
    }

    #[test]
    fn test_missing_name() {
        let (doc, errors) = build("data_x 1 _a 2");
        assert_eq!(errors, vec![ErrorCode::DataNameMissing]);
        assert_eq!(item_names(doc.block("x").unwrap()), vec!["_a"]);
    }

    #[test]
    fn test_tokens_before_block() {
        let (doc, errors) = build("1 _a loop_ data_x _b 2");
        assert_eq!(
            errors,
            vec![
                ErrorCode::ValueNoBlock,
                ErrorCode::DataNameNoBlock,
                ErrorCode::LoopHeaderNoBlock
            ]
        );
        assert_eq!(item_names(doc.block("x").unwrap()), vec!["_b"]);
    }

    #[test]
    fn test_empty_loops() {
        let (_, errors) = build("data_x loop_ 1");
        assert_eq!(
            errors,
            vec![ErrorCode::LoopEmptyHeader, ErrorCode::DataNameMissing]
        );

        let (doc, errors) = build("data_x loop_ _a data_y");
        assert_eq!(errors, vec![ErrorCode::LoopNoData]);
        assert!(doc.block("x").unwrap().loops().is_empty());

        let (doc, errors) = build("data_x loop_ loop_ _a 1");
        assert_eq!(errors, vec![ErrorCode::LoopEmptyHeader]);
        assert_eq!(doc.block("x").unwrap().loops().len(), 1);

        let (_, errors) = build("data_x loop_ _a");
        assert_eq!(errors, vec![ErrorCode::LoopNoData]);
    }

    #[test]
    fn test_invalid_data_name_is_fatal() {
        let mut builder = Builder::new();
        let result = Scanner::default().scan(
            "data_x _ 1".chars().map(Ok),
            &mut builder,
            &mut IgnoreWhitespace,
            &mut Collect::new(),
        );
        assert!(matches!(result, Err(ParseError::InvalidDataName(name, _)) if name == "_"));
    }

    #[test]
    fn test_strict_aborts() {
        let mut builder = Builder::new();
        let result = Scanner::default().scan(
            "data_x _a _b 1".chars().map(Ok),
            &mut builder,
            &mut IgnoreWhitespace,
            &mut Strict,
        );
        assert!(matches!(
            result,
            Err(ParseError::Aborted(d)) if d.code == ErrorCode::DataValueMissing
        ));
    }

    #[test]
    fn test_unfolding() {
        let input = "data_x _a\n;\\\nabc\\  \ndef\\x\n;\n";
        let (doc, errors) = build(input);
        assert!(errors.is_empty());
        assert_eq!(
            doc.block("x").unwrap().get("_a"),
            Some(&CifValue::quoted("\\\nabc\\  \ndef\\x"))
        );

        let mut builder = Builder::new();
        builder.set_unfolding_lines(true);
        let (doc, errors) = build_with(builder, input);
        assert_eq!(errors, vec![ErrorCode::TextUnfolded]);
        assert_eq!(
            doc.block("x").unwrap().get("_a"),
            Some(&CifValue::quoted("abcdef\\x"))
        );
    }

    #[test]
    fn test_unfold() {
        assert_eq!(unfold("abc"), None);
        assert_eq!(unfold("a\\\nb"), None);
        assert_eq!(unfold("\\\r\na\\\rb\\\u{c}c").as_deref(), Some("abc"));
        assert_eq!(unfold("\\ \t\nx\\").as_deref(), Some("x\\"));
    }
}
