//! CIF document model.
//!
//! A [`Document`] holds data blocks; each [`DataBlock`] holds scalar items,
//! loops and save frames; a [`SaveFrame`] holds items and loops only. Names
//! are unique within their container, compared ASCII case-insensitively.

use std::collections::HashSet;

use crate::value::CifValue;

/// A parsed CIF document: an ordered collection of uniquely named data
/// blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    blocks: Vec<DataBlock>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[DataBlock] {
        &self.blocks
    }

    /// Find a data block by code (case-insensitive).
    pub fn block(&self, name: &str) -> Option<&DataBlock> {
        self.blocks.iter().find(|b| b.name().eq_ignore_ascii_case(name))
    }

    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|b| b.name())
    }

    pub fn contains_block(&self, name: &str) -> bool {
        self.block(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Append a block; returns it back if its code is already taken.
    pub fn push_block(&mut self, block: DataBlock) -> Result<(), DataBlock> {
        if self.contains_block(block.name()) {
            return Err(block);
        }
        self.blocks.push(block);
        Ok(())
    }
}

/// A single-valued data item.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarItem {
    pub name: String,
    pub value: CifValue,
}

/// A looped table: ordered data names and row-major values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Loop {
    names: Vec<String>,
    values: Vec<CifValue>,
}

impl Loop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.names.len()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        if self.names.is_empty() {
            0
        } else {
            self.values.len() / self.names.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the column index for a data name (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Add a column. Only valid while the loop has no records.
    pub(crate) fn push_name(&mut self, name: &str) {
        debug_assert!(self.values.is_empty());
        self.names.push(name.to_string());
    }

    /// Append a complete record.
    pub(crate) fn push_record(&mut self, record: Vec<CifValue>) {
        debug_assert_eq!(record.len(), self.width());
        self.values.extend(record);
    }

    pub fn record(&self, index: usize) -> Option<&[CifValue]> {
        let width = self.width();
        let start = index.checked_mul(width)?;
        self.values.get(start..start + width).filter(|_| width > 0)
    }

    /// Iterate over complete records in order.
    pub fn records(&self) -> std::slice::ChunksExact<'_, CifValue> {
        // A zero-width loop never holds values.
        self.values.chunks_exact(self.width().max(1))
    }

    /// Iterate over one column's values.
    pub fn column(&self, name: &str) -> Option<ColumnIter<'_>> {
        let index = self.column_index(name)?;
        Some(ColumnIter {
            lp: self,
            index,
            row: 0,
        })
    }
}

/// Iterator over a single column's values.
pub struct ColumnIter<'a> {
    lp: &'a Loop,
    index: usize,
    row: usize,
}

impl<'a> Iterator for ColumnIter<'a> {
    type Item = &'a CifValue;

    fn next(&mut self) -> Option<Self::Item> {
        if self.row >= self.lp.len() {
            return None;
        }
        let value = &self.lp.values[self.row * self.lp.width() + self.index];
        self.row += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.lp.len() - self.row;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ColumnIter<'_> {}

/// The content shared by data blocks and save frames.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    name: String,
    items: Vec<ScalarItem>,
    loops: Vec<Loop>,
    // Lowercased names of every item and loop column.
    names: HashSet<String>,
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.items == other.items && self.loops == other.loops
    }
}

impl Cell {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn contains_name(&self, name: &str) -> bool {
        self.names.contains(&name.to_ascii_lowercase())
    }

    /// Add a scalar item. The name must not be taken.
    pub(crate) fn push_item(&mut self, name: &str, value: CifValue) {
        self.names.insert(name.to_ascii_lowercase());
        self.items.push(ScalarItem {
            name: name.to_string(),
            value,
        });
    }

    /// Attach a loop. None of its names may be taken.
    pub(crate) fn push_loop(&mut self, lp: Loop) {
        for name in lp.names() {
            self.names.insert(name.to_ascii_lowercase());
        }
        self.loops.push(lp);
    }
}

/// Operations common to data blocks and save frames.
pub trait DataCell {
    fn cell(&self) -> &Cell;

    /// The block or frame code, without its `data_`/`save_` prefix.
    fn name(&self) -> &str {
        &self.cell().name
    }

    /// Scalar items in document order.
    fn items(&self) -> &[ScalarItem] {
        &self.cell().items
    }

    fn loops(&self) -> &[Loop] {
        &self.cell().loops
    }

    /// Whether a scalar item or loop column has this name (case-insensitive).
    fn contains_name(&self, name: &str) -> bool {
        self.cell().contains_name(name)
    }

    /// Get a scalar item's value by name (case-insensitive).
    fn get(&self, name: &str) -> Option<&CifValue> {
        self.items()
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(name))
            .map(|item| &item.value)
    }

    /// Find the loop containing a given name.
    fn find_loop(&self, name: &str) -> Option<&Loop> {
        self.loops().iter().find(|lp| lp.contains_name(name))
    }

    /// Get a single column from whatever loop contains it.
    fn column(&self, name: &str) -> Option<ColumnIter<'_>> {
        self.find_loop(name)?.column(name)
    }
}

/// A named save frame within a data block.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveFrame {
    cell: Cell,
}

impl SaveFrame {
    pub fn new(name: &str) -> Self {
        Self {
            cell: Cell::new(name),
        }
    }

    pub(crate) fn cell_mut(&mut self) -> &mut Cell {
        &mut self.cell
    }
}

impl DataCell for SaveFrame {
    fn cell(&self) -> &Cell {
        &self.cell
    }
}

/// A data block (`data_NAME`): items, loops, and save frames.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    cell: Cell,
    frames: Vec<SaveFrame>,
}

impl DataBlock {
    pub fn new(name: &str) -> Self {
        Self {
            cell: Cell::new(name),
            frames: Vec::new(),
        }
    }

    pub fn frames(&self) -> &[SaveFrame] {
        &self.frames
    }

    /// Find a save frame by code (case-insensitive).
    pub fn frame(&self, name: &str) -> Option<&SaveFrame> {
        self.frames.iter().find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn contains_frame(&self, name: &str) -> bool {
        self.frame(name).is_some()
    }

    /// Append a frame; returns it back if its code is already taken.
    pub(crate) fn push_frame(&mut self, frame: SaveFrame) -> Result<(), SaveFrame> {
        if self.contains_frame(frame.name()) {
            return Err(frame);
        }
        self.frames.push(frame);
        Ok(())
    }

    pub(crate) fn cell_mut(&mut self) -> &mut Cell {
        &mut self.cell
    }
}

impl DataCell for DataBlock {
    fn cell(&self) -> &Cell {
        &self.cell
    }
}

/// True if `name` is `_` followed by one or more printable non-blank ASCII
/// characters.
pub fn is_valid_data_name(name: &str) -> bool {
    name.strip_prefix('_')
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_graphic()))
}

/// True if `code` is one or more printable non-blank ASCII characters.
pub fn is_valid_cell_code(code: &str) -> bool {
    // `:` and the quote characters are graphic, so they are accepted too.
    !code.is_empty() && code.bytes().all(|b| b.is_ascii_graphic())
}
