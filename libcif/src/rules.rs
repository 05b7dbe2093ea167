//! Character attributes and the per-revision rule set.
//!
//! Every 7-bit code point carries a set of [`Attributes`]. The scanner never
//! tests characters directly; it asks the table. Revisions differ only in
//! which characters are legal or special and in four length limits.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use thiserror::Error;

/// A set of character attribute flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Attributes(u16);

impl Attributes {
    pub const NONE: Attributes = Attributes(0);
    /// The character may appear in a CIF at all.
    pub const LEGAL: Attributes = Attributes(1 << 0);
    pub const WHITESPACE: Attributes = Attributes(1 << 1);
    pub const LINE_TERMINATOR: Attributes = Attributes(1 << 2);
    /// Opens and closes a single-line quoted value.
    pub const INLINE_QUOTE: Attributes = Attributes(1 << 3);
    /// Opens and closes a text block when found in column 1.
    pub const BLOCK_QUOTE: Attributes = Attributes(1 << 4);
    pub const COMMENT_BEGIN: Attributes = Attributes(1 << 5);
    pub const NAME_BEGIN: Attributes = Attributes(1 << 6);
    /// May begin an unquoted value.
    pub const VALUE_BEGIN: Attributes = Attributes(1 << 7);
    /// Terminates the input when read.
    pub const EOF_MARKER: Attributes = Attributes(1 << 8);

    pub const fn contains(self, other: Attributes) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Attributes) -> Attributes {
        Attributes(self.0 | other.0)
    }

    pub const fn difference(self, other: Attributes) -> Attributes {
        Attributes(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Attributes {
    type Output = Attributes;

    fn bitor(self, rhs: Attributes) -> Attributes {
        self.union(rhs)
    }
}

impl BitOrAssign for Attributes {
    fn bitor_assign(&mut self, rhs: Attributes) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Attributes, &str); 9] = [
            (Attributes::LEGAL, "LEGAL"),
            (Attributes::WHITESPACE, "WHITESPACE"),
            (Attributes::LINE_TERMINATOR, "LINE_TERMINATOR"),
            (Attributes::INLINE_QUOTE, "INLINE_QUOTE"),
            (Attributes::BLOCK_QUOTE, "BLOCK_QUOTE"),
            (Attributes::COMMENT_BEGIN, "COMMENT_BEGIN"),
            (Attributes::NAME_BEGIN, "NAME_BEGIN"),
            (Attributes::VALUE_BEGIN, "VALUE_BEGIN"),
            (Attributes::EOF_MARKER, "EOF_MARKER"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(attr, _)| self.contains(*attr))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Attributes({})", names.join(" | "))
    }
}

/// Error raised when configuring a rule set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    /// Only 7-bit characters carry attributes.
    #[error("character U+{0:04X} is outside the attribute table")]
    OutOfTable(u32),
}

const TABLE_SIZE: usize = 128;

const TAB: usize = 0x09;
const LF: usize = 0x0A;
const VT: usize = 0x0B;
const FF: usize = 0x0C;
const CR: usize = 0x0D;
const CTRL_D: usize = 0x04;
const CTRL_Z: usize = 0x1A;

/// Attribute flags for every 7-bit code point.
#[derive(Clone, PartialEq, Eq)]
pub struct AttributeTable {
    entries: [Attributes; TABLE_SIZE],
}

impl AttributeTable {
    /// The CIF 1.1 character rules.
    pub fn cif_1_1() -> Self {
        let mut entries = [Attributes::NONE; TABLE_SIZE];
        let legal_ws = Attributes::LEGAL | Attributes::WHITESPACE;

        entries[TAB] = legal_ws;
        entries[LF] = legal_ws | Attributes::LINE_TERMINATOR;
        entries[CR] = legal_ws | Attributes::LINE_TERMINATOR;
        entries[CTRL_D] = legal_ws | Attributes::EOF_MARKER;
        entries[CTRL_Z] = legal_ws | Attributes::EOF_MARKER;
        // Recognized, but illegal unless explicitly allowed.
        entries[VT] = Attributes::WHITESPACE;
        entries[FF] = Attributes::WHITESPACE | Attributes::LINE_TERMINATOR;

        for entry in entries.iter_mut().take(0x7F).skip(0x20) {
            *entry = Attributes::LEGAL | Attributes::VALUE_BEGIN;
        }

        let mut adjust = |c: char, add: Attributes, remove: Attributes| {
            let i = c as usize;
            entries[i] = entries[i].union(add).difference(remove);
        };
        adjust(' ', Attributes::WHITESPACE, Attributes::VALUE_BEGIN);
        adjust(';', Attributes::BLOCK_QUOTE, Attributes::NONE);
        adjust('"', Attributes::INLINE_QUOTE, Attributes::VALUE_BEGIN);
        adjust('\'', Attributes::INLINE_QUOTE, Attributes::VALUE_BEGIN);
        adjust('#', Attributes::COMMENT_BEGIN, Attributes::VALUE_BEGIN);
        adjust('_', Attributes::NAME_BEGIN, Attributes::VALUE_BEGIN);
        adjust('$', Attributes::NONE, Attributes::VALUE_BEGIN);
        adjust('[', Attributes::NONE, Attributes::VALUE_BEGIN);
        adjust(']', Attributes::NONE, Attributes::VALUE_BEGIN);

        Self { entries }
    }

    /// The attributes of `c`; characters outside the table have none.
    pub fn get(&self, c: char) -> Attributes {
        self.entries
            .get(c as usize)
            .copied()
            .unwrap_or(Attributes::NONE)
    }

    /// Add attributes to `c`.
    pub fn set(&mut self, c: char, attrs: Attributes) -> Result<(), RulesError> {
        let entry = self.entry_mut(c)?;
        *entry = entry.union(attrs);
        Ok(())
    }

    /// Remove attributes from `c`.
    pub fn clear(&mut self, c: char, attrs: Attributes) -> Result<(), RulesError> {
        let entry = self.entry_mut(c)?;
        *entry = entry.difference(attrs);
        Ok(())
    }

    /// True only if `c` has `attr` and is also legal.
    pub fn check(&self, attr: Attributes, c: char) -> bool {
        self.get(c).contains(attr | Attributes::LEGAL)
    }

    pub fn is_legal(&self, c: char) -> bool {
        self.get(c).contains(Attributes::LEGAL)
    }

    fn entry_mut(&mut self, c: char) -> Result<&mut Attributes, RulesError> {
        self.entries
            .get_mut(c as usize)
            .ok_or(RulesError::OutOfTable(c as u32))
    }

    // Internal toggles only touch 7-bit characters, so the lookups cannot fail.
    fn toggle(&mut self, c: char, attrs: Attributes, on: bool) {
        let i = c as usize;
        self.entries[i] = if on {
            self.entries[i].union(attrs)
        } else {
            self.entries[i].difference(attrs)
        };
    }
}

impl Default for AttributeTable {
    fn default() -> Self {
        Self::cif_1_1()
    }
}

impl fmt::Debug for AttributeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| !a.is_empty()),
            )
            .finish()
    }
}

/// Line length limit in CIF 1.0.
pub const CIF_1_0_MAX_LINE_LENGTH: usize = 80;
/// Data block code length limit in CIF 1.0.
pub const CIF_1_0_MAX_BLOCK_NAME_LENGTH: usize = 32;
/// Line length limit in CIF 1.1.
pub const CIF_1_1_MAX_LINE_LENGTH: usize = 2048;
/// Block code, frame code, and data name length limit in CIF 1.1.
pub const CIF_1_1_MAX_NAME_LENGTH: usize = 75;

/// Everything that distinguishes one CIF revision from another.
///
/// Limits are in characters; `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rules {
    pub attributes: AttributeTable,
    pub max_line_length: Option<usize>,
    pub max_block_name_length: Option<usize>,
    pub max_frame_name_length: Option<usize>,
    pub max_data_name_length: Option<usize>,
}

impl Rules {
    /// CIF 1.0: short lines and block codes, VT and FF allowed, square
    /// brackets ordinary.
    pub fn cif_1_0() -> Self {
        let mut rules = Self {
            attributes: AttributeTable::cif_1_1(),
            max_line_length: Some(CIF_1_0_MAX_LINE_LENGTH),
            max_block_name_length: Some(CIF_1_0_MAX_BLOCK_NAME_LENGTH),
            max_frame_name_length: None,
            max_data_name_length: None,
        };
        rules.set_square_brackets_special(false);
        rules.set_vt_allowed(true);
        rules.set_ff_allowed(true);
        rules
    }

    /// CIF 1.1.
    pub fn cif_1_1() -> Self {
        Self {
            attributes: AttributeTable::cif_1_1(),
            max_line_length: Some(CIF_1_1_MAX_LINE_LENGTH),
            max_block_name_length: Some(CIF_1_1_MAX_NAME_LENGTH),
            max_frame_name_length: Some(CIF_1_1_MAX_NAME_LENGTH),
            max_data_name_length: Some(CIF_1_1_MAX_NAME_LENGTH),
        }
    }

    /// CIF 1.1 characters with the CIF 1.0 line and block code limits: a
    /// document that passes is acceptable to both revisions.
    pub fn intersection() -> Self {
        Self {
            max_line_length: Some(CIF_1_0_MAX_LINE_LENGTH),
            max_block_name_length: Some(CIF_1_0_MAX_BLOCK_NAME_LENGTH),
            ..Self::cif_1_1()
        }
    }

    /// Whether `[` and `]` are barred from starting an unquoted value.
    pub fn set_square_brackets_special(&mut self, special: bool) {
        self.attributes.toggle('[', Attributes::VALUE_BEGIN, !special);
        self.attributes.toggle(']', Attributes::VALUE_BEGIN, !special);
    }

    /// Whether vertical tab is legal whitespace.
    pub fn set_vt_allowed(&mut self, allowed: bool) {
        self.attributes.toggle('\u{b}', Attributes::LEGAL, allowed);
    }

    /// Whether form feed is a legal line terminator.
    pub fn set_ff_allowed(&mut self, allowed: bool) {
        self.attributes.toggle('\u{c}', Attributes::LEGAL, allowed);
    }

    pub fn is_whitespace(&self, c: char) -> bool {
        self.attributes.check(Attributes::WHITESPACE, c)
    }

    pub fn is_line_terminator(&self, c: char) -> bool {
        self.attributes.check(Attributes::LINE_TERMINATOR, c)
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self::cif_1_1()
    }
}
