//! Position and Range types for LSP integration
//!
//! The analysis core matches regexes against line text and gets byte offsets
//! back. These wrappers turn `(line, byte offset)` pairs into LSP positions,
//! which count UTF-16 code units.

use tower_lsp::lsp_types::{Position as LspPosition, Range as LspRange};

/// A position in a document (line, UTF-16 column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position(pub LspPosition);

impl Position {
    /// Build a position from a byte offset into `line_text`.
    pub fn from_byte(line: usize, line_text: &str, byte: usize) -> Self {
        Position(LspPosition::new(line as u32, utf16_column(line_text, byte)))
    }
}

impl From<Position> for LspPosition {
    fn from(pos: Position) -> Self {
        pos.0
    }
}

/// A range in a document (start and end positions)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range(pub LspRange);

impl Range {
    /// Range covering bytes `start..end` of a single line.
    pub fn from_bytes(line: usize, line_text: &str, start: usize, end: usize) -> Self {
        Range(LspRange::new(
            Position::from_byte(line, line_text, start).into(),
            Position::from_byte(line, line_text, end.max(start)).into(),
        ))
    }
}

impl From<Range> for LspRange {
    fn from(range: Range) -> Self {
        range.0
    }
}

/// Convert a byte offset in `line` to a UTF-16 column. Offsets past the end
/// of the line, or inside a multi-byte character, clamp to the preceding
/// character boundary.
pub fn utf16_column(line: &str, byte: usize) -> u32 {
    let mut column = 0u32;
    for (offset, ch) in line.char_indices() {
        if offset >= byte {
            break;
        }
        column += ch.len_utf16() as u32;
    }
    column
}

/// Convert a UTF-16 column back to a byte offset in `line`.
pub fn byte_offset(line: &str, column: u32) -> usize {
    let mut seen = 0u32;
    for (offset, ch) in line.char_indices() {
        if seen >= column {
            return offset;
        }
        seen += ch.len_utf16() as u32;
    }
    line.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_columns_match_bytes() {
        assert_eq!(utf16_column("p1.bogus();", 3), 3);
        assert_eq!(byte_offset("p1.bogus();", 3), 3);
    }

    #[test]
    fn multibyte_columns_count_utf16_units() {
        let line = "x = \"é\"; p1.bogus();";
        let byte = line.find("bogus").unwrap();
        assert_eq!(utf16_column(line, byte), (byte - 1) as u32);
        assert_eq!(byte_offset(line, utf16_column(line, byte)), byte);
    }
}
