//! Text helpers for locating what the cursor is on
//!
//! Hover and completion work on scrubbed lines (strings and comments blanked),
//! so brackets found here are always code brackets.

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Byte span of the identifier under `byte`, or ending right at it.
pub fn word_at(line: &str, byte: usize) -> Option<(usize, usize)> {
    let bytes = line.as_bytes();
    let byte = byte.min(bytes.len());
    let mut start = byte;
    while start > 0 && is_word_byte(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = byte;
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }
    (start < end).then_some((start, end))
}

/// Start of the identifier prefix that ends at `byte`; `byte` itself when the
/// cursor is not after a word.
pub fn prefix_start(line: &str, byte: usize) -> usize {
    let bytes = line.as_bytes();
    let mut start = byte.min(bytes.len());
    while start > 0 && is_word_byte(bytes[start - 1]) {
        start -= 1;
    }
    start
}

/// Offset of the `.` that makes the word starting at `word_start` a member
/// access, if there is one.
pub fn member_dot(line: &str, word_start: usize) -> Option<usize> {
    let before = line[..word_start].trim_end();
    before.ends_with('.').then(|| before.len() - 1)
}

/// The receiver expression written before the `.` at `dot`: identifiers,
/// member accesses, calls and subscripts, e.g. `sim.subpopulations[0]`.
pub fn receiver_before(line: &str, dot: usize) -> Option<&str> {
    let bytes = line.as_bytes();
    let end = line[..dot].trim_end().len();
    let mut start = end;
    while start > 0 {
        match bytes[start - 1] {
            close @ (b')' | b']') => {
                let open = if close == b')' { b'(' } else { b'[' };
                match matching_open(bytes, start - 1, open, close) {
                    Some(index) => start = index,
                    None => break,
                }
            }
            b'.' => start -= 1,
            b if is_word_byte(b) => start -= 1,
            _ => break,
        }
    }
    let expr = line[start..end].trim_start_matches('.');
    (!expr.is_empty()).then_some(expr)
}

fn matching_open(bytes: &[u8], close_at: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    for index in (0..=close_at).rev() {
        if bytes[index] == close {
            depth += 1;
        } else if bytes[index] == open {
            depth -= 1;
            if depth == 0 {
                return Some(index);
            }
        }
    }
    None
}
