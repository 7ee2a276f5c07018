//! Lexical partitioning of script lines
//!
//! There is no real lexer for SLiM/Eidos in this crate. Instead every
//! character is classified as code, string literal, line comment or block
//! comment by a small automaton, and the rest of the analysis works on
//! *scrubbed* copies of each line in which non-code bytes are blanked out.
//!
//! Scrubbing replaces each non-code character with as many spaces as it has
//! UTF-8 bytes, so a scrubbed line has exactly the same byte length as the
//! original and regex match offsets in one are valid offsets in the other.

/// String literal emitted by [`remove_strings_from_line`] in place of each
/// literal in the source.
pub const STRING_PLACEHOLDER: &str = "\"S\"";

/// Snapshot of the string/comment automaton.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseState {
    pub in_string: bool,
    pub string_char: Option<char>,
    pub in_single_line_comment: bool,
    pub in_multi_line_comment: bool,
}

/// Outcome of feeding one character to the partitioner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharAction {
    /// The character is not code (string body, quote, comment or delimiter).
    pub skip: bool,
    /// A line comment started; the rest of the line is not code.
    pub break_line: bool,
}

impl CharAction {
    const CODE: CharAction = CharAction {
        skip: false,
        break_line: false,
    };
    const SKIP: CharAction = CharAction {
        skip: true,
        break_line: false,
    };
    const BREAK: CharAction = CharAction {
        skip: true,
        break_line: true,
    };
}

/// One classified character, as reported by [`LexicalPartitioner::scan_line`].
#[derive(Debug, Clone, Copy)]
pub struct CharInfo {
    pub pos: usize,
    pub ch: char,
    pub is_code: bool,
    /// Automaton state *after* this character.
    pub state: ParseState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    OpenComment,
    CloseComment,
}

/// Character-level string/comment classifier.
///
/// State persists across calls so a caller scanning a whole document can
/// carry open block comments (and open strings) from one line into the next.
#[derive(Debug, Clone, Default)]
pub struct LexicalPartitioner {
    state: ParseState,
    pending: Option<Pending>,
}

impl LexicalPartitioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ParseState) -> Self {
        LexicalPartitioner {
            state,
            pending: None,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Prepare for a new line. Line comments end at the newline; strings and
    /// block comments are left to the caller.
    pub fn start_line(&mut self) {
        self.state.in_single_line_comment = false;
        self.pending = None;
    }

    /// Classify `ch`, found at byte offset `pos` of `line`.
    pub fn process_char(
        &mut self,
        ch: char,
        prev: Option<char>,
        next: Option<char>,
        line: &str,
        pos: usize,
    ) -> CharAction {
        if let Some(pending) = self.pending.take() {
            if pending == Pending::CloseComment {
                self.state.in_multi_line_comment = false;
            }
            return CharAction::SKIP;
        }

        if self.state.in_single_line_comment {
            return CharAction::BREAK;
        }

        if self.state.in_multi_line_comment {
            if ch == '*' && next == Some('/') {
                self.pending = Some(Pending::CloseComment);
            }
            return CharAction::SKIP;
        }

        if self.state.in_string {
            let escaped = prev == Some('\\') && is_escaped(line, pos);
            if Some(ch) == self.state.string_char && !escaped {
                self.state.in_string = false;
                self.state.string_char = None;
            }
            return CharAction::SKIP;
        }

        match (ch, next) {
            ('"' | '\'', _) => {
                self.state.in_string = true;
                self.state.string_char = Some(ch);
                CharAction::SKIP
            }
            ('/', Some('/')) => {
                self.state.in_single_line_comment = true;
                CharAction::BREAK
            }
            ('/', Some('*')) => {
                self.state.in_multi_line_comment = true;
                self.pending = Some(Pending::OpenComment);
                CharAction::SKIP
            }
            _ => CharAction::CODE,
        }
    }

    /// Feed a whole line, calling `visit` for every character. Characters
    /// after a line comment are reported as non-code.
    pub fn scan_line<F>(&mut self, line: &str, mut visit: F)
    where
        F: FnMut(CharInfo),
    {
        self.start_line();
        let chars: Vec<(usize, char)> = line.char_indices().collect();
        let mut broken = false;
        for (i, &(pos, ch)) in chars.iter().enumerate() {
            let is_code = if broken {
                false
            } else {
                let prev = i.checked_sub(1).map(|j| chars[j].1);
                let next = chars.get(i + 1).map(|&(_, c)| c);
                let action = self.process_char(ch, prev, next, line, pos);
                broken = action.break_line;
                !action.skip
            };
            visit(CharInfo {
                pos,
                ch,
                is_code,
                state: self.state,
            });
        }
    }
}

/// A quote at byte `pos` is escaped iff it is preceded by an odd number of
/// consecutive backslashes.
pub fn is_escaped(line: &str, pos: usize) -> bool {
    let backslashes = line.as_bytes()[..pos.min(line.len())]
        .iter()
        .rev()
        .take_while(|&&b| b == b'\\')
        .count();
    backslashes % 2 == 1
}

fn push_code_or_blank(out: &mut String, info: CharInfo) {
    if info.is_code {
        out.push(info.ch);
    } else {
        out.extend(std::iter::repeat(' ').take(info.ch.len_utf8()));
    }
}

/// Replace string literals and comments with spaces, preserving byte length.
pub fn remove_comments_and_strings_from_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    LexicalPartitioner::new().scan_line(line, |info| push_code_or_blank(&mut out, info));
    out
}

/// Byte spans `(start, end)` of the string literals on a line, quotes
/// included. An unterminated literal runs to the end of the line.
pub fn string_spans(line: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    LexicalPartitioner::new().scan_line(line, |info| match open {
        None if info.state.in_string => open = Some(info.pos),
        Some(start) if !info.state.in_string => {
            spans.push((start, info.pos + info.ch.len_utf8()));
            open = None;
        }
        _ => {}
    });
    if let Some(start) = open {
        spans.push((start, line.len()));
    }
    spans
}

/// Replace each string literal (quotes included) with [`STRING_PLACEHOLDER`].
/// Comments are kept. The result is *not* column-preserving; use it where
/// only the shape of an expression matters.
pub fn remove_strings_from_line(line: &str) -> String {
    let mut result = String::with_capacity(line.len());
    let mut cursor = 0;
    for (start, end) in string_spans(line) {
        result.push_str(&line[cursor..start]);
        result.push_str(STRING_PLACEHOLDER);
        cursor = end;
    }
    result.push_str(&line[cursor..]);
    result
}

/// Count `open`/`close` characters that are code, ignoring strings and
/// comments.
pub fn count_delimiters(line: &str, open: char, close: char) -> (usize, usize) {
    let mut counts = (0, 0);
    LexicalPartitioner::new().scan_line(line, |info| {
        if info.is_code {
            if info.ch == open {
                counts.0 += 1;
            } else if info.ch == close {
                counts.1 += 1;
            }
        }
    });
    counts
}

pub fn count_braces(line: &str) -> (usize, usize) {
    count_delimiters(line, '{', '}')
}

pub fn count_parens(line: &str) -> (usize, usize) {
    count_delimiters(line, '(', ')')
}

/// Net `open - close` of raw characters. Only meaningful on scrubbed text.
pub fn net_count(cleaned: &str, open: char, close: char) -> i32 {
    cleaned.chars().fold(0, |acc, ch| {
        if ch == open {
            acc + 1
        } else if ch == close {
            acc - 1
        } else {
            acc
        }
    })
}

/// A whole document split into lines, with a scrubbed copy of each line.
///
/// Block comments and string literals are carried across line boundaries, so
/// an unterminated string blanks everything after it. The opening quote of
/// such a string is remembered for the unclosed-string diagnostic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrubbedSource {
    pub lines: Vec<String>,
    pub cleaned: Vec<String>,
    /// String literal spans of each line, quotes included. A literal carried
    /// in from the previous line starts at 0; one left open runs to the end.
    pub strings: Vec<Vec<(usize, usize)>>,
    pub unterminated_string: Option<(usize, usize)>,
}

impl ScrubbedSource {
    pub fn new(text: &str) -> Self {
        let lines: Vec<String> = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
            .collect();
        let mut partitioner = LexicalPartitioner::new();
        let mut cleaned = Vec::with_capacity(lines.len());
        let mut strings = Vec::with_capacity(lines.len());
        let mut string_open: Option<(usize, usize)> = None;

        for (index, line) in lines.iter().enumerate() {
            let mut out = String::with_capacity(line.len());
            let was_in_string = partitioner.state().in_string;
            if !was_in_string {
                string_open = None;
            }
            let mut in_string = was_in_string;
            let mut spans = Vec::new();
            let mut span_start = was_in_string.then_some(0);
            partitioner.scan_line(line, |info| {
                if info.state.in_string && !in_string {
                    string_open = Some((index, info.pos));
                    span_start = Some(info.pos);
                }
                if !info.state.in_string && in_string {
                    if let Some(start) = span_start.take() {
                        spans.push((start, info.pos + info.ch.len_utf8()));
                    }
                }
                in_string = info.state.in_string;
                push_code_or_blank(&mut out, info);
            });
            if let Some(start) = span_start {
                spans.push((start, line.len()));
            }
            cleaned.push(out);
            strings.push(spans);
        }

        let unterminated_string = if partitioner.state().in_string {
            string_open
        } else {
            None
        };

        ScrubbedSource {
            lines,
            cleaned,
            strings,
            unterminated_string,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> &str {
        self.lines.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn cleaned(&self, index: usize) -> &str {
        self.cleaned.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn string_spans(&self, index: usize) -> &[(usize, usize)] {
        self.strings.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate `(index, original, cleaned)` triples.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str, &str)> {
        self.lines
            .iter()
            .zip(&self.cleaned)
            .enumerate()
            .map(|(i, (l, c))| (i, l.as_str(), c.as_str()))
    }

    /// True if the byte at `pos` of line `index` is a non-blank code byte.
    pub fn is_code_at(&self, index: usize, pos: usize) -> bool {
        self.cleaned
            .get(index)
            .and_then(|clean| clean.as_bytes().get(pos))
            .is_some_and(|&b| b != b' ' && b != b'\t')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_comment() {
        let line = "x = 1; // note";
        assert_eq!(remove_comments_and_strings_from_line(line), "x = 1;        ");
    }

    #[test]
    fn strips_strings_with_escapes() {
        let line = r#"s = "a\"b"; t = 'c';"#;
        let cleaned = remove_comments_and_strings_from_line(line);
        assert_eq!(cleaned.len(), line.len());
        assert_eq!(cleaned, "s =       ; t =    ;");
    }

    #[test]
    fn double_backslash_closes_string() {
        let line = r#"s = "a\\"; x"#;
        let cleaned = remove_comments_and_strings_from_line(line);
        assert!(cleaned.ends_with("; x"));
    }

    #[test]
    fn block_comment_on_one_line() {
        let line = "a /* b */ c";
        assert_eq!(remove_comments_and_strings_from_line(line), "a         c");
    }

    #[test]
    fn comment_opener_star_does_not_close() {
        let line = "a /*/ b";
        assert_eq!(remove_comments_and_strings_from_line(line), "a      ");
    }

    #[test]
    fn block_comment_state_persists_to_caller() {
        let mut partitioner = LexicalPartitioner::new();
        partitioner.scan_line("x = 1; /* open", |_| {});
        assert!(partitioner.state().in_multi_line_comment);
        let mut code = String::new();
        partitioner.scan_line("still */ y", |info| {
            if info.is_code {
                code.push(info.ch);
            }
        });
        assert_eq!(code.trim(), "y");
    }

    #[test]
    fn string_spans_follow_document_state() {
        let source = ScrubbedSource::new("/* it's\n still' */ x = \"a\";\ny = \"open\nclosed\" + 1;");
        assert!(source.string_spans(0).is_empty());
        assert_eq!(source.string_spans(1), &[(15, 18)]);
        assert_eq!(source.string_spans(2), &[(4, 9)]);
        assert_eq!(source.string_spans(3), &[(0, 7)]);
        assert!(source.string_spans(9).is_empty());
    }

    #[test]
    fn resumes_inside_an_open_string() {
        let mut partitioner = LexicalPartitioner::with_state(ParseState {
            in_string: true,
            string_char: Some('"'),
            ..ParseState::default()
        });
        let mut code = String::new();
        partitioner.scan_line("tail\" + x;", |info| {
            if info.is_code {
                code.push(info.ch);
            }
        });
        assert_eq!(code.trim(), "+ x;");
        assert!(!partitioner.state().in_string);
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        assert_eq!(count_braces(r#"x = "{"; { // }"#), (1, 0));
        assert_eq!(count_parens("f(g(1), \")\")"), (2, 2));
    }

    #[test]
    fn string_placeholder_replaces_each_literal() {
        assert_eq!(
            remove_strings_from_line(r#"sim.addSubpop("p1", 10); // "x""#),
            r#"sim.addSubpop("S", 10); // "x""#
        );
    }

    #[test]
    fn escape_detection_counts_backslashes() {
        assert!(is_escaped(r#"a\""#, 2));
        assert!(!is_escaped(r#"a\\""#, 3));
        assert!(is_escaped(r#"a\\\""#, 4));
        assert!(!is_escaped("\"", 0));
    }

    #[test]
    fn scrubbed_source_carries_block_comments() {
        let source = ScrubbedSource::new("a /*\n b {\n */ c {");
        assert_eq!(source.cleaned(1).trim(), "");
        assert_eq!(source.cleaned(2).trim(), "c {");
        assert_eq!(source.unterminated_string, None);
    }

    #[test]
    fn scrubbed_source_reports_unterminated_string() {
        let source = ScrubbedSource::new("x = 1;\ny = \"abc;\nz = 2;");
        assert_eq!(source.unterminated_string, Some((1, 4)));
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn scrubbed_source_keeps_trailing_empty_line() {
        let source = ScrubbedSource::new("a;\r\nb;\n");
        assert_eq!(source.len(), 3);
        assert_eq!(source.line(0), "a;");
    }
}
