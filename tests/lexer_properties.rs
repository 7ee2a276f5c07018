use proptest::prelude::*;
use slimlsp::lexer::{
    count_braces, is_escaped, remove_comments_and_strings_from_line, ScrubbedSource,
};

/// Lines built from the characters the partitioner cares about.
fn script_line() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            Just("\"".to_string()),
            Just("'".to_string()),
            Just("\\".to_string()),
            Just("//".to_string()),
            Just("/*".to_string()),
            Just("*/".to_string()),
            Just("{".to_string()),
            Just("}".to_string()),
            Just("é".to_string()),
            "[a-z0-9 ();=.]{1,4}",
        ],
        0..24,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn scrubbing_preserves_line_length(line in script_line()) {
        prop_assert_eq!(remove_comments_and_strings_from_line(&line).len(), line.len());
    }

    #[test]
    fn scrubbing_preserves_every_line_of_a_document(lines in proptest::collection::vec(script_line(), 1..8)) {
        let text = lines.join("\n");
        let source = ScrubbedSource::new(&text);
        prop_assert_eq!(source.len(), lines.len());
        for (_, original, cleaned) in source.iter() {
            prop_assert_eq!(original.len(), cleaned.len());
        }
    }

    #[test]
    fn quote_is_escaped_by_odd_backslash_runs(prefix in "[a-z =(]{0,8}", run in 0usize..7) {
        let line = format!("{prefix}{}\"", "\\".repeat(run));
        let quote = line.len() - 1;
        prop_assert_eq!(is_escaped(&line, quote), run % 2 == 1);
    }

    #[test]
    fn plain_lines_count_braces_naively(line in "[a-z0-9 {}();=.,]{0,40}") {
        let naive = (
            line.chars().filter(|&c| c == '{').count(),
            line.chars().filter(|&c| c == '}').count(),
        );
        prop_assert_eq!(count_braces(&line), naive);
    }
}

#[test]
fn braces_inside_strings_and_comments_are_ignored() {
    assert_eq!(count_braces(r#"s = "{"; // }"#), (0, 0));
    assert_eq!(count_braces(r#"if (x) { y = '}'; /* { */"#), (1, 0));
}
