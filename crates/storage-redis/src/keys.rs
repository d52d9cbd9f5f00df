//! Prefix-to-pattern conversion for membership-set scans.
//!
//! Redis `SSCAN ... MATCH` takes a glob pattern. Stored keys are arbitrary
//! text, so a prefix is escaped before the trailing `*` is appended; otherwise
//! a prefix containing `*`, `?`, `[`, `]` or `\` would match keys it does not
//! start.

/// Characters with special meaning in Redis glob patterns.
const GLOB_METACHARACTERS: [char; 5] = ['*', '?', '[', ']', '\\'];

/// Escapes every glob metacharacter in `text` with a backslash.
pub(crate) fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if GLOB_METACHARACTERS.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Builds the `MATCH` pattern selecting every key that starts with `prefix`.
pub(crate) fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = escape_glob(prefix);
    pattern.push('*');
    pattern
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Minimal Redis-compatible glob matcher covering `*`, `?` and `\` escapes.
    fn glob_matches(pattern: &[char], text: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('*', rest)) => (0..=text.len()).any(|skip| glob_matches(rest, &text[skip..])),
            Some(('?', rest)) => !text.is_empty() && glob_matches(rest, &text[1..]),
            Some(('\\', rest)) => match rest.split_first() {
                Some((literal, rest)) => {
                    text.first() == Some(literal) && glob_matches(rest, &text[1..])
                },
                None => false,
            },
            Some((ch, rest)) => text.first() == Some(ch) && glob_matches(rest, &text[1..]),
        }
    }

    fn matches(pattern: &str, text: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().collect();
        let text: Vec<char> = text.chars().collect();
        glob_matches(&pattern, &text)
    }

    #[test]
    fn test_plain_prefix_is_unchanged() {
        assert_eq!(prefix_pattern("AGGRHIST:playing:"), "AGGRHIST:playing:*");
        assert_eq!(prefix_pattern(""), "*");
    }

    #[test]
    fn test_metacharacters_are_escaped() {
        assert_eq!(escape_glob("a*b?c[d]e\\f"), "a\\*b\\?c\\[d\\]e\\\\f");
    }

    #[test]
    fn test_escaped_star_does_not_match_other_keys() {
        let pattern = prefix_pattern("vid*");
        assert!(matches(&pattern, "vid*:1"));
        assert!(!matches(&pattern, "video:1"));
    }

    proptest! {
        #[test]
        fn prop_pattern_matches_exactly_the_prefixed_keys(
            prefix in "[a-c*?\\\\:]{0,6}",
            key in "[a-c*?\\\\:]{0,10}",
        ) {
            let pattern = prefix_pattern(&prefix);
            prop_assert_eq!(matches(&pattern, &key), key.starts_with(&prefix));
        }
    }
}
