//! Text helpers.

/// Truncate `s` to at most `max_bytes` bytes without splitting a UTF-8
/// character.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_string_unchanged() {
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn truncates_ascii() {
        assert_eq!(truncate_str("hello world", 5), "hello");
    }

    #[test]
    fn never_splits_multibyte() {
        // "é" is two bytes
        assert_eq!(truncate_str("aé", 2), "a");
    }

    proptest! {
        #[test]
        fn result_is_prefix_within_budget(s in ".*", max in 0usize..64) {
            let out = truncate_str(&s, max);
            prop_assert!(out.len() <= max);
            prop_assert!(s.starts_with(out));
        }
    }
}
