//! Whitespace-insensitive result comparison.
//!
//! Both sides are compared with every whitespace character removed, so
//! `"[1, 2]"` matches `"[1,2]"` and `"a b"` matches `"ab"`. Nothing else is
//! normalized: `"1.0"` and `"1"` differ, as do `'x'` and `"x"`.

/// `s` without any Unicode whitespace.
pub fn normalize(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// `true` if `actual` and `expected` are equal after [`normalize`].
///
/// # Examples
/// ```
/// use codegrade::compare::outputs_match;
/// assert!(outputs_match("[1, 2]", "[1,2]"));
/// assert!(!outputs_match("1.0", "1"));
/// ```
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize(actual) == normalize(expected)
}
