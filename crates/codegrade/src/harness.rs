//! Per-case harness synthesis.
//!
//! The harness is the submission followed by two generated statements: bind
//! the evaluated input expression, then call the entry point with it. The
//! input is Python source, not a literal, so `[1, 2]`, `(2, 3)` or
//! `{"a": 1}` all work; it is parenthesized on its own lines so multi-line
//! expressions parse.

/// Name the evaluated input is bound to.
pub const INPUT_VAR: &str = "__grader_input__";

/// Name the entry point's return value is bound to.
pub const RESULT_VAR: &str = "__grader_result__";

/// Build the source executed for one test case.
///
/// A blank input calls the entry point with no arguments.
///
/// # Examples
/// ```
/// use codegrade::harness::build_harness;
/// let src = build_harness("def double(x):\n    return x * 2", "double", "3");
/// assert!(src.ends_with("__grader_result__ = double(__grader_input__)\n"));
/// ```
pub fn build_harness(code: &str, entry_point: &str, input: &str) -> String {
    let code = code.trim_end();
    if input.trim().is_empty() {
        format!("{code}\n\n{RESULT_VAR} = {entry_point}()\n")
    } else {
        format!(
            "{code}\n\n{INPUT_VAR} = (\n{input}\n)\n{RESULT_VAR} = {entry_point}({INPUT_VAR})\n"
        )
    }
}
