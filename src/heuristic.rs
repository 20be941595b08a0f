//! Heuristic fallback analyzer.
//!
//! Crude, deterministic pattern matching used when no remote backend
//! produced a usable report. Rules are layered and a later match always
//! overrides an earlier one:
//!
//! | Order | Pattern | Time |
//! |-------|---------|------|
//! | 1 | (default) | `O(1)` |
//! | 2 | C-style `for (;;)` or `while (..)` | `O(n)` |
//! | 3 | loop opener inside another loop body | `O(n^2)` |
//! | 4 | `merge` `quick` `sort` `binary` `log` | `O(n log n)` |
//! | 5 | `recursion` `fibonacci` `factorial` `dp` `memo`, or a self-calling function | `O(2^n)` |
//!
//! Space is always reported as `O(1)`.
//!
//! Keyword tests are plain substring checks on the lowercased input, so
//! `console.log` counts as `log` and `adapter` counts as `dp`.

use crate::report::ComplexityReport;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

const DIVIDE_AND_CONQUER_KEYWORDS: [&str; 5] = ["merge", "quick", "sort", "binary", "log"];
const EXPONENTIAL_KEYWORDS: [&str; 5] = ["recursion", "fibonacci", "factorial", "dp", "memo"];

static COUNTED_LOOP: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\bfor\s*\([^;]*;[^;]*;[^)]*\)|\bwhile\s*\([^)]*\)").ok()
});

static NESTED_LOOP: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(?:for|while)\s*\(.*?\)\s*\{[^}]*\b(?:for|while)\s*\(").ok()
});

static FUNCTION_DECL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(?:function|def|fn)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*\(").ok()
});

/// Time complexity classes the heuristic can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeClass {
    /// `O(1)`
    Constant,
    /// `O(n)`
    Linear,
    /// `O(n^2)`
    Quadratic,
    /// `O(n log n)`
    Linearithmic,
    /// `O(2^n)`
    Exponential,
}

impl TimeClass {
    /// Big-O notation for this class.
    pub fn notation(self) -> &'static str {
        match self {
            TimeClass::Constant => "O(1)",
            TimeClass::Linear => "O(n)",
            TimeClass::Quadratic => "O(n^2)",
            TimeClass::Linearithmic => "O(n log n)",
            TimeClass::Exponential => "O(2^n)",
        }
    }
}

impl fmt::Display for TimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.notation())
    }
}

/// Classify the running time of `code` by applying the rules in order.
pub fn classify(code: &str) -> TimeClass {
    let lower = code.to_lowercase();
    let mut class = TimeClass::Constant;

    if is_match(&COUNTED_LOOP, code) {
        class = TimeClass::Linear;
    }
    if is_match(&NESTED_LOOP, code) {
        class = TimeClass::Quadratic;
    }
    if contains_any(&lower, &DIVIDE_AND_CONQUER_KEYWORDS) {
        class = TimeClass::Linearithmic;
    }
    if contains_any(&lower, &EXPONENTIAL_KEYWORDS) || calls_itself(code) {
        class = TimeClass::Exponential;
    }

    class
}

/// Produce a complexity report for `code` without any I/O.
///
/// Total and pure: identical input always yields an identical report.
///
/// # Example
///
/// ```rust
/// use complexity_broker::heuristic::analyze;
///
/// let report = analyze("x = 1");
/// assert_eq!(report.to_string(), "Time Complexity: O(1)\nSpace Complexity: O(1)");
/// ```
pub fn analyze(code: &str) -> ComplexityReport {
    ComplexityReport::new(
        classify(code).notation(),
        TimeClass::Constant.notation(),
    )
}

fn is_match(re: &LazyLock<Option<Regex>>, code: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(code))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// True when a declared function name is invoked again elsewhere in the text.
fn calls_itself(code: &str) -> bool {
    let Some(decl) = FUNCTION_DECL.as_ref() else {
        return false;
    };

    decl.captures_iter(code)
        .filter_map(|caps| caps.get(1))
        .any(|name| call_sites(code, name.as_str()) >= 2)
}

/// Occurrences of `name` used as a call: not preceded by an identifier
/// character and followed by optional whitespace then `(`.
fn call_sites(code: &str, name: &str) -> usize {
    code.match_indices(name)
        .filter(|(at, _)| {
            let bounded = !code[..*at].chars().next_back().is_some_and(is_ident_char);
            bounded && code[at + name.len()..].trim_start().starts_with('(')
        })
        .count()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}
