//! Complexity report type and the structural contract shared by all backends.
//!
//! A report is always rendered as exactly two lines:
//!
//! ```text
//! Time Complexity: O(n)
//! Space Complexity: O(1)
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Marker a backend response must contain to be accepted.
pub const TIME_MARKER: &str = "Time Complexity";

/// Placeholder used when a line cannot be extracted from backend text.
pub const NOT_FOUND: &str = "Not found";

// The captured expression may not start on label punctuation, so a bare
// `Time Complexity:` line yields no capture instead of a lone `:`.
static TIME_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"Time Complexity[ \t]*\**[ \t]*:?[ \t]*\**[ \t]*([^\n*:][^\n]*)").ok()
});

static SPACE_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"Space Complexity[ \t]*\**[ \t]*:?[ \t]*\**[ \t]*([^\n*:][^\n]*)").ok()
});

/// A time/space complexity estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityReport {
    /// Big-O expression for running time, e.g. `O(n log n)`.
    pub time: String,
    /// Big-O expression for auxiliary space, e.g. `O(1)`.
    pub space: String,
}

impl ComplexityReport {
    /// Build a report from two expressions.
    pub fn new(time: impl Into<String>, space: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            space: space.into(),
        }
    }

    /// Pull the `Time Complexity` and `Space Complexity` lines out of free
    /// text. Each missing line becomes [`NOT_FOUND`].
    pub fn extract(text: &str) -> Self {
        Self {
            time: capture_line(&TIME_LINE, text),
            space: capture_line(&SPACE_LINE, text),
        }
    }
}

impl fmt::Display for ComplexityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Time Complexity: {}\nSpace Complexity: {}",
            self.time, self.space
        )
    }
}

/// The validity predicate applied to every backend response: non-empty and
/// containing the literal `"Time Complexity"`.
pub fn is_valid_response(text: &str) -> bool {
    !text.trim().is_empty() && text.contains(TIME_MARKER)
}

fn capture_line(re: &LazyLock<Option<Regex>>, text: &str) -> String {
    re.as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().trim_end_matches('*').trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NOT_FOUND.to_string())
}
