//! Cleanup of raw completion text
//!
//! Models like to wrap answers in markdown fences even when told not to.
//! [`clean_completion`] removes one leading and one trailing fence and then
//! guesses what kind of payload is left. The guess is advisory: it can be
//! fooled by prose that opens with "from " or "class ", and it misses code
//! that only starts with comments for more than the inspected prefix.

use regex::Regex;
use std::sync::LazyLock;

static LEADING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    // the info string is a whole word ending the fence line
    Regex::new(r"^```[\w+.#-]*[ \t]*(?:\r?\n|$)").expect("valid fence regex")
});

const TRAILING_FENCE: &str = "```";

/// Prefixes that mark generated pytest/Allure source
const CODE_INDICATORS: &[&str] = &[
    "import ",
    "@allure",
    "def test_",
    "class ",
    "from ",
    "with allure",
    "@pytest",
    "@mark",
];

/// How far into the text an indicator may appear
const INDICATOR_WINDOW: usize = 200;
/// Minimum length for an indicator inside the window to count
const MIN_CODE_LENGTH: usize = 50;

/// Best guess of what a cleaned completion contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Looks like Python source already
    Code,
    /// Looks like a JSON object or array
    Structured,
    /// Anything else
    Prose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedCompletion {
    pub text: String,
    pub classification: Classification,
}

impl CleanedCompletion {
    pub fn is_code(&self) -> bool {
        self.classification == Classification::Code
    }
}

/// Strips wrapping fences, trims, and classifies the remainder
pub fn clean_completion(raw: &str) -> CleanedCompletion {
    let text = strip_fences(raw);
    let classification = classify(&text);
    CleanedCompletion {
        text,
        classification,
    }
}

/// Removes one leading fence line (with any info string) and one trailing fence
pub fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_leading = match LEADING_FENCE.find(trimmed) {
        Some(m) => &trimmed[m.end()..],
        None => trimmed,
    };
    let without_trailing = without_leading
        .strip_suffix(TRAILING_FENCE)
        .unwrap_or(without_leading);
    without_trailing.trim().to_string()
}

/// Classifies already stripped text
pub fn classify(text: &str) -> Classification {
    if looks_structured(text) {
        return Classification::Structured;
    }

    let window = prefix_chars(text, INDICATOR_WINDOW);
    let long_enough = text.chars().count() > MIN_CODE_LENGTH;
    let is_code = CODE_INDICATORS
        .iter()
        .any(|indicator| text.starts_with(indicator) || (long_enough && window.contains(indicator)));

    if is_code {
        Classification::Code
    } else {
        Classification::Prose
    }
}

fn looks_structured(text: &str) -> bool {
    (text.starts_with('{') && text.ends_with('}')) || (text.starts_with('[') && text.ends_with(']'))
}

fn prefix_chars(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
