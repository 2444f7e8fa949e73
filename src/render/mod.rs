//! Python source generation for pytest + Allure TestOps suites
//!
//! `report` turns a validated [`Report`](crate::data::Report) into a manual
//! test module; `openapi` scaffolds request-level tests from an OpenAPI
//! document without asking the generation service.

mod openapi;
mod report;

pub use openapi::render_openapi_scaffold;
pub use report::render_report;

use thiserror::Error;

/// Errors raised while assembling generated source
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write generated source: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("OpenAPI document is not an object")]
    NotAnObject,
}

/// Escapes a value for embedding inside a double-quoted Python string literal
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Derives the test class name: `Smoke Test` -> `SmokeTestTests`
pub fn class_name(test_type: &str, feature: &str) -> String {
    let base = if test_type.is_empty() { feature } else { test_type };
    let mut name: String = base.chars().filter(|c| *c != ' ' && *c != '-').collect();
    name.push_str("Tests");
    name
}

/// Derives a test function name from an optional title
///
/// `Login — Success` becomes `test_login___success`: lower-cased, spaces and
/// hyphens turned into underscores, then anything that is not alphanumeric or
/// an underscore turned into an underscore too.
pub fn function_name(title: Option<&str>) -> String {
    match title.filter(|t| !t.is_empty()) {
        Some(title) => sanitize_identifier(&format!("test_{}", title.to_lowercase())),
        None => "test_function".to_string(),
    }
}

/// Maps every character outside `[alphanumeric_]` to `_`
pub(crate) fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
