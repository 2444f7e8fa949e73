//! Report model decoded from structured generation output.
//!
//! Every value here is immutable once decoded. The only invariant checked at
//! construction is that a test carries at least one tag; all free text is kept
//! verbatim and escaped later by the renderer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Label holding the issue tracker URL of a test.
pub const JIRA_LINK_LABEL: &str = "jira_link";
/// Label holding the display name of the issue tracker link.
pub const JIRA_NAME_LABEL: &str = "jira_name";

/// Errors raised while building report entities
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("tags must contain at least one item")]
    EmptyTags,
}

/// Test priority as understood by Allure TestOps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Critical,
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "CRITICAL",
            Priority::Normal => "NORMAL",
            Priority::Low => "LOW",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-empty, ordered list of tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn new(tags: Vec<String>) -> Result<Self, ValidationError> {
        if tags.is_empty() {
            return Err(ValidationError::EmptyTags);
        }
        Ok(Self(tags))
    }

    /// The primary tag. Always present.
    pub fn first(&self) -> &str {
        &self.0[0]
    }
}

impl TryFrom<Vec<String>> for Tags {
    type Error = ValidationError;

    fn try_from(tags: Vec<String>) -> Result<Self, Self::Error> {
        Tags::new(tags)
    }
}

impl From<Tags> for Vec<String> {
    fn from(tags: Tags) -> Self {
        tags.0
    }
}

fn default_manual_mark() -> bool {
    true
}

/// Metadata of a single test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    pub owner: String,
    pub feature: String,
    pub story: String,
    pub test_type: String,
    #[serde(default = "default_manual_mark")]
    pub manual_mark: bool,
    #[serde(default)]
    pub title: Option<String>,
    pub priority: Priority,
    pub tags: Tags,
    /// Free-form labels; values may be any JSON value
    #[serde(default, deserialize_with = "nullable")]
    pub labels: BTreeMap<String, Value>,
}

impl Test {
    /// Builds a test, rejecting an empty tag list
    pub fn new(
        owner: impl Into<String>,
        feature: impl Into<String>,
        story: impl Into<String>,
        test_type: impl Into<String>,
        title: Option<String>,
        priority: Priority,
        tags: Vec<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            owner: owner.into(),
            feature: feature.into(),
            story: story.into(),
            test_type: test_type.into(),
            manual_mark: true,
            title,
            priority,
            tags: Tags::new(tags)?,
            labels: BTreeMap::new(),
        })
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    /// Returns a label as text; missing and null labels read as empty
    pub fn label(&self, name: &str) -> Cow<'_, str> {
        match self.labels.get(name) {
            None | Some(Value::Null) => Cow::Borrowed(""),
            Some(Value::String(s)) => Cow::Borrowed(s),
            Some(other) => Cow::Owned(other.to_string()),
        }
    }
}

/// One scoped step of a test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub step_name: String,
    #[serde(default)]
    pub step_action: String,
    #[serde(default, deserialize_with = "nullable")]
    pub attachments: Vec<String>,
}

impl Step {
    pub fn new(step_name: impl Into<String>, step_action: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            step_action: step_action.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, path: impl Into<String>) -> Self {
        self.attachments.push(path.into());
        self
    }
}

// Models emit `"attachments": null` as often as they omit the key.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A test together with its ordered steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub test: Test,
    pub steps: Vec<Step>,
}

/// The full structured description of a generated test suite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    #[serde(rename = "testCases")]
    pub test_cases: Vec<TestCase>,
}

impl Report {
    /// Decodes and validates a report from a JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_test_json(tags: serde_json::Value) -> serde_json::Value {
        json!({
            "owner": "qa",
            "feature": "Auth",
            "story": "Login",
            "test_type": "Smoke",
            "title": "Login works",
            "priority": "CRITICAL",
            "tags": tags,
            "labels": {"jira_link": "https://jira/ABC-1", "jira_name": "ABC-1"}
        })
    }

    #[test]
    fn test_empty_tags_rejected_by_constructor() {
        let result = Test::new("qa", "Auth", "Login", "Smoke", None, Priority::Low, vec![]);
        assert_eq!(result.unwrap_err(), ValidationError::EmptyTags);
    }

    #[test]
    fn test_empty_tags_rejected_when_decoding() {
        let payload = json!({
            "testCases": [{"test": sample_test_json(json!([])), "steps": []}]
        });
        let err = Report::from_value(payload).unwrap_err();
        assert!(err.to_string().contains("tags must contain at least one item"));
    }

    #[test]
    fn test_decode_full_report() {
        let payload = json!({
            "testCases": [{
                "test": sample_test_json(json!(["CRITICAL", "smoke"])),
                "steps": [
                    {"step_name": "Arrange: open page", "step_action": "open", "attachments": ["shots/a.png"]},
                    {"step_name": "Act: submit", "step_action": "click", "attachments": null},
                    {"step_name": "Assert: greeting", "step_action": "check"}
                ]
            }]
        });

        let report = Report::from_value(payload).unwrap();
        assert_eq!(report.test_cases.len(), 1);

        let case = &report.test_cases[0];
        assert_eq!(case.test.priority, Priority::Critical);
        assert_eq!(case.test.tags.first(), "CRITICAL");
        assert!(case.test.manual_mark);
        assert_eq!(case.test.label(JIRA_NAME_LABEL), "ABC-1");
        assert_eq!(case.steps[0].attachments, vec!["shots/a.png".to_string()]);
        assert!(case.steps[1].attachments.is_empty());
        assert!(case.steps[2].attachments.is_empty());
    }

    #[test]
    fn test_unknown_priority_rejected() {
        let mut test = sample_test_json(json!(["x"]));
        test["priority"] = json!("BLOCKER");
        let payload = json!({"testCases": [{"test": test, "steps": []}]});
        assert!(Report::from_value(payload).is_err());
    }

    #[test]
    fn test_missing_label_reads_as_empty() {
        let test = Test::new("qa", "Auth", "Login", "Smoke", None, Priority::Normal, vec!["a".into()])
            .unwrap();
        assert_eq!(test.label(JIRA_LINK_LABEL), "");
    }

    #[test]
    fn test_non_string_labels_are_stringified() {
        let mut test = sample_test_json(json!(["x"]));
        test["labels"] = json!({"jira_link": null, "jira_id": 42, "flaky": true, "jira_name": "ABC-2"});
        let payload = json!({"testCases": [{"test": test, "steps": []}]});

        let report = Report::from_value(payload).unwrap();
        let test = &report.test_cases[0].test;
        assert_eq!(test.label(JIRA_LINK_LABEL), "");
        assert_eq!(test.label("jira_id"), "42");
        assert_eq!(test.label("flaky"), "true");
        assert_eq!(test.label(JIRA_NAME_LABEL), "ABC-2");
    }

    #[test]
    fn test_null_labels_read_as_empty_map() {
        let mut test = sample_test_json(json!(["x"]));
        test["labels"] = Value::Null;
        let payload = json!({"testCases": [{"test": test, "steps": []}]});
        let report = Report::from_value(payload).unwrap();
        assert!(report.test_cases[0].test.labels.is_empty());
    }

    #[test]
    fn test_serialize_uses_wire_names() {
        let test = Test::new("qa", "Auth", "Login", "Smoke", None, Priority::Normal, vec!["a".into()])
            .unwrap();
        let report = Report {
            test_cases: vec![TestCase { test, steps: vec![] }],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("testCases").is_some());
        assert_eq!(value["testCases"][0]["test"]["priority"], "NORMAL");
        assert_eq!(value["testCases"][0]["test"]["tags"], json!(["a"]));
    }
}
