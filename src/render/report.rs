use std::fmt::Write;

use tracing::error;

use super::{RenderError, class_name, escape_string, function_name};
use crate::data::{JIRA_LINK_LABEL, JIRA_NAME_LABEL, Report, Step, TestCase};

const PREAMBLE: &str = r#"import allure
import pytest
from pytest import mark
from contextlib import contextmanager


@contextmanager
def allure_step(step_name: str):
    """Context manager wrapping an Allure step"""
    with allure.step(step_name):
        yield


"#;

/// Renders a report into a pytest module annotated for Allure TestOps
///
/// The output depends only on the report contents and their order.
pub fn render_report(report: &Report) -> Result<String, RenderError> {
    let mut out = String::from(PREAMBLE);
    for (index, case) in report.test_cases.iter().enumerate() {
        if let Err(e) = render_case(&mut out, case) {
            error!(case = index, error = %e, "failed to render test case");
            return Err(e.into());
        }
    }
    Ok(out)
}

fn render_case(out: &mut String, case: &TestCase) -> std::fmt::Result {
    let test = &case.test;

    writeln!(out, "@allure.manual")?;
    writeln!(out)?;
    writeln!(out, r#"@allure.label("owner", "{}")"#, escape_string(&test.owner))?;
    writeln!(out, r#"@allure.feature("{}")"#, escape_string(&test.feature))?;
    writeln!(out, r#"@allure.story("{}")"#, escape_string(&test.story))?;
    writeln!(out, r#"@allure.suite("{}")"#, escape_string(&test.test_type))?;
    writeln!(out, "@mark.manual")?;
    writeln!(out, "class {}:", class_name(&test.test_type, &test.feature))?;
    writeln!(out)?;

    let title = test.title.as_deref().filter(|t| !t.is_empty());
    if let Some(title) = title {
        writeln!(out, r#"    @allure.title("{}")"#, escape_string(title))?;
    }

    let jira_link = test.label(JIRA_LINK_LABEL);
    if !jira_link.is_empty() {
        writeln!(
            out,
            r#"    @allure.link("{}", name="{}")"#,
            escape_string(&jira_link),
            escape_string(&test.label(JIRA_NAME_LABEL))
        )?;
    }

    let main_tag = match test.tags.first() {
        "" => test.priority.as_str(),
        tag => tag,
    };
    writeln!(out, r#"    @allure.tag("{}")"#, escape_string(main_tag))?;
    writeln!(
        out,
        r#"    @allure.label("priority", "{}")"#,
        escape_string(test.priority.as_str())
    )?;
    writeln!(out, "    def {}(self) -> None:", function_name(title))?;

    if case.steps.is_empty() {
        writeln!(out, "        pass")?;
    }
    for step in &case.steps {
        render_step(out, step)?;
    }

    writeln!(out)?;
    writeln!(out)?;
    Ok(())
}

fn render_step(out: &mut String, step: &Step) -> std::fmt::Result {
    writeln!(out, r#"        with allure_step("{}"):"#, escape_string(&step.step_name))?;

    if step.attachments.is_empty() {
        writeln!(out, "            pass")?;
        return Ok(());
    }

    for attachment in &step.attachments {
        let display_name = attachment.rsplit('/').next().unwrap_or(attachment.as_str());
        writeln!(out, "            allure.attach.file(")?;
        writeln!(out, r#"                "{}","#, escape_string(attachment))?;
        writeln!(out, r#"                name="{}","#, escape_string(display_name))?;
        writeln!(out, "                attachment_type=allure.attachment_type.PNG,")?;
        writeln!(out, "            )")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Priority, Test};

    fn case(test: Test, steps: Vec<Step>) -> TestCase {
        TestCase { test, steps }
    }

    fn login_test() -> Test {
        Test::new(
            "alice",
            "User Profile",
            "Sign in",
            "Smoke Test",
            Some("Login — Success".to_string()),
            Priority::Critical,
            vec!["CRITICAL".to_string(), "auth".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_preamble_emitted_once() {
        let report = Report {
            test_cases: vec![
                case(login_test(), vec![]),
                case(login_test(), vec![]),
            ],
        };
        let code = render_report(&report).unwrap();
        assert!(code.starts_with("import allure\nimport pytest\n"));
        assert_eq!(code.matches("def allure_step(step_name: str):").count(), 1);
        assert_eq!(code.matches("class SmokeTestTests:").count(), 2);
    }

    #[test]
    fn test_empty_report_renders_preamble_only() {
        let code = render_report(&Report { test_cases: vec![] }).unwrap();
        assert_eq!(code, PREAMBLE);
    }

    #[test]
    fn test_full_case_layout() {
        let test = login_test()
            .with_label(JIRA_LINK_LABEL, "https://jira.example.com/browse/QA-7")
            .with_label(JIRA_NAME_LABEL, "QA-7");
        let steps = vec![
            Step::new("Arrange: open \"login\" page", "open"),
            Step::new("Act: submit", "click").with_attachment("screens/form/submit.png"),
        ];
        let code = render_report(&Report { test_cases: vec![case(test, steps)] }).unwrap();

        let expected = r#"@allure.manual

@allure.label("owner", "alice")
@allure.feature("User Profile")
@allure.story("Sign in")
@allure.suite("Smoke Test")
@mark.manual
class SmokeTestTests:

    @allure.title("Login — Success")
    @allure.link("https://jira.example.com/browse/QA-7", name="QA-7")
    @allure.tag("CRITICAL")
    @allure.label("priority", "CRITICAL")
    def test_login___success(self) -> None:
        with allure_step("Arrange: open \"login\" page"):
            pass
        with allure_step("Act: submit"):
            allure.attach.file(
                "screens/form/submit.png",
                name="submit.png",
                attachment_type=allure.attachment_type.PNG,
            )


"#;
        assert_eq!(&code[PREAMBLE.len()..], expected);
    }

    #[test]
    fn test_case_without_steps_has_pass_body() {
        let code = render_report(&Report {
            test_cases: vec![case(login_test(), vec![])],
        })
        .unwrap();
        let def = "    def test_login___success(self) -> None:\n";
        let body = &code[code.find(def).unwrap() + def.len()..];
        assert_eq!(body, "        pass\n\n\n");
    }

    #[test]
    fn test_null_jira_link_is_omitted() {
        let payload = serde_json::json!({"testCases": [{
            "test": {
                "owner": "alice", "feature": "Cart", "story": "Add", "test_type": "Smoke",
                "title": "Adds item", "priority": "NORMAL", "tags": ["NORMAL"],
                "labels": {"jira_link": null, "jira_name": 17}
            },
            "steps": []
        }]});
        let code = render_report(&Report::from_value(payload).unwrap()).unwrap();
        assert!(!code.contains("@allure.link"));
    }

    #[test]
    fn test_jira_link_omitted_without_link() {
        let without = render_report(&Report {
            test_cases: vec![case(login_test(), vec![])],
        })
        .unwrap();
        assert!(!without.contains("@allure.link"));

        let empty = login_test()
            .with_label(JIRA_LINK_LABEL, "")
            .with_label(JIRA_NAME_LABEL, "QA-1");
        let code = render_report(&Report { test_cases: vec![case(empty, vec![])] }).unwrap();
        assert!(!code.contains("@allure.link"));
    }

    #[test]
    fn test_untitled_case_uses_fallback_names() {
        let test = Test::new("bob", "User Profile", "Edit", "", None, Priority::Low, vec!["regress".into()])
            .unwrap();
        let code = render_report(&Report { test_cases: vec![case(test, vec![])] }).unwrap();
        assert!(code.contains("class UserProfileTests:"));
        assert!(code.contains("    def test_function(self) -> None:"));
        assert!(!code.contains("@allure.title"));
        assert!(code.contains(r#"@allure.tag("regress")"#));
        assert!(code.contains(r#"@allure.label("priority", "LOW")"#));
    }

    #[test]
    fn test_blank_first_tag_falls_back_to_priority() {
        let test = Test::new("bob", "F", "S", "T", None, Priority::Normal, vec![String::new()]).unwrap();
        let code = render_report(&Report { test_cases: vec![case(test, vec![])] }).unwrap();
        assert!(code.contains(r#"@allure.tag("NORMAL")"#));
    }

    #[test]
    fn test_free_text_is_escaped() {
        let test = Test::new(
            "o\"wner",
            "feat\\ure",
            "multi\nline",
            "Tab\tType",
            Some("Quote \"me\"".to_string()),
            Priority::Normal,
            vec!["t\"ag".into()],
        )
        .unwrap();
        let code = render_report(&Report { test_cases: vec![case(test, vec![])] }).unwrap();
        assert!(code.contains(r#"@allure.label("owner", "o\"wner")"#));
        assert!(code.contains(r#"@allure.feature("feat\\ure")"#));
        assert!(code.contains(r#"@allure.story("multi\nline")"#));
        assert!(code.contains(r#"@allure.suite("Tab\tType")"#));
        assert!(code.contains(r#"@allure.title("Quote \"me\"")"#));
        assert!(code.contains(r#"@allure.tag("t\"ag")"#));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let report = Report {
            test_cases: vec![
                case(login_test(), vec![Step::new("Arrange", "a").with_attachment("x.png")]),
                case(login_test().with_label(JIRA_LINK_LABEL, "l"), vec![Step::new("Assert", "b")]),
            ],
        };
        let first = render_report(&report).unwrap();
        let second = render_report(&report.clone()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cases_emitted_in_order() {
        let second = Test::new("o", "Second", "s", "", None, Priority::Low, vec!["t".into()]).unwrap();
        let report = Report {
            test_cases: vec![case(login_test(), vec![]), case(second, vec![])],
        };
        let code = render_report(&report).unwrap();
        let first_pos = code.find("class SmokeTestTests:").unwrap();
        let second_pos = code.find("class SecondTests:").unwrap();
        assert!(first_pos < second_pos);
    }
}
