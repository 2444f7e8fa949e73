use std::fmt::Write;

use serde_json::Value;

use super::{RenderError, class_name, escape_string, sanitize_identifier};

const HTTP_METHODS: &[&str] = &["get", "post", "put", "delete", "patch"];
const DEFAULT_BASE_URL: &str = "https://api.example.com";
const DEFAULT_TAG: &str = "API";

const PREAMBLE: &str = r#"import allure
import pytest
from pytest import mark
import requests
from typing import Optional, Dict, Any


"#;

struct Operation<'a> {
    path: &'a str,
    method: String,
    operation_id: String,
    summary: String,
    spec: &'a serde_json::Map<String, Value>,
}

/// Renders a request-level pytest skeleton for every operation of an OpenAPI document
///
/// Operations are grouped into one class per first tag, in document order.
pub fn render_openapi_scaffold(document: &Value) -> Result<String, RenderError> {
    let document = document.as_object().ok_or(RenderError::NotAnObject)?;

    let api_title = document
        .get("info")
        .and_then(|info| info.get("title"))
        .and_then(Value::as_str)
        .unwrap_or("API");
    let base_url = document
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|servers| servers.first())
        .and_then(|server| server.get("url"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_BASE_URL);

    let mut out = String::from(PREAMBLE);
    for (tag, operations) in group_by_tag(document) {
        writeln!(out, r#"@allure.feature("{}")"#, escape_string(&tag))?;
        writeln!(out, r#"@allure.suite("{}")"#, escape_string(api_title))?;
        writeln!(out, "class {}:", class_name("", &tag))?;
        writeln!(out)?;
        for operation in &operations {
            render_operation(&mut out, operation, base_url)?;
        }
    }
    Ok(out)
}

fn group_by_tag(document: &serde_json::Map<String, Value>) -> Vec<(String, Vec<Operation<'_>>)> {
    let mut groups: Vec<(String, Vec<Operation<'_>>)> = Vec::new();
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return groups;
    };

    for (path, path_item) in paths {
        let Some(path_item) = path_item.as_object() else {
            continue;
        };
        for (method, spec) in path_item {
            let method = method.to_lowercase();
            if !HTTP_METHODS.contains(&method.as_str()) {
                continue;
            }
            let Some(spec) = spec.as_object() else {
                continue;
            };

            let operation_id = spec
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!(
                        "{}_{}",
                        method,
                        path.replace('/', "_").replace(['{', '}'], "")
                    )
                });
            let summary = spec
                .get("summary")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| operation_id.clone());
            let tag = spec
                .get("tags")
                .and_then(Value::as_array)
                .and_then(|tags| tags.first())
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_TAG)
                .to_string();

            let operation = Operation {
                path: path.as_str(),
                method,
                operation_id,
                summary,
                spec,
            };
            match groups.iter_mut().find(|(name, _)| *name == tag) {
                Some((_, operations)) => operations.push(operation),
                None => groups.push((tag, vec![operation])),
            }
        }
    }
    groups
}

fn parameters_in<'a>(operation: &'a Operation<'_>, location: &str) -> Vec<&'a serde_json::Map<String, Value>> {
    operation
        .spec
        .get("parameters")
        .and_then(Value::as_array)
        .map(|params| {
            params
                .iter()
                .filter_map(Value::as_object)
                .filter(|p| p.get("in").and_then(Value::as_str) == Some(location))
                .collect()
        })
        .unwrap_or_default()
}

fn render_operation(out: &mut String, operation: &Operation<'_>, base_url: &str) -> std::fmt::Result {
    let method_upper = operation.method.to_uppercase();
    let test_name = sanitize_identifier(&format!(
        "test_{}",
        operation.operation_id.to_lowercase().replace(['-', ' '], "_")
    ));
    let url = escape_string(&format!("{}{}", base_url, operation.path));

    writeln!(out, r#"    @allure.story("{}")"#, escape_string(&operation.summary))?;
    writeln!(out, r#"    @allure.title("{}")"#, escape_string(&operation.summary))?;
    writeln!(out, "    def {}(self):", test_name)?;
    writeln!(
        out,
        r#"        """Test for {} {}""""#,
        method_upper,
        operation.path.replace('"', "'")
    )?;
    writeln!(
        out,
        r#"        with allure.step("Send {} {}"):"#,
        method_upper,
        escape_string(operation.path)
    )?;

    let path_params = parameters_in(operation, "path");
    if path_params.is_empty() {
        writeln!(out, r#"            url = "{}""#, url)?;
    } else {
        writeln!(out, "            # Fill path parameters before running")?;
        writeln!(out, "            path_params = {{")?;
        for param in &path_params {
            let name = param.get("name").and_then(Value::as_str).unwrap_or_default();
            writeln!(out, r#"                "{}": None,"#, escape_string(name))?;
        }
        writeln!(out, "            }}")?;
        writeln!(out, r#"            url = "{}".format(**path_params)"#, url)?;
    }

    let query_params = parameters_in(operation, "query");
    if query_params.is_empty() {
        writeln!(out, "            params = None")?;
    } else {
        writeln!(out, "            params = {{}}")?;
        for param in &query_params {
            render_query_param(out, param)?;
        }
    }

    let has_body = matches!(operation.method.as_str(), "post" | "put" | "patch")
        && operation.spec.get("requestBody").is_some_and(|body| !body.is_null());
    if has_body {
        writeln!(out, "            json_data = {{}}")?;
        writeln!(out, "            # Fill json_data according to the requestBody schema")?;
        writeln!(
            out,
            "            response = requests.{}(url, json=json_data, params=params)",
            operation.method
        )?;
    } else {
        writeln!(out, "            response = requests.{}(url, params=params)", operation.method)?;
    }
    writeln!(out)?;

    writeln!(out, r#"        with allure.step("Check status code"):"#)?;
    let statuses: Vec<u16> = operation
        .spec
        .get("responses")
        .and_then(Value::as_object)
        .map(|responses| {
            [200u16, 201, 204]
                .into_iter()
                .filter(|code| responses.contains_key(&code.to_string()))
                .collect()
        })
        .unwrap_or_default();
    match statuses.as_slice() {
        [] => writeln!(
            out,
            r#"            assert response.status_code < 400, f"Expected a successful status, got {{response.status_code}}""#
        )?,
        [single] => writeln!(
            out,
            r#"            assert response.status_code == {single}, f"Expected status {single}, got {{response.status_code}}""#
        )?,
        many => {
            let list = many.iter().map(u16::to_string).collect::<Vec<_>>().join(", ");
            writeln!(
                out,
                r#"            assert response.status_code in [{list}], f"Expected one of [{list}], got {{response.status_code}}""#
            )?
        }
    }
    writeln!(out)?;

    writeln!(out, r#"        with allure.step("Check response structure"):"#)?;
    writeln!(out, "            if response.status_code != 204:")?;
    writeln!(out, "                response_json = response.json()")?;
    writeln!(
        out,
        r#"                assert isinstance(response_json, (dict, list)), "Response must be a JSON object or array""#
    )?;
    writeln!(out)?;
    writeln!(out)?;
    Ok(())
}

fn render_query_param(out: &mut String, param: &serde_json::Map<String, Value>) -> std::fmt::Result {
    let name = escape_string(param.get("name").and_then(Value::as_str).unwrap_or_default());
    let schema = param.get("schema");
    let param_type = schema
        .and_then(|s| s.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("string");

    match schema.and_then(|s| s.get("default")).filter(|d| !d.is_null()) {
        Some(Value::Bool(b)) if param_type == "boolean" => {
            writeln!(out, r#"            params["{}"] = {}"#, name, if *b { "True" } else { "False" })
        }
        Some(Value::Number(n)) if matches!(param_type, "integer" | "number") => {
            writeln!(out, r#"            params["{}"] = {}"#, name, n)
        }
        Some(Value::String(s)) => {
            writeln!(out, r#"            params["{}"] = "{}""#, name, escape_string(s))
        }
        Some(other) => {
            writeln!(out, r#"            params["{}"] = "{}""#, name, escape_string(&other.to_string()))
        }
        None => {
            let description = param
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .replace(['\n', '\r'], " ");
            writeln!(out, r#"            # params["{}"] = "value"  # {}"#, name, description)
        }
    }
}
