use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::AppState;
use crate::contexts::{AgentRunner, UpstreamRejection};
use crate::data::Report;
use crate::error::ApiError;
use crate::postprocess::{Classification, CleanedCompletion, clean_completion};
use crate::render::render_report;
use crate::spec_parser::parse_spec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiRequest {
    pub openapi_spec: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeResponse {
    pub code: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /generate: requirements text to rendered manual test cases
pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<CodeResponse>, ApiError> {
    let Json(request) = body?;
    require_text(&request.text, "text")?;
    info!(length = request.text.len(), "generating test cases from requirements");

    let cleaned = run_agent(&state, "generate_report", &request).await?;
    let report = decode_report(&cleaned)?;
    info!(cases = report.test_cases.len(), "rendering report");
    let code = render_report(&report)?;
    Ok(Json(CodeResponse { code }))
}

/// POST /lime: OpenAPI document to API tests
pub async fn generate_from_openapi(
    State(state): State<AppState>,
    body: Result<Json<OpenApiRequest>, JsonRejection>,
) -> Result<Json<CodeResponse>, ApiError> {
    let Json(request) = body?;
    if request.openapi_spec.is_empty() {
        return Err(ApiError::InvalidInput("openapi_spec must not be empty".to_string()));
    }
    info!(length = request.openapi_spec.len(), "generating API tests from OpenAPI document");

    let document = parse_spec(&request.openapi_spec)?;
    let cleaned = run_agent(&state, "generate_from_openapi", &json!({ "openapi_spec": document })).await?;
    if cleaned.classification != Classification::Code {
        warn!(classification = ?cleaned.classification, "model did not return source code");
    }
    Ok(Json(CodeResponse { code: cleaned.text }))
}

/// POST /blue: optimizes an existing test suite
pub async fn optimize_tests(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<CodeResponse>, ApiError> {
    let Json(request) = body?;
    require_text(&request.text, "text")?;
    info!(length = request.text.len(), "optimizing test code");

    let cleaned = run_agent(&state, "optimize_tests", &request).await?;
    if cleaned.classification != Classification::Code {
        warn!(classification = ?cleaned.classification, "model did not return source code");
    }
    Ok(Json(CodeResponse { code: cleaned.text }))
}

/// POST /purple: textual review of a test suite
pub async fn review_tests(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<CodeResponse>, ApiError> {
    let Json(request) = body?;
    require_text(&request.text, "text")?;
    info!(length = request.text.len(), "reviewing test code");

    let cleaned = run_agent(&state, "review_tests", &request).await?;
    Ok(Json(CodeResponse { code: cleaned.text }))
}

fn require_text(text: &str, field: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

async fn run_agent<T: Serialize>(
    state: &AppState,
    agent: &str,
    input: T,
) -> Result<CleanedCompletion, ApiError> {
    let result = AgentRunner::new(
        agent,
        input,
        state.agent_registry.as_ref(),
        state.model_registry.as_ref(),
    )
    .run(state.client.as_ref())
    .await?;

    let cleaned = clean_completion(&result.output);
    debug!(
        agent,
        raw_length = result.output.len(),
        cleaned_length = cleaned.text.len(),
        classification = ?cleaned.classification,
        "completion cleaned"
    );
    if cleaned.text.is_empty() {
        return Err(ApiError::UpstreamCall(
            "Generation service returned an empty response".to_string(),
        ));
    }
    Ok(cleaned)
}

/// Turns the structured-output completion into a report
fn decode_report(cleaned: &CleanedCompletion) -> Result<Report, ApiError> {
    let value: Value = serde_json::from_str(&cleaned.text).map_err(|e| {
        let what = match cleaned.classification {
            Classification::Code => "source code",
            Classification::Structured => "malformed JSON",
            Classification::Prose => "free text",
        };
        ApiError::ResponseDecode(format!(
            "The model returned {} instead of a JSON report ({}). Rephrase the request.",
            what, e
        ))
    })?;

    if let Some(rejection) = UpstreamRejection::from_value(&value) {
        warn!(code = ?rejection.code, message = %rejection.message, "generation service returned an error object");
        return Err(ApiError::UpstreamRejected(rejection.friendly_message()));
    }

    if value.get("testCases").is_none() {
        let shape = match &value {
            Value::Object(map) => format!("keys {:?}", map.keys().collect::<Vec<_>>()),
            other => json_kind(other).to_string(),
        };
        warn!(%shape, "model response has no testCases");
        return Err(ApiError::ResponseDecode(
            "The model response does not contain the expected structure. Rephrase the request."
                .to_string(),
        ));
    }

    Report::from_value(value).map_err(|e| {
        ApiError::ResponseDecode(format!("The model response is not a valid report: {}", e))
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaned(text: &str) -> CleanedCompletion {
        clean_completion(text)
    }

    #[test]
    fn test_decode_report_success() {
        let text = r#"{"testCases": [{"test": {"owner": "o", "feature": "f", "story": "s",
            "test_type": "t", "priority": "LOW", "tags": ["x"]}, "steps": []}]}"#;
        let report = decode_report(&cleaned(text)).unwrap();
        assert_eq!(report.test_cases.len(), 1);
    }

    #[test]
    fn test_decode_report_names_source_code() {
        let err = decode_report(&cleaned("import allure\n\nclass X:\n    pass")).unwrap_err();
        assert!(matches!(&err, ApiError::ResponseDecode(msg) if msg.contains("source code")));
    }

    #[test]
    fn test_decode_report_missing_structure() {
        let err = decode_report(&cleaned(r#"{"cases": []}"#)).unwrap_err();
        assert!(matches!(&err, ApiError::ResponseDecode(msg) if msg.contains("expected structure")));
    }

    #[test]
    fn test_decode_report_invalid_report() {
        let text = r#"{"testCases": [{"test": {"owner": "o", "feature": "f", "story": "s",
            "test_type": "t", "priority": "LOW", "tags": []}, "steps": []}]}"#;
        let err = decode_report(&cleaned(text)).unwrap_err();
        assert!(matches!(&err, ApiError::ResponseDecode(msg) if msg.contains("not a valid report")));
    }

    #[test]
    fn test_decode_report_error_object() {
        let err = decode_report(&cleaned(r#"{"error": {"message": "output did not conform"}}"#))
            .unwrap_err();
        assert!(matches!(&err, ApiError::UpstreamRejected(msg) if msg.contains("required format")));
    }

    #[test]
    fn test_require_text() {
        assert!(require_text("hello", "text").is_ok());
        assert!(matches!(require_text(" \n", "text"), Err(ApiError::InvalidInput(_))));
    }
}
