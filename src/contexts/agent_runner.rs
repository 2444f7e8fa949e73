use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::contexts::chat_client::{ChatCompletion, ChatMessage, ChatRequest, ResponseFormat};

/// Errors that can occur during agent population
#[derive(Debug, Error)]
pub enum PopulateError {
    #[error("Required placeholder '{0}' could not be resolved")]
    MissingMandatoryPlaceholder(String),

    #[error("Invalid path '{0}' in placeholder")]
    InvalidPlaceholderPath(String),

    #[error("Agent '{0}' not found in registry")]
    AgentNotFound(String),

    #[error("Agent specification is invalid: {0}")]
    InvalidSpecification(String),
}

/// Errors that can occur during agent execution
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Model for agent '{0}' not found")]
    ModelNotFound(String),

    #[error("Agent model registry is invalid: {0}")]
    InvalidRegistry(String),

    #[error("Generation service did not answer within {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Generation service call failed: {0}")]
    Upstream(String),

    #[error("Generation service returned an empty response")]
    EmptyResponse,
}

/// Errors that can occur in the agent runner
#[derive(Debug, Error)]
pub enum AgentRunnerError {
    #[error(transparent)]
    Populate(#[from] PopulateError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// An agent template as stored in the registry, placeholders unresolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTemplate {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// A populated agent specification ready for execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpecification {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// The result of executing an agent
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: String,
    pub finish_reason: Option<String>,
}

impl ExecutionResult {
    /// True when the service stopped because it ran out of tokens
    pub fn is_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// Sampling parameters sent with every completion request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.95,
            presence_penalty: 0.0,
            max_tokens: 8000,
        }
    }
}

/// A model that can execute an agent
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    pub sampling: SamplingParams,
    /// Ask the service for a JSON object instead of free text
    pub json_output: bool,
}

/// Trait for loading agent specifications by name
pub trait AgentRegistry: Send + Sync {
    /// Load an agent specification template by agent name
    fn get_specification(&self, agent_name: &str) -> Result<AgentTemplate, PopulateError>;
}

/// Trait for resolving execution models by agent name
pub trait AgentModelRegistry: Send + Sync {
    /// Get the model to use for a given agent
    fn get_model(&self, agent_name: &str) -> Result<Model, ExecutionError>;
}

/// Agent Runner context: populates an agent template with request input and
/// executes it once against the generation service
pub struct AgentRunner<'a, T, R, M>
where
    T: Serialize,
    R: AgentRegistry + ?Sized,
    M: AgentModelRegistry + ?Sized,
{
    /// The agent name (role player)
    agent: String,
    /// Input data for template population
    input: T,
    /// Registry for loading agent specifications
    agent_registry: &'a R,
    /// Registry for resolving execution models
    agent_model_registry: &'a M,
}

impl<'a, T, R, M> AgentRunner<'a, T, R, M>
where
    T: Serialize,
    R: AgentRegistry + ?Sized,
    M: AgentModelRegistry + ?Sized,
{
    pub fn new(
        agent: impl Into<String>,
        input: T,
        agent_registry: &'a R,
        agent_model_registry: &'a M,
    ) -> Self {
        Self {
            agent: agent.into(),
            input,
            agent_registry,
            agent_model_registry,
        }
    }

    /// Role method: agent.populate
    ///
    /// Fills the placeholders of both prompts from the input.
    fn populate(&self, template: &AgentTemplate) -> Result<AgentSpecification, PopulateError> {
        let input_json = serde_json::to_value(&self.input)
            .map_err(|e| PopulateError::InvalidSpecification(e.to_string()))?;

        Ok(AgentSpecification {
            system_prompt: replace_placeholders(&template.system_prompt, &input_json)?,
            user_prompt: replace_placeholders(&template.user_prompt, &input_json)?,
        })
    }

    /// Role method: agent.execute
    ///
    /// Single call to the generation service, no retries.
    async fn execute(
        &self,
        specification: AgentSpecification,
        model: &Model,
        client: &dyn ChatCompletion,
    ) -> Result<ExecutionResult, ExecutionError> {
        let request = ChatRequest {
            model: model.name.clone(),
            messages: vec![
                ChatMessage::system(specification.system_prompt),
                ChatMessage::user(specification.user_prompt),
            ],
            temperature: model.sampling.temperature,
            top_p: model.sampling.top_p,
            presence_penalty: model.sampling.presence_penalty,
            max_tokens: model.sampling.max_tokens,
            response_format: model.json_output.then(ResponseFormat::json_object),
        };

        debug!(
            agent = %self.agent,
            model = %model.name,
            temperature = model.sampling.temperature,
            max_tokens = model.sampling.max_tokens,
            json_output = model.json_output,
            "calling generation service"
        );

        let completion = client.complete(request).await?;
        if completion.content.trim().is_empty() {
            return Err(ExecutionError::EmptyResponse);
        }

        let result = ExecutionResult {
            output: completion.content,
            finish_reason: completion.finish_reason,
        };
        if result.is_truncated() {
            warn!(
                agent = %self.agent,
                max_tokens = model.sampling.max_tokens,
                "completion was cut off by the token limit"
            );
        }
        debug!(agent = %self.agent, length = result.output.len(), "completion received");
        Ok(result)
    }

    /// Public function: run
    ///
    /// Resolves the template and model, populates, and executes once.
    pub async fn run(self, client: &dyn ChatCompletion) -> Result<ExecutionResult, AgentRunnerError> {
        let template = self.agent_registry.get_specification(&self.agent)?;
        let model = self.agent_model_registry.get_model(&self.agent)?;
        let specification = self.populate(&template)?;
        Ok(self.execute(specification, &model, client).await?)
    }
}

/// Replaces `{{input.path}}` placeholders in a template
///
/// Supports:
/// - Mandatory: {{input.prop_name}}
/// - Optional: {{input.prop_name?}}
/// - Nested: {{input.prop1.prop2}}
///
/// Substituted text is never rescanned, so user content containing braces is
/// inserted verbatim.
pub fn replace_placeholders(template: &str, input: &serde_json::Value) -> Result<String, PopulateError> {
    let mut result = template.to_string();
    let mut offset = 0;

    while let Some(start) = result[offset..].find("{{") {
        let start = offset + start;
        let Some(end_pos) = result[start..].find("}}") else {
            break;
        };
        let end = start + end_pos;

        let placeholder = result[start + 2..end].trim();
        let (path, is_optional) = match placeholder.strip_suffix('?') {
            Some(path) => (path, true),
            None => (placeholder, false),
        };

        let replacement = match resolve_path(input, path)? {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::Bool(b)) => b.to_string(),
            Some(other) => serde_json::to_string_pretty(other)
                .map_err(|e| PopulateError::InvalidSpecification(e.to_string()))?,
            None if is_optional => String::new(),
            None => return Err(PopulateError::MissingMandatoryPlaceholder(path.to_string())),
        };

        result.replace_range(start..end + 2, &replacement);
        offset = start + replacement.len();
    }

    Ok(result)
}

/// Resolves a dotted path such as `input.prop1.prop2`
fn resolve_path<'v>(
    value: &'v serde_json::Value,
    path: &str,
) -> Result<Option<&'v serde_json::Value>, PopulateError> {
    let mut parts = path.split('.');
    if parts.next() != Some("input") {
        return Err(PopulateError::InvalidPlaceholderPath(path.to_string()));
    }

    let mut current = value;
    for part in parts {
        match current.get(part) {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::chat_client::Completion;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Serialize)]
    struct TestInput {
        name: String,
        value: i32,
    }

    struct TestRegistry;

    impl AgentRegistry for TestRegistry {
        fn get_specification(&self, agent_name: &str) -> Result<AgentTemplate, PopulateError> {
            if agent_name == "missing" {
                return Err(PopulateError::AgentNotFound(agent_name.to_string()));
            }
            Ok(AgentTemplate {
                system_prompt: format!("Instructions for {}", agent_name),
                user_prompt: "Hello {{input.name}}, value {{input.value}}".to_string(),
            })
        }
    }

    struct TestModelRegistry {
        json_output: bool,
    }

    impl AgentModelRegistry for TestModelRegistry {
        fn get_model(&self, _agent_name: &str) -> Result<Model, ExecutionError> {
            Ok(Model {
                name: "test-model".to_string(),
                sampling: SamplingParams::default(),
                json_output: self.json_output,
            })
        }
    }

    struct RecordingClient {
        reply: String,
        finish_reason: Option<String>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl RecordingClient {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                finish_reason: Some("stop".to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatCompletion for RecordingClient {
        async fn complete(&self, request: ChatRequest) -> Result<Completion, ExecutionError> {
            self.seen.lock().unwrap().push(request);
            Ok(Completion {
                content: self.reply.clone(),
                finish_reason: self.finish_reason.clone(),
            })
        }
    }

    fn input() -> TestInput {
        TestInput {
            name: "Alice".to_string(),
            value: 100,
        }
    }

    #[tokio::test]
    async fn test_run_sends_populated_prompts() {
        let client = RecordingClient::replying("done");
        let models = TestModelRegistry { json_output: true };
        let runner = AgentRunner::new("test_agent", input(), &TestRegistry, &models);

        let result = runner.run(&client).await.unwrap();
        assert_eq!(result.output, "done");
        assert!(!result.is_truncated());

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let request = &seen[0];
        assert_eq!(request.model, "test-model");
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[0].content, "Instructions for test_agent");
        assert_eq!(request.messages[1].role, "user");
        assert_eq!(request.messages[1].content, "Hello Alice, value 100");
        assert_eq!(request.response_format, Some(ResponseFormat::json_object()));
    }

    #[tokio::test]
    async fn test_run_without_json_output() {
        let client = RecordingClient::replying("code");
        let models = TestModelRegistry { json_output: false };
        AgentRunner::new("test_agent", input(), &TestRegistry, &models)
            .run(&client)
            .await
            .unwrap();
        assert_eq!(client.seen.lock().unwrap()[0].response_format, None);
    }

    #[tokio::test]
    async fn test_blank_completion_is_an_error() {
        let client = RecordingClient::replying("  \n ");
        let models = TestModelRegistry { json_output: false };
        let err = AgentRunner::new("test_agent", input(), &TestRegistry, &models)
            .run(&client)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentRunnerError::Execution(ExecutionError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_truncated_completion_is_flagged() {
        let mut client = RecordingClient::replying("partial");
        client.finish_reason = Some("length".to_string());
        let models = TestModelRegistry { json_output: false };
        let result = AgentRunner::new("test_agent", input(), &TestRegistry, &models)
            .run(&client)
            .await
            .unwrap();
        assert!(result.is_truncated());
    }

    #[tokio::test]
    async fn test_unknown_agent_never_calls_service() {
        let client = RecordingClient::replying("unused");
        let models = TestModelRegistry { json_output: false };
        let err = AgentRunner::new("missing", input(), &TestRegistry, &models)
            .run(&client)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentRunnerError::Populate(PopulateError::AgentNotFound(_))));
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_placeholder_replacement_optional() {
        let input = json!({"name": "Bob"});
        assert_eq!(replace_placeholders("Name: {{input.name?}}", &input).unwrap(), "Name: Bob");
        assert_eq!(replace_placeholders("Age: {{input.age?}}", &input).unwrap(), "Age: ");
    }

    #[test]
    fn test_placeholder_replacement_mandatory_missing() {
        let result = replace_placeholders("Missing: {{input.missing_field}}", &json!({}));
        match result {
            Err(PopulateError::MissingMandatoryPlaceholder(field)) => {
                assert_eq!(field, "input.missing_field");
            }
            other => panic!("Expected MissingMandatoryPlaceholder error, got {:?}", other),
        }
    }

    #[test]
    fn test_placeholder_replacement_invalid_path() {
        let result = replace_placeholders("Invalid: {{output.field}}", &json!({}));
        assert!(matches!(result, Err(PopulateError::InvalidPlaceholderPath(p)) if p == "output.field"));
    }

    #[test]
    fn test_placeholder_replacement_nested() {
        let input = json!({"name": "Frank", "location": {"city": "Paris", "country": "France"}});
        let text = replace_placeholders(
            "{{input.name}} lives in {{input.location.city}}, {{input.location.country}}",
            &input,
        )
        .unwrap();
        assert_eq!(text, "Frank lives in Paris, France");
    }

    #[test]
    fn test_substituted_content_is_not_rescanned() {
        let input = json!({"text": "literal {{input.secret}} stays"});
        let text = replace_placeholders("User: {{input.text}}", &input).unwrap();
        assert_eq!(text, "User: literal {{input.secret}} stays");
    }
}
