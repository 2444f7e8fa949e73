use crate::contexts::{AgentModelRegistry, ExecutionError, Model, SamplingParams};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;
use yaml_rust::Yaml;

const BUNDLED_REGISTRY: &str = include_str!("../../agents/agent_model_registry.yml");
const REGISTRY_FILE: &str = "agent_model_registry.yml";

/// File-based implementation of AgentModelRegistry
///
/// Loads agent-to-model mappings from `agent_model_registry.yml`, preferring
/// a copy in the override directory over the bundled one.
#[derive(Clone, Debug)]
pub struct FileAgentModelRegistry {
    registry: HashMap<String, Model>,
}

impl FileAgentModelRegistry {
    /// Creates a new FileAgentModelRegistry
    ///
    /// The registry is read once so a broken file fails at startup rather
    /// than on the first request.
    pub fn new(agents_dir: Option<PathBuf>) -> Result<Self, ExecutionError> {
        let override_path = agents_dir
            .map(|dir| dir.join(REGISTRY_FILE))
            .filter(|path| path.exists());

        let content = match override_path {
            Some(path) => {
                debug!(path = %path.display(), "using agent model registry override");
                fs::read_to_string(&path).map_err(|e| {
                    ExecutionError::InvalidRegistry(format!(
                        "Failed to read agent model registry {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
            None => BUNDLED_REGISTRY.to_string(),
        };

        Ok(Self {
            registry: parse_registry(&content)?,
        })
    }
}

impl AgentModelRegistry for FileAgentModelRegistry {
    fn get_model(&self, agent_name: &str) -> Result<Model, ExecutionError> {
        self.registry
            .get(agent_name)
            .cloned()
            .ok_or_else(|| ExecutionError::ModelNotFound(agent_name.to_string()))
    }
}

/// Parses the YAML registry file into a HashMap
/// Supports both old format (string) and new format (object with model and sampling)
fn parse_registry(yaml_content: &str) -> Result<HashMap<String, Model>, ExecutionError> {
    use yaml_rust::YamlLoader;

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| ExecutionError::InvalidRegistry(format!("Invalid registry YAML: {}", e)))?;

    let mut registry = HashMap::new();
    let Some(hash) = docs.first().and_then(Yaml::as_hash) else {
        return Ok(registry);
    };

    for (key, value) in hash {
        let Some(agent) = key.as_str() else {
            continue;
        };

        let model = if let Some(name) = value.as_str() {
            // Old format: simple string value (model name)
            Model {
                name: name.to_string(),
                sampling: SamplingParams::default(),
                json_output: false,
            }
        } else if value.as_hash().is_some() {
            parse_entry(agent, value)?
        } else {
            return Err(ExecutionError::InvalidRegistry(format!(
                "Entry for agent '{}' must be a model name or a mapping",
                agent
            )));
        };

        registry.insert(agent.to_string(), model);
    }

    Ok(registry)
}

fn parse_entry(agent: &str, value: &Yaml) -> Result<Model, ExecutionError> {
    let defaults = SamplingParams::default();

    let name = value["model"].as_str().ok_or_else(|| {
        ExecutionError::InvalidRegistry(format!("Entry for agent '{}' has no model", agent))
    })?;

    let float = |field: &str, default: f32| -> Result<f32, ExecutionError> {
        match &value[field] {
            Yaml::BadValue => Ok(default),
            Yaml::Real(_) => value[field]
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| invalid_field(agent, field)),
            Yaml::Integer(i) => Ok(*i as f32),
            _ => Err(invalid_field(agent, field)),
        }
    };

    let max_tokens = match &value["max_tokens"] {
        Yaml::BadValue => defaults.max_tokens,
        Yaml::Integer(i) => u32::try_from(*i).map_err(|_| invalid_field(agent, "max_tokens"))?,
        _ => return Err(invalid_field(agent, "max_tokens")),
    };

    let json_output = match &value["json_output"] {
        Yaml::BadValue => false,
        Yaml::Boolean(b) => *b,
        _ => return Err(invalid_field(agent, "json_output")),
    };

    Ok(Model {
        name: name.to_string(),
        sampling: SamplingParams {
            temperature: float("temperature", defaults.temperature)?,
            top_p: float("top_p", defaults.top_p)?,
            presence_penalty: float("presence_penalty", defaults.presence_penalty)?,
            max_tokens,
        },
        json_output,
    })
}

fn invalid_field(agent: &str, field: &str) -> ExecutionError {
    ExecutionError::InvalidRegistry(format!(
        "Field '{}' of agent '{}' has an invalid value",
        field, agent
    ))
}
