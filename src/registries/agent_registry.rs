use crate::contexts::{AgentRegistry, AgentTemplate, PopulateError};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Agent specifications compiled into the binary, keyed by agent name
pub const BUNDLED_AGENTS: &[(&str, &str)] = &[
    ("generate_report", include_str!("../../agents/generate_report.yml")),
    (
        "generate_from_openapi",
        include_str!("../../agents/generate_from_openapi.yml"),
    ),
    ("optimize_tests", include_str!("../../agents/optimize_tests.yml")),
    ("review_tests", include_str!("../../agents/review_tests.yml")),
];

/// File-based implementation of AgentRegistry
///
/// Looks for `<agent>.yml` in the override directory first and falls back to
/// the bundled specification.
#[derive(Clone, Debug, Default)]
pub struct FileAgentRegistry {
    agents_dir: Option<PathBuf>,
}

impl FileAgentRegistry {
    /// Creates a new FileAgentRegistry
    ///
    /// # Arguments
    /// * `agents_dir` - Optional directory whose files replace bundled agents
    pub fn new(agents_dir: Option<PathBuf>) -> Self {
        Self { agents_dir }
    }

    fn load_source(&self, agent_name: &str) -> Result<String, PopulateError> {
        if let Some(dir) = &self.agents_dir {
            let agent_path = dir.join(format!("{}.yml", agent_name));
            if agent_path.exists() {
                debug!(agent = agent_name, path = %agent_path.display(), "using agent override");
                return fs::read_to_string(&agent_path).map_err(|e| {
                    PopulateError::InvalidSpecification(format!(
                        "Failed to read agent specification {}: {}",
                        agent_path.display(),
                        e
                    ))
                });
            }
        }

        BUNDLED_AGENTS
            .iter()
            .find(|(name, _)| *name == agent_name)
            .map(|(_, source)| source.to_string())
            .ok_or_else(|| PopulateError::AgentNotFound(agent_name.to_string()))
    }
}

impl AgentRegistry for FileAgentRegistry {
    fn get_specification(&self, agent_name: &str) -> Result<AgentTemplate, PopulateError> {
        let content = self.load_source(agent_name)?;
        parse_agent(&content)
    }
}

/// Extracts both prompts from a YAML agent specification
fn parse_agent(yaml_content: &str) -> Result<AgentTemplate, PopulateError> {
    use yaml_rust::YamlLoader;

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| PopulateError::InvalidSpecification(format!("Invalid YAML: {}", e)))?;

    let Some(doc) = docs.first() else {
        return Err(PopulateError::InvalidSpecification(
            "Empty YAML document".to_string(),
        ));
    };

    let field = |name: &str| {
        doc[name].as_str().map(str::to_string).ok_or_else(|| {
            PopulateError::InvalidSpecification(format!(
                "No {} field found in agent specification",
                name
            ))
        })
    };

    Ok(AgentTemplate {
        system_prompt: field("system_prompt")?,
        user_prompt: field("user_prompt")?,
    })
}
