mod agent_model_registry;
mod agent_registry;

pub use agent_model_registry::FileAgentModelRegistry;
pub use agent_registry::{BUNDLED_AGENTS, FileAgentRegistry};
