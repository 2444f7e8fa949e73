mod agent_runner;
mod chat_client;

pub use agent_runner::{
    AgentModelRegistry, AgentRegistry, AgentRunner, AgentRunnerError, AgentSpecification,
    AgentTemplate, ExecutionError, ExecutionResult, Model, PopulateError, SamplingParams,
    replace_placeholders,
};
pub use chat_client::{
    ChatCompletion, ChatMessage, ChatRequest, Completion, OpenAiChatClient, ResponseFormat,
    UpstreamRejection,
};
