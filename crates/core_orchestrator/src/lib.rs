mod agent;
mod dispatch;
mod ops;
mod shell;
mod tools;

pub use agent::{AgentRun, Orchestrator, STUDY_ASSISTANT_PROMPT, ToolRuntime};
pub use dispatch::{Dispatcher, Spawner, ThreadSpawner};
pub use ops::{
    AgentSettings, OperationSettings, ask, check_health, execute, normalize_prefix, object_key,
    sync_knowledge_base, upload_documents,
};
pub use shell::{ShellState, failure_text, health_summary, missing_field_text, status_text};
pub use tools::{CapabilityTools, RetrievalSettings, tool_spec};
