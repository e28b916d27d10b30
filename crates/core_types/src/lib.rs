use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub type OperationId = u64;
pub type MessageId = Uuid;
pub type ToolCallId = String;
pub type UnifiedEventStream = Pin<Box<dyn Stream<Item = Result<UnifiedEvent>> + Send + 'static>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UiLanguage {
    KoKr,
    EnUs,
}

/// Values typed into the configuration panel. Read once when an operation
/// starts; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub region: Option<String>,
    pub knowledge_base_id: String,
    pub bucket: String,
    pub prefix: String,
}

impl SessionConfig {
    pub fn region(&self) -> Option<&str> {
        self.region
            .as_deref()
            .map(str::trim)
            .filter(|region| !region.is_empty())
    }

    pub fn knowledge_base_id(&self) -> &str {
        self.knowledge_base_id.trim()
    }

    pub fn bucket(&self) -> &str {
        self.bucket.trim()
    }

    pub fn prefix(&self) -> &str {
        self.prefix.trim()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredField {
    KnowledgeBaseId,
    Question,
    Bucket,
    Files,
}

impl RequiredField {
    pub fn as_str(self) -> &'static str {
        match self {
            RequiredField::KnowledgeBaseId => "knowledge_base_id",
            RequiredField::Question => "question",
            RequiredField::Bucket => "bucket",
            RequiredField::Files => "files",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Retrieve,
    HttpRequest,
}

impl ToolKind {
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Retrieve => "retrieve",
            ToolKind::HttpRequest => "http_request",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "retrieve" => Some(ToolKind::Retrieve),
            "http_request" => Some(ToolKind::HttpRequest),
            _ => None,
        }
    }
}

/// The fixed set of actions the reasoning agent may take while answering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapabilitySet {
    #[default]
    RetrievalOnly,
    RetrievalAndWeb,
}

impl CapabilitySet {
    pub fn from_web_flag(allow_web: bool) -> Self {
        if allow_web {
            CapabilitySet::RetrievalAndWeb
        } else {
            CapabilitySet::RetrievalOnly
        }
    }

    pub fn tools(self) -> &'static [ToolKind] {
        match self {
            CapabilitySet::RetrievalOnly => &[ToolKind::Retrieve],
            CapabilitySet::RetrievalAndWeb => &[ToolKind::Retrieve, ToolKind::HttpRequest],
        }
    }

    pub fn allows(self, tool: ToolKind) -> bool {
        self.tools().contains(&tool)
    }

    pub fn allows_web(self) -> bool {
        self.allows(ToolKind::HttpRequest)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Ask,
    Validate,
    Upload,
    Sync,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Ask,
        OperationKind::Validate,
        OperationKind::Upload,
        OperationKind::Sync,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Ask => "ask",
            OperationKind::Validate => "validate",
            OperationKind::Upload => "upload",
            OperationKind::Sync => "sync",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskRequest {
    pub knowledge_base_id: String,
    pub region: Option<String>,
    pub question: String,
    pub capabilities: CapabilitySet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthRequest {
    pub knowledge_base_id: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub bucket: String,
    pub knowledge_base_id: Option<String>,
    pub prefix: String,
    pub region: Option<String>,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub knowledge_base_id: String,
    pub region: Option<String>,
}

/// Inputs captured from the shell at the moment an operation is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRequest {
    Ask(AskRequest),
    Validate(HealthRequest),
    Upload(UploadRequest),
    Sync(SyncRequest),
}

impl OperationRequest {
    pub fn ask(session: &SessionConfig, question: &str, allow_web: bool) -> Self {
        OperationRequest::Ask(AskRequest {
            knowledge_base_id: session.knowledge_base_id().to_owned(),
            region: session.region().map(ToOwned::to_owned),
            question: question.trim().to_owned(),
            capabilities: CapabilitySet::from_web_flag(allow_web),
        })
    }

    pub fn validate(session: &SessionConfig) -> Self {
        OperationRequest::Validate(HealthRequest {
            knowledge_base_id: session.knowledge_base_id().to_owned(),
            region: session.region().map(ToOwned::to_owned),
        })
    }

    pub fn upload(session: &SessionConfig, files: Vec<PathBuf>) -> Self {
        let kb_id = session.knowledge_base_id();
        OperationRequest::Upload(UploadRequest {
            bucket: session.bucket().to_owned(),
            knowledge_base_id: (!kb_id.is_empty()).then(|| kb_id.to_owned()),
            prefix: session.prefix().to_owned(),
            region: session.region().map(ToOwned::to_owned),
            files,
        })
    }

    pub fn sync(session: &SessionConfig) -> Self {
        OperationRequest::Sync(SyncRequest {
            knowledge_base_id: session.knowledge_base_id().to_owned(),
            region: session.region().map(ToOwned::to_owned),
        })
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Ask(_) => OperationKind::Ask,
            OperationRequest::Validate(_) => OperationKind::Validate,
            OperationRequest::Upload(_) => OperationKind::Upload,
            OperationRequest::Sync(_) => OperationKind::Sync,
        }
    }

    /// Returns the first required field that is empty, in the order the
    /// shell asks for them.
    pub fn missing_field(&self) -> Option<RequiredField> {
        match self {
            OperationRequest::Ask(req) => {
                if req.knowledge_base_id.trim().is_empty() {
                    Some(RequiredField::KnowledgeBaseId)
                } else if req.question.trim().is_empty() {
                    Some(RequiredField::Question)
                } else {
                    None
                }
            }
            OperationRequest::Validate(HealthRequest {
                knowledge_base_id, ..
            })
            | OperationRequest::Sync(SyncRequest {
                knowledge_base_id, ..
            }) => knowledge_base_id
                .trim()
                .is_empty()
                .then_some(RequiredField::KnowledgeBaseId),
            OperationRequest::Upload(req) => {
                if req.bucket.trim().is_empty() {
                    Some(RequiredField::Bucket)
                } else if req.files.is_empty() {
                    Some(RequiredField::Files)
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBaseInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl DataSourceSummary {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionJobRef {
    pub data_source_id: String,
    pub ingestion_job_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub knowledge_base_id: String,
    pub status: String,
    pub data_sources: Vec<DataSourceSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    UploadStarted {
        index: usize,
        total: usize,
        path: PathBuf,
    },
    UploadFinished {
        index: usize,
        total: usize,
        uri: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Answer(String),
    Health(HealthReport),
    SyncRequested { jobs: Vec<IngestionJobRef> },
    Uploaded { count: usize, uris: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationEvent {
    Progress(ProgressEvent),
    Completed(OperationOutcome),
    Failed(OperationFailure),
}

impl OperationEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationEvent::Progress(_))
    }
}

/// A worker notification tagged with the operation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: OperationId,
    pub kind: OperationKind,
    pub event: OperationEvent,
}

/// An error reported by the remote service with its own error code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ServiceError {
    pub code: String,
    pub status: Option<u16>,
    pub message: String,
}

impl ServiceError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperationFailure {
    #[error("{code}: {message}")]
    Service { code: String, message: String },
    #[error("{message}")]
    Unexpected { message: String, trace: String },
}

impl OperationFailure {
    pub fn classify(err: &anyhow::Error) -> Self {
        if let Some(service) = err.chain().find_map(|e| e.downcast_ref::<ServiceError>()) {
            return OperationFailure::Service {
                code: service.code.clone(),
                message: service.message.clone(),
            };
        }
        OperationFailure::Unexpected {
            message: format!("{err:#}"),
            trace: format!("{err:?}"),
        }
    }
}

impl From<anyhow::Error> for OperationFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::classify(&err)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("required field `{}` is empty", .0.as_str())]
    MissingInput(RequiredField),
    #[error("a `{0}` operation is already running")]
    AlreadyRunning(OperationKind),
    #[error("failed to start worker: {0}")]
    SpawnFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedRole {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedMessage {
    pub id: MessageId,
    pub role: UnifiedRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<ToolCallId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_arguments_json: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

impl UnifiedMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new_v4(),
            role: UnifiedRole::User,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_arguments_json: None,
            is_error: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new_v4(),
            role: UnifiedRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_arguments_json: None,
            is_error: false,
        }
    }

    pub fn tool_call(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        arguments_json: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new_v4(),
            role: UnifiedRole::Assistant,
            content: String::new(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(name.into()),
            tool_arguments_json: Some(arguments_json.into()),
            is_error: false,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            id: MessageId::new_v4(),
            role: UnifiedRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: None,
            tool_arguments_json: None,
            is_error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedGenerateRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<UnifiedMessage>,
    pub tools: Vec<ToolSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnifiedEvent {
    TextDelta {
        text: String,
    },
    ToolCallRequested {
        call_id: ToolCallId,
        name: String,
        arguments_json: String,
    },
    ToolCallResult {
        call_id: ToolCallId,
        output: String,
        is_error: bool,
    },
    Usage {
        input_tokens: u64,
        output_tokens: u64,
        total_tokens: Option<u64>,
    },
    Completed,
    Failed {
        code: String,
        message: String,
        retriable: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub text: String,
    pub source_uri: Option<String>,
    pub score: Option<f64>,
    pub page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpToolRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebResponse {
    pub status: u16,
    pub body: String,
    pub truncated: bool,
}

#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn generate(&self, request: UnifiedGenerateRequest) -> Result<UnifiedEventStream>;
}

#[async_trait]
pub trait KnowledgeBaseService: Send + Sync {
    async fn get_knowledge_base(&self, knowledge_base_id: &str) -> Result<KnowledgeBaseInfo>;
    async fn list_data_sources(&self, knowledge_base_id: &str) -> Result<Vec<DataSourceSummary>>;
    async fn start_ingestion_job(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
    ) -> Result<IngestionJobRef>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `body` under `bucket/key` and returns the stored object's URI.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<String>;
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        knowledge_base_id: &str,
        query: &str,
        number_of_results: u32,
    ) -> Result<Vec<RetrievedPassage>>;
}

#[async_trait]
pub trait WebFetcher: Send + Sync {
    async fn fetch(&self, request: HttpToolRequest) -> Result<WebResponse>;
}

/// Builds service clients inside a worker, once per operation.
pub trait GatewayFactory: Send + Sync {
    fn knowledge_base(&self, region: Option<&str>) -> Result<Arc<dyn KnowledgeBaseService>>;
    fn object_store(&self, region: Option<&str>) -> Result<Arc<dyn ObjectStore>>;
    fn model(&self, region: Option<&str>) -> Result<Arc<dyn ModelAdapter>>;
    fn retriever(&self, region: Option<&str>) -> Result<Arc<dyn Retriever>>;
    fn web_fetcher(&self) -> Result<Arc<dyn WebFetcher>>;
}
