use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use config::{AgentConfig, AppConfig};
use core_types::{
    AskRequest, GatewayFactory, HealthReport, HealthRequest, KnowledgeBaseService,
    ModelAdapter, ObjectStore, OperationOutcome, OperationRequest, ProgressEvent, Retriever,
    ServiceError, SyncRequest, UploadRequest, WebFetcher,
};
use tracing::{debug, info};

use crate::agent::Orchestrator;
use crate::tools::{CapabilityTools, RetrievalSettings};

const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model_id: String,
    pub max_rounds: usize,
    pub max_tokens: u32,
    pub retrieval_results: u32,
    pub min_score: f64,
}

impl From<&AgentConfig> for AgentSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            model_id: config.model_id.clone(),
            max_rounds: config.max_rounds,
            max_tokens: config.max_tokens,
            retrieval_results: config.retrieval_results,
            min_score: config.min_score,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

/// Settings every worker reads; fixed for the life of a dispatcher.
#[derive(Debug, Clone)]
pub struct OperationSettings {
    pub agent: AgentSettings,
    pub default_prefix: String,
}

impl From<&AppConfig> for OperationSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            agent: AgentSettings::from(&config.agent),
            default_prefix: config.default_prefix.clone(),
        }
    }
}

impl Default for OperationSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Trims the prefix, drops leading slashes and guarantees a trailing one.
/// A blank prefix falls back to `default_prefix`.
pub fn normalize_prefix(prefix: &str, default_prefix: &str) -> String {
    let trimmed = prefix.trim();
    let chosen = if trimmed.is_empty() {
        default_prefix.trim()
    } else {
        trimmed
    };
    let chosen = chosen.trim_start_matches('/');
    if chosen.is_empty() || chosen.ends_with('/') {
        chosen.to_string()
    } else {
        format!("{chosen}/")
    }
}

/// Remote key for a local file: the normalized prefix followed by the
/// file's base name.
pub fn object_key(prefix: &str, path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?;
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        bail!("{} is not a PDF file", path.display());
    }
    Ok(format!("{prefix}{name}"))
}

/// Runs one request to completion, reporting upload progress through
/// `on_progress`.
pub async fn execute(
    factory: &dyn GatewayFactory,
    settings: &OperationSettings,
    request: OperationRequest,
    on_progress: impl FnMut(ProgressEvent),
) -> Result<OperationOutcome> {
    match request {
        OperationRequest::Ask(req) => {
            let model = factory.model(req.region.as_deref())?;
            let retriever = factory.retriever(req.region.as_deref())?;
            let web = if req.capabilities.allows_web() {
                Some(factory.web_fetcher()?)
            } else {
                None
            };
            let answer = ask(model, retriever, web, &settings.agent, &req).await?;
            Ok(OperationOutcome::Answer(answer))
        }
        OperationRequest::Validate(req) => {
            let kb = factory.knowledge_base(req.region.as_deref())?;
            Ok(OperationOutcome::Health(check_health(kb.as_ref(), &req).await?))
        }
        OperationRequest::Upload(req) => {
            let store = factory.object_store(req.region.as_deref())?;
            upload_documents(store.as_ref(), &req, &settings.default_prefix, on_progress).await
        }
        OperationRequest::Sync(req) => {
            let kb = factory.knowledge_base(req.region.as_deref())?;
            sync_knowledge_base(kb.as_ref(), &req).await
        }
    }
}

pub async fn ask(
    model: Arc<dyn ModelAdapter>,
    retriever: Arc<dyn Retriever>,
    web: Option<Arc<dyn WebFetcher>>,
    settings: &AgentSettings,
    request: &AskRequest,
) -> Result<String> {
    let tools = CapabilityTools::new(
        request.capabilities,
        request.knowledge_base_id.clone(),
        retriever,
        web,
        RetrievalSettings {
            number_of_results: settings.retrieval_results,
            min_score: settings.min_score,
        },
    );
    info!(
        knowledge_base_id = %request.knowledge_base_id,
        allow_web = request.capabilities.allows_web(),
        "answering question"
    );
    Orchestrator::new(model, Arc::new(tools))
        .with_max_rounds(settings.max_rounds)
        .with_max_tokens(settings.max_tokens)
        .run(&settings.model_id, &request.question)
        .await?
        .into_answer()
}

pub async fn check_health(
    kb: &dyn KnowledgeBaseService,
    request: &HealthRequest,
) -> Result<HealthReport> {
    let info = kb.get_knowledge_base(&request.knowledge_base_id).await?;
    let data_sources = kb.list_data_sources(&request.knowledge_base_id).await?;
    debug!(
        knowledge_base_id = %request.knowledge_base_id,
        status = %info.status,
        data_sources = data_sources.len(),
        "knowledge base checked"
    );
    Ok(HealthReport {
        knowledge_base_id: request.knowledge_base_id.clone(),
        status: info.status,
        data_sources,
    })
}

/// Uploads files in order and stops at the first failure; files before
/// it stay uploaded.
pub async fn upload_documents(
    store: &dyn ObjectStore,
    request: &UploadRequest,
    default_prefix: &str,
    mut on_progress: impl FnMut(ProgressEvent),
) -> Result<OperationOutcome> {
    let prefix = normalize_prefix(&request.prefix, default_prefix);
    let total = request.files.len();
    let mut uris = Vec::with_capacity(total);

    for (index, path) in request.files.iter().enumerate() {
        on_progress(ProgressEvent::UploadStarted {
            index,
            total,
            path: path.clone(),
        });
        let key = object_key(&prefix, path)?;
        let body = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let uri = store
            .put_object(&request.bucket, &key, body, PDF_CONTENT_TYPE)
            .await
            .with_context(|| format!("failed to upload {}", path.display()))?;
        on_progress(ProgressEvent::UploadFinished {
            index,
            total,
            uri: uri.clone(),
        });
        uris.push(uri);
    }

    info!(bucket = %request.bucket, count = uris.len(), "upload finished");
    Ok(OperationOutcome::Uploaded {
        count: uris.len(),
        uris,
    })
}

pub async fn sync_knowledge_base(
    kb: &dyn KnowledgeBaseService,
    request: &SyncRequest,
) -> Result<OperationOutcome> {
    let sources = kb.list_data_sources(&request.knowledge_base_id).await?;
    if sources.is_empty() {
        return Err(ServiceError::new(
            "NoDataSources",
            format!(
                "knowledge base {} has no data sources to sync",
                request.knowledge_base_id
            ),
        )
        .into());
    }

    let mut jobs = Vec::with_capacity(sources.len());
    for source in &sources {
        let job = kb
            .start_ingestion_job(&request.knowledge_base_id, &source.id)
            .await?;
        debug!(data_source = %source.id, job = %job.ingestion_job_id, "ingestion job started");
        jobs.push(job);
    }
    Ok(OperationOutcome::SyncRequested { jobs })
}
