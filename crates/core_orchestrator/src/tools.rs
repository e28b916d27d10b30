use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use core_types::{
    CapabilitySet, HttpToolRequest, RetrievedPassage, Retriever, ToolKind, ToolSpec, WebFetcher,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::agent::ToolRuntime;

pub fn tool_spec(kind: ToolKind) -> ToolSpec {
    match kind {
        ToolKind::Retrieve => ToolSpec {
            name: kind.name().to_string(),
            description: "Search the course knowledge base and return the most relevant \
                          passages with their source file and page."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Search query" },
                    "numberOfResults": { "type": "integer", "minimum": 1, "maximum": 20 }
                },
                "required": ["text"]
            }),
        },
        ToolKind::HttpRequest => ToolSpec {
            name: kind.name().to_string(),
            description: "Send an HTTP request to a public web page and return the status \
                          and the beginning of the response body."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "method": { "type": "string", "default": "GET" },
                    "url": { "type": "string" },
                    "headers": {
                        "type": "array",
                        "items": { "type": "array", "items": { "type": "string" } }
                    },
                    "body": { "type": "string" }
                },
                "required": ["url"]
            }),
        },
    }
}

#[derive(Debug, Deserialize)]
struct RetrieveArgs {
    text: String,
    #[serde(default, rename = "numberOfResults")]
    number_of_results: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalSettings {
    pub number_of_results: u32,
    pub min_score: f64,
}

/// The agent's tools, limited to one capability set.
pub struct CapabilityTools {
    capabilities: CapabilitySet,
    knowledge_base_id: String,
    retriever: Arc<dyn Retriever>,
    web: Option<Arc<dyn WebFetcher>>,
    retrieval: RetrievalSettings,
}

impl CapabilityTools {
    pub fn new(
        capabilities: CapabilitySet,
        knowledge_base_id: impl Into<String>,
        retriever: Arc<dyn Retriever>,
        web: Option<Arc<dyn WebFetcher>>,
        retrieval: RetrievalSettings,
    ) -> Self {
        Self {
            capabilities,
            knowledge_base_id: knowledge_base_id.into(),
            retriever,
            web,
            retrieval,
        }
    }

    async fn retrieve(&self, arguments_json: &str) -> Result<String> {
        let args: RetrieveArgs =
            serde_json::from_str(arguments_json).context("invalid retrieve arguments")?;
        let query = args.text.trim();
        if query.is_empty() {
            bail!("retrieve needs a non-empty `text`");
        }
        let count = args
            .number_of_results
            .unwrap_or(self.retrieval.number_of_results)
            .clamp(1, 20);

        let passages = self
            .retriever
            .retrieve(&self.knowledge_base_id, query, count)
            .await?;
        let total = passages.len();
        let kept: Vec<_> = passages
            .into_iter()
            .filter(|p| p.score.is_none_or(|score| score >= self.retrieval.min_score))
            .collect();
        debug!(total, kept = kept.len(), "retrieved passages");
        Ok(format_passages(&kept))
    }

    async fn http_request(&self, arguments_json: &str) -> Result<String> {
        let web = self
            .web
            .as_ref()
            .ok_or_else(|| anyhow!("web access is not configured"))?;
        let request: HttpToolRequest =
            serde_json::from_str(arguments_json).context("invalid http_request arguments")?;
        let response = web.fetch(request).await?;

        let mut out = format!("status: {}\n{}", response.status, response.body);
        if response.truncated {
            out.push_str("\n[truncated]");
        }
        Ok(out)
    }
}

#[async_trait]
impl ToolRuntime for CapabilityTools {
    fn specs(&self) -> Vec<ToolSpec> {
        self.capabilities
            .tools()
            .iter()
            .map(|kind| tool_spec(*kind))
            .collect()
    }

    async fn call_tool(&self, name: &str, arguments_json: &str) -> Result<String> {
        let kind = ToolKind::from_name(name)
            .filter(|kind| self.capabilities.allows(*kind))
            .ok_or_else(|| anyhow!("tool `{name}` is not available for this question"))?;
        match kind {
            ToolKind::Retrieve => self.retrieve(arguments_json).await,
            ToolKind::HttpRequest => self.http_request(arguments_json).await,
        }
    }
}

fn format_passages(passages: &[RetrievedPassage]) -> String {
    if passages.is_empty() {
        return "No relevant passages were found in the knowledge base.".to_string();
    }
    let mut out = String::new();
    for (index, passage) in passages.iter().enumerate() {
        let _ = write!(out, "[{}]", index + 1);
        if let Some(uri) = &passage.source_uri {
            let _ = write!(out, " source: {uri}");
        }
        if let Some(page) = passage.page {
            let _ = write!(out, " page: {page}");
        }
        if let Some(score) = passage.score {
            let _ = write!(out, " score: {score:.2}");
        }
        let _ = write!(out, "\n{}\n\n", passage.text.trim());
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use core_types::WebResponse;
    use parking_lot::Mutex;

    use super::*;

    struct FixedRetriever {
        passages: Vec<RetrievedPassage>,
        asked: Mutex<Vec<(String, String, u32)>>,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(
            &self,
            knowledge_base_id: &str,
            query: &str,
            number_of_results: u32,
        ) -> Result<Vec<RetrievedPassage>> {
            self.asked.lock().push((
                knowledge_base_id.to_string(),
                query.to_string(),
                number_of_results,
            ));
            Ok(self.passages.clone())
        }
    }

    struct StaticWeb;

    #[async_trait]
    impl WebFetcher for StaticWeb {
        async fn fetch(&self, request: HttpToolRequest) -> Result<WebResponse> {
            Ok(WebResponse {
                status: 200,
                body: format!("fetched {}", request.url),
                truncated: true,
            })
        }
    }

    fn passage(text: &str, score: f64, page: u32) -> RetrievedPassage {
        RetrievedPassage {
            text: text.to_string(),
            source_uri: Some("s3://docs/documents/os.pdf".to_string()),
            score: Some(score),
            page: Some(page),
        }
    }

    fn tools(capabilities: CapabilitySet) -> (CapabilityTools, Arc<FixedRetriever>) {
        let retriever = Arc::new(FixedRetriever {
            passages: vec![passage("Round robin uses a quantum.", 0.82, 12), passage("noise", 0.1, 3)],
            asked: Mutex::new(Vec::new()),
        });
        let web: Option<Arc<dyn WebFetcher>> = capabilities
            .allows_web()
            .then(|| Arc::new(StaticWeb) as Arc<dyn WebFetcher>);
        let tools = CapabilityTools::new(
            capabilities,
            "KB123",
            retriever.clone(),
            web,
            RetrievalSettings {
                number_of_results: 5,
                min_score: 0.4,
            },
        );
        (tools, retriever)
    }

    #[test]
    fn specs_follow_capability_set() {
        let (only, _) = tools(CapabilitySet::RetrievalOnly);
        let names: Vec<_> = only.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["retrieve"]);

        let (web, _) = tools(CapabilitySet::RetrievalAndWeb);
        let names: Vec<_> = web.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["retrieve", "http_request"]);
    }

    #[tokio::test]
    async fn retrieve_drops_low_scores_and_cites_pages() {
        let (tools, retriever) = tools(CapabilitySet::RetrievalOnly);
        let output = tools
            .call_tool("retrieve", r#"{"text":"scheduling","numberOfResults":3}"#)
            .await
            .expect("retrieve");

        assert!(output.contains("os.pdf page: 12"));
        assert!(output.contains("Round robin"));
        assert!(!output.contains("noise"));
        assert_eq!(
            retriever.asked.lock().as_slice(),
            &[("KB123".to_string(), "scheduling".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn web_tool_is_refused_without_the_capability() {
        let (tools, _) = tools(CapabilitySet::RetrievalOnly);
        let err = tools
            .call_tool("http_request", r#"{"url":"https://example.com"}"#)
            .await
            .expect_err("refused");
        assert!(err.to_string().contains("not available"));
    }

    #[tokio::test]
    async fn web_tool_marks_truncated_bodies() {
        let (tools, _) = tools(CapabilitySet::RetrievalAndWeb);
        let output = tools
            .call_tool("http_request", r#"{"url":"https://example.com"}"#)
            .await
            .expect("fetch");
        assert!(output.starts_with("status: 200\nfetched https://example.com"));
        assert!(output.ends_with("[truncated]"));
    }
}
