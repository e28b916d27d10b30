//! Bedrock Agent (knowledge-base management) and Bedrock Agent Runtime
//! (retrieval) clients.

use anyhow::Result;
use async_trait::async_trait;
use core_types::{
    DataSourceSummary, IngestionJobRef, KnowledgeBaseInfo, KnowledgeBaseService,
    RetrievedPassage, Retriever,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::client::{Endpoint, SignedClient, SignedRequest};

const LIST_PAGE_SIZE: u32 = 100;

pub struct BedrockAgentClient {
    client: SignedClient,
    endpoint: Endpoint,
}

impl BedrockAgentClient {
    pub fn new(client: SignedClient, endpoint: Endpoint) -> Self {
        Self { client, endpoint }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetKnowledgeBaseResponse {
    knowledge_base: KnowledgeBaseBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeBaseBody {
    knowledge_base_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDataSourcesResponse {
    #[serde(default)]
    data_source_summaries: Vec<DataSourceBody>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataSourceBody {
    data_source_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartIngestionJobResponse {
    ingestion_job: IngestionJobBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestionJobBody {
    ingestion_job_id: String,
    data_source_id: String,
    #[serde(default)]
    status: Option<String>,
}

#[async_trait]
impl KnowledgeBaseService for BedrockAgentClient {
    async fn get_knowledge_base(&self, knowledge_base_id: &str) -> Result<KnowledgeBaseInfo> {
        let request = SignedRequest::new(
            Method::GET,
            &self.endpoint,
            &["knowledgebases", knowledge_base_id],
        );
        let response: GetKnowledgeBaseResponse = self.client.send_json(request).await?;
        let kb = response.knowledge_base;
        Ok(KnowledgeBaseInfo {
            id: kb.knowledge_base_id,
            name: kb.name,
            status: kb.status.unwrap_or_else(|| "UNKNOWN".to_string()),
        })
    }

    async fn list_data_sources(&self, knowledge_base_id: &str) -> Result<Vec<DataSourceSummary>> {
        let mut summaries = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut body = json!({ "maxResults": LIST_PAGE_SIZE });
            if let Some(token) = &next_token {
                body["nextToken"] = Value::String(token.clone());
            }
            let request = SignedRequest::new(
                Method::POST,
                &self.endpoint,
                &["knowledgebases", knowledge_base_id, "datasources", ""],
            )
            .json(&body);
            let page: ListDataSourcesResponse = self.client.send_json(request).await?;
            summaries.extend(page.data_source_summaries.into_iter().map(|ds| {
                DataSourceSummary {
                    id: ds.data_source_id,
                    name: ds.name,
                    status: ds.status,
                }
            }));

            match page.next_token.filter(|t| !t.is_empty()) {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        Ok(summaries)
    }

    async fn start_ingestion_job(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
    ) -> Result<IngestionJobRef> {
        let body = json!({
            "clientToken": Uuid::new_v4().to_string(),
            "description": "started from lectern",
        });
        let request = SignedRequest::new(
            Method::PUT,
            &self.endpoint,
            &[
                "knowledgebases",
                knowledge_base_id,
                "datasources",
                data_source_id,
                "ingestionjobs",
                "",
            ],
        )
        .json(&body);
        let response: StartIngestionJobResponse = self.client.send_json(request).await?;
        let job = response.ingestion_job;
        info!(
            knowledge_base_id,
            data_source_id = %job.data_source_id,
            ingestion_job_id = %job.ingestion_job_id,
            "ingestion job started"
        );
        Ok(IngestionJobRef {
            data_source_id: job.data_source_id,
            ingestion_job_id: job.ingestion_job_id,
            status: job.status.unwrap_or_else(|| "STARTING".to_string()),
        })
    }
}

pub struct BedrockRetriever {
    client: SignedClient,
    endpoint: Endpoint,
}

impl BedrockRetriever {
    pub fn new(client: SignedClient, endpoint: Endpoint) -> Self {
        Self { client, endpoint }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    #[serde(default)]
    retrieval_results: Vec<Value>,
}

#[async_trait]
impl Retriever for BedrockRetriever {
    async fn retrieve(
        &self,
        knowledge_base_id: &str,
        query: &str,
        number_of_results: u32,
    ) -> Result<Vec<RetrievedPassage>> {
        let body = json!({
            "retrievalQuery": { "text": query },
            "retrievalConfiguration": {
                "vectorSearchConfiguration": { "numberOfResults": number_of_results.max(1) }
            }
        });
        let request = SignedRequest::new(
            Method::POST,
            &self.endpoint,
            &["knowledgebases", knowledge_base_id, "retrieve"],
        )
        .json(&body);
        let response: RetrieveResponse = self.client.send_json(request).await?;
        Ok(response
            .retrieval_results
            .iter()
            .filter_map(map_retrieval_result)
            .collect())
    }
}

fn map_retrieval_result(result: &Value) -> Option<RetrievedPassage> {
    let text = result.pointer("/content/text")?.as_str()?.to_string();
    let metadata = result.get("metadata");
    let source_uri = result
        .pointer("/location/s3Location/uri")
        .or_else(|| result.pointer("/location/webLocation/url"))
        .or_else(|| metadata.and_then(|m| m.get("x-amz-bedrock-kb-source-uri")))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);
    let page = metadata
        .and_then(|m| m.get("x-amz-bedrock-kb-document-page-number"))
        .and_then(Value::as_f64)
        .map(|p| p as u32);
    Some(RetrievedPassage {
        text,
        source_uri,
        score: result.get("score").and_then(Value::as_f64),
        page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_s3_retrieval_result_with_page() {
        let result = json!({
            "content": { "text": "IAM is the identity service." },
            "location": { "type": "S3", "s3Location": { "uri": "s3://docs/documents/iam.pdf" } },
            "score": 0.71,
            "metadata": { "x-amz-bedrock-kb-document-page-number": 4.0 }
        });
        let passage = map_retrieval_result(&result).expect("passage");
        assert_eq!(passage.source_uri.as_deref(), Some("s3://docs/documents/iam.pdf"));
        assert_eq!(passage.page, Some(4));
        assert_eq!(passage.score, Some(0.71));
    }

    #[test]
    fn skips_results_without_text() {
        let result = json!({ "location": { "type": "S3" } });
        assert!(map_retrieval_result(&result).is_none());
    }
}
