//! AWS-backed implementations of the knowledge-base, object-store, model and
//! retrieval services, signed with SigV4 over plain HTTPS.

mod bedrock;
mod client;
mod converse;
mod credentials;
mod error;
mod s3;
mod sigv4;
mod web;

use std::sync::Arc;

use anyhow::Result;
use core_types::{
    GatewayFactory, KnowledgeBaseService, ModelAdapter, ObjectStore, Retriever, WebFetcher,
};
use tracing::debug;

pub use bedrock::{BedrockAgentClient, BedrockRetriever};
pub use client::{Endpoint, SignedClient, SignedRequest};
pub use converse::ConverseAdapter;
pub use credentials::{Credentials, FALLBACK_REGION, resolve_region};
pub use s3::S3ObjectStore;
pub use web::HttpWebFetcher;

/// Signing name shared by every Bedrock endpoint.
const BEDROCK_SIGNING_NAME: &str = "bedrock";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointUrls {
    pub s3: Option<String>,
    pub bedrock_agent: Option<String>,
    pub bedrock_agent_runtime: Option<String>,
    pub bedrock_runtime: Option<String>,
}

/// Builds fresh, signed clients on demand. Credentials and region are
/// resolved at call time, inside the worker that needs them.
#[derive(Debug, Clone)]
pub struct AwsGatewayFactory {
    endpoints: EndpointUrls,
    web_fetch_limit_bytes: usize,
}

impl AwsGatewayFactory {
    pub fn new(endpoints: EndpointUrls, web_fetch_limit_bytes: usize) -> Self {
        Self {
            endpoints,
            web_fetch_limit_bytes,
        }
    }

    fn signed(&self, region: Option<&str>, service: &'static str) -> Result<SignedClient> {
        let region = resolve_region(region);
        let credentials = Credentials::resolve()?;
        debug!(service, region = %region, "building signed client");
        Ok(SignedClient::new(credentials, region, service))
    }

    fn endpoint(
        &self,
        override_url: Option<&str>,
        host_prefix: &str,
        region: &str,
    ) -> Result<Endpoint> {
        match override_url {
            Some(url) => Endpoint::parse(url),
            None => Ok(Endpoint::aws(host_prefix, region)),
        }
    }
}

impl GatewayFactory for AwsGatewayFactory {
    fn knowledge_base(&self, region: Option<&str>) -> Result<Arc<dyn KnowledgeBaseService>> {
        let client = self.signed(region, BEDROCK_SIGNING_NAME)?;
        let endpoint = self.endpoint(
            self.endpoints.bedrock_agent.as_deref(),
            "bedrock-agent",
            client.region(),
        )?;
        Ok(Arc::new(BedrockAgentClient::new(client, endpoint)))
    }

    fn object_store(&self, region: Option<&str>) -> Result<Arc<dyn ObjectStore>> {
        let client = self.signed(region, "s3")?;
        let endpoint = self.endpoints.s3.as_deref().map(Endpoint::parse).transpose()?;
        Ok(Arc::new(S3ObjectStore::new(client, endpoint)))
    }

    fn model(&self, region: Option<&str>) -> Result<Arc<dyn ModelAdapter>> {
        let client = self.signed(region, BEDROCK_SIGNING_NAME)?;
        let endpoint = self.endpoint(
            self.endpoints.bedrock_runtime.as_deref(),
            "bedrock-runtime",
            client.region(),
        )?;
        Ok(Arc::new(ConverseAdapter::new(client, endpoint)))
    }

    fn retriever(&self, region: Option<&str>) -> Result<Arc<dyn Retriever>> {
        let client = self.signed(region, BEDROCK_SIGNING_NAME)?;
        let endpoint = self.endpoint(
            self.endpoints.bedrock_agent_runtime.as_deref(),
            "bedrock-agent-runtime",
            client.region(),
        )?;
        Ok(Arc::new(BedrockRetriever::new(client, endpoint)))
    }

    fn web_fetcher(&self) -> Result<Arc<dyn WebFetcher>> {
        Ok(Arc::new(HttpWebFetcher::new(self.web_fetch_limit_bytes)?))
    }
}
