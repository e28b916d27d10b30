use anyhow::{Context, Result, bail};
use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::credentials::Credentials;
use crate::error::parse_service_error;
use crate::sigv4::{CanonicalInput, Signer, canonical_query, request_path};

/// Scheme plus `host[:port]` of a service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub authority: String,
}

impl Endpoint {
    pub fn aws(host_prefix: &str, region: &str) -> Self {
        Self {
            scheme: "https".to_string(),
            authority: format!("{host_prefix}.{region}.amazonaws.com"),
        }
    }

    pub fn parse(url: &str) -> Result<Self> {
        let parsed = reqwest::Url::parse(url.trim())
            .with_context(|| format!("invalid endpoint url `{url}`"))?;
        let Some(host) = parsed.host_str() else {
            bail!("endpoint url `{url}` has no host");
        };
        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self {
            scheme: parsed.scheme().to_string(),
            authority,
        })
    }

    pub fn with_subdomain(&self, label: &str) -> Self {
        Self {
            scheme: self.scheme.clone(),
            authority: format!("{label}.{}", self.authority),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: Method,
    pub endpoint: Endpoint,
    pub path: Vec<String>,
    pub query: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl SignedRequest {
    pub fn new(method: Method, endpoint: &Endpoint, path: &[&str]) -> Self {
        Self {
            method,
            endpoint: endpoint.clone(),
            path: path.iter().map(|s| (*s).to_string()).collect(),
            query: Vec::new(),
            content_type: None,
            body: Vec::new(),
        }
    }

    pub fn json(mut self, body: &serde_json::Value) -> Self {
        self.content_type = Some("application/json".to_string());
        self.body = body.to_string().into_bytes();
        self
    }

    pub fn bytes(mut self, body: Vec<u8>, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self.body = body;
        self
    }

    fn url(&self) -> String {
        let path = request_path(&self.path);
        let query = canonical_query(&self.query);
        if query.is_empty() {
            format!("{}://{}{}", self.endpoint.scheme, self.endpoint.authority, path)
        } else {
            format!(
                "{}://{}{}?{}",
                self.endpoint.scheme, self.endpoint.authority, path, query
            )
        }
    }
}

/// A reqwest client that signs every request for one AWS service.
#[derive(Debug, Clone)]
pub struct SignedClient {
    http: reqwest::Client,
    credentials: Credentials,
    region: String,
    service: &'static str,
    double_encode_path: bool,
}

impl SignedClient {
    pub fn new(credentials: Credentials, region: impl Into<String>, service: &'static str) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            region: region.into(),
            service,
            double_encode_path: service != "s3",
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub async fn send(&self, request: SignedRequest) -> Result<reqwest::Response> {
        let url = request.url();
        let signer = Signer {
            credentials: &self.credentials,
            region: &self.region,
            service: self.service,
            double_encode_path: self.double_encode_path,
        };
        let headers = signer.sign(
            &CanonicalInput {
                method: request.method.as_str(),
                host: &request.endpoint.authority,
                path: &request.path,
                query: &request.query,
                content_type: request.content_type.as_deref(),
                payload: &request.body,
            },
            Utc::now(),
        );

        let mut builder = self.http.request(request.method.clone(), &url);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        debug!(service = self.service, method = %request.method, url = %url, "sending signed request");
        let response = builder
            .send()
            .await
            .with_context(|| format!("{} {url} failed", request.method))?;

        let status = response.status();
        if !status.is_success() {
            let error_type = response
                .headers()
                .get("x-amzn-errortype")
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned);
            let body = response.text().await.unwrap_or_default();
            let err = parse_service_error(status.as_u16(), error_type.as_deref(), &body);
            warn!(
                service = self.service,
                status = status.as_u16(),
                code = %err.code,
                "aws request failed"
            );
            return Err(err.into());
        }
        Ok(response)
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: SignedRequest) -> Result<T> {
        let response = self.send(request).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {} response json", self.service))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endpoint_with_port() {
        let endpoint = Endpoint::parse("http://127.0.0.1:9000/").expect("endpoint");
        assert_eq!(endpoint.scheme, "http");
        assert_eq!(endpoint.authority, "127.0.0.1:9000");
    }

    #[test]
    fn builds_url_with_encoded_path() {
        let endpoint = Endpoint::aws("bedrock-runtime", "us-east-1");
        let request = SignedRequest::new(
            Method::POST,
            &endpoint,
            &["model", "us.amazon.nova-lite-v1:0", "converse"],
        );
        assert_eq!(
            request.url(),
            "https://bedrock-runtime.us-east-1.amazonaws.com/model/us.amazon.nova-lite-v1%3A0/converse"
        );
    }
}
