use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use core_types::{HttpToolRequest, WebFetcher, WebResponse};
use futures::StreamExt;
use reqwest::Method;
use reqwest::header::{HeaderName, HeaderValue};
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Plain HTTP(S) requests on behalf of the agent's `http_request` tool.
pub struct HttpWebFetcher {
    client: reqwest::Client,
    limit_bytes: usize,
}

impl HttpWebFetcher {
    pub fn new(limit_bytes: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("lectern/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            limit_bytes: limit_bytes.max(1),
        })
    }
}

#[async_trait]
impl WebFetcher for HttpWebFetcher {
    async fn fetch(&self, request: HttpToolRequest) -> Result<WebResponse> {
        let url = reqwest::Url::parse(request.url.trim())
            .with_context(|| format!("invalid url `{}`", request.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("unsupported url scheme `{}`", url.scheme());
        }
        let method = Method::from_bytes(request.method.trim().to_ascii_uppercase().as_bytes())
            .with_context(|| format!("invalid http method `{}`", request.method))?;

        let mut builder = self.client.request(method.clone(), url.clone());
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name `{name}`"))?;
            let value = HeaderValue::from_str(value).context("invalid header value")?;
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        debug!(method = %method, url = %url, "web fetch");
        let response = builder.send().await.with_context(|| format!("{method} {url} failed"))?;
        let status = response.status().as_u16();

        let mut collected = Vec::new();
        let mut truncated = false;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("failed to read response body")?;
            let room = self.limit_bytes - collected.len();
            if chunk.len() > room {
                collected.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            collected.extend_from_slice(&chunk);
        }

        Ok(WebResponse {
            status,
            body: String::from_utf8_lossy(&collected).into_owned(),
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn get(url: String) -> HttpToolRequest {
        HttpToolRequest {
            method: "get".to_string(),
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn truncates_body_at_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("abcdefghij"))
            .mount(&server)
            .await;

        let fetcher = HttpWebFetcher::new(4).expect("fetcher");
        let response = fetcher
            .fetch(get(format!("{}/page", server.uri())))
            .await
            .expect("fetch");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "abcd");
        assert!(response.truncated);
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let fetcher = HttpWebFetcher::new(1024).expect("fetcher");
        let err = fetcher
            .fetch(get("file:///etc/passwd".to_string()))
            .await
            .expect_err("file scheme");
        assert!(err.to_string().contains("unsupported url scheme"));
    }
}
