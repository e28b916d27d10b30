use anyhow::Result;
use async_trait::async_trait;
use core_types::ObjectStore;
use reqwest::Method;
use tracing::info;

use crate::client::{Endpoint, SignedClient, SignedRequest};

/// S3 `PutObject`. Virtual-hosted addressing against AWS, path-style against
/// an overridden endpoint (MinIO, LocalStack, mock servers).
pub struct S3ObjectStore {
    client: SignedClient,
    endpoint_override: Option<Endpoint>,
}

impl S3ObjectStore {
    pub fn new(client: SignedClient, endpoint_override: Option<Endpoint>) -> Self {
        Self {
            client,
            endpoint_override,
        }
    }

    fn locate(&self, bucket: &str, key: &str) -> (Endpoint, Vec<String>) {
        let key_segments = key.split('/').map(ToOwned::to_owned);
        match &self.endpoint_override {
            Some(endpoint) => {
                let mut path = vec![bucket.to_string()];
                path.extend(key_segments);
                (endpoint.clone(), path)
            }
            None => {
                let endpoint = Endpoint::aws("s3", self.client.region()).with_subdomain(bucket);
                (endpoint, key_segments.collect())
            }
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let (endpoint, path) = self.locate(bucket, key);
        let size = body.len();
        let mut request = SignedRequest::new(Method::PUT, &endpoint, &[]).bytes(body, content_type);
        request.path = path;

        let response = self.client.send(request).await?;
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .trim_matches('"')
            .to_string();
        info!(bucket, key, size, etag = %etag, "object stored");
        Ok(format!("s3://{bucket}/{key}"))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::credentials::Credentials;

    fn credentials() -> Credentials {
        Credentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
        }
    }

    #[test]
    fn uses_virtual_hosted_bucket_without_override() {
        let store = S3ObjectStore::new(SignedClient::new(credentials(), "ap-northeast-2", "s3"), None);
        let (endpoint, path) = store.locate("docs", "documents/os ch2.pdf");
        assert_eq!(endpoint.authority, "docs.s3.ap-northeast-2.amazonaws.com");
        assert_eq!(path, vec!["documents".to_string(), "os ch2.pdf".to_string()]);
    }

    #[tokio::test]
    async fn puts_object_path_style_against_override() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/docs/documents/iam.pdf"))
            .and(header("content-type", "application/pdf"))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-content-sha256"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc123\""))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = Endpoint::parse(&server.uri()).expect("endpoint");
        let store = S3ObjectStore::new(
            SignedClient::new(credentials(), "us-east-1", "s3"),
            Some(endpoint),
        );
        let uri = store
            .put_object("docs", "documents/iam.pdf", b"%PDF-1.7".to_vec(), "application/pdf")
            .await
            .expect("put object");
        assert_eq!(uri, "s3://docs/documents/iam.pdf");
    }

    #[tokio::test]
    async fn surfaces_s3_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
            ))
            .mount(&server)
            .await;

        let store = S3ObjectStore::new(
            SignedClient::new(credentials(), "us-east-1", "s3"),
            Some(Endpoint::parse(&server.uri()).expect("endpoint")),
        );
        let err = store
            .put_object("docs", "documents/a.pdf", b"x".to_vec(), "application/pdf")
            .await
            .expect_err("access denied");
        let service = err
            .downcast_ref::<core_types::ServiceError>()
            .expect("service error");
        assert_eq!(service.code, "AccessDenied");
        assert_eq!(service.status, Some(403));
    }
}
