//! AWS Signature Version 4 request signing.
//!
//! Only the header-based variant is implemented. Every request signs `host`,
//! `x-amz-date`, `x-amz-content-sha256`, the session token when present and
//! the content type when the request carries a body.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::credentials::Credentials;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// The parts of an HTTP request that take part in the signature.
#[derive(Debug, Clone)]
pub struct CanonicalInput<'a> {
    pub method: &'a str,
    pub host: &'a str,
    /// Raw, unencoded path segments. An empty trailing segment keeps the
    /// trailing slash.
    pub path: &'a [String],
    pub query: &'a [(String, String)],
    pub content_type: Option<&'a str>,
    pub payload: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct Signer<'a> {
    pub credentials: &'a Credentials,
    pub region: &'a str,
    pub service: &'a str,
    /// S3 encodes path segments once; every other service encodes them twice.
    pub double_encode_path: bool,
}

impl Signer<'_> {
    /// Returns the headers to attach to the outgoing request, including
    /// `authorization`.
    pub fn sign(&self, input: &CanonicalInput<'_>, now: DateTime<Utc>) -> Vec<(String, String)> {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(input.payload);

        let mut headers = vec![
            ("host".to_string(), input.host.to_string()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(content_type) = input.content_type {
            headers.push(("content-type".to_string(), content_type.trim().to_string()));
        }
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_request = self.canonical_request(input, &headers, &signed_headers, &payload_hash);

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{ALGORITHM}\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );
        let signing_key = derive_signing_key(
            &self.credentials.secret_access_key,
            &date_stamp,
            self.region,
            self.service,
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{ALGORITHM} Credential={}/{}, SignedHeaders={}, Signature={}",
            self.credentials.access_key_id, credential_scope, signed_headers, signature
        );

        let mut out: Vec<(String, String)> = headers
            .into_iter()
            .filter(|(name, _)| name != "host")
            .collect();
        out.push(("authorization".to_string(), authorization));
        out
    }

    fn canonical_request(
        &self,
        input: &CanonicalInput<'_>,
        headers: &[(String, String)],
        signed_headers: &str,
        payload_hash: &str,
    ) -> String {
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{k}:{v}\n"))
            .collect();
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            input.method,
            canonical_uri(input.path, self.double_encode_path),
            canonical_query(input.query),
            canonical_headers,
            signed_headers,
            payload_hash
        )
    }
}

/// The path as sent on the wire: every segment encoded once.
pub fn request_path(segments: &[String]) -> String {
    let encoded = segments
        .iter()
        .map(|segment| uri_encode(segment))
        .collect::<Vec<_>>()
        .join("/");
    format!("/{encoded}")
}

pub fn canonical_uri(segments: &[String], double_encode: bool) -> String {
    let encoded = segments
        .iter()
        .map(|segment| {
            let once = uri_encode(segment);
            if double_encode { uri_encode(&once) } else { once }
        })
        .collect::<Vec<_>>()
        .join("/");
    format!("/{encoded}")
}

pub fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding of everything outside `A-Z a-z 0-9 - _ . ~`.
pub fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{byte:02X}")),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn example_credentials() -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: None,
        }
    }

    #[test]
    fn derives_documented_signing_key() {
        // Key from the AWS "deriving the signing key" walkthrough.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20150830",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn double_encodes_path_segments_for_non_s3_services() {
        let segments = vec![
            "model".to_string(),
            "us.amazon.nova-lite-v1:0".to_string(),
            "converse".to_string(),
        ];
        assert_eq!(
            request_path(&segments),
            "/model/us.amazon.nova-lite-v1%3A0/converse"
        );
        assert_eq!(
            canonical_uri(&segments, true),
            "/model/us.amazon.nova-lite-v1%253A0/converse"
        );
        assert_eq!(
            canonical_uri(&segments, false),
            "/model/us.amazon.nova-lite-v1%3A0/converse"
        );
    }

    #[test]
    fn keeps_trailing_slash_from_empty_segment() {
        let segments = vec![
            "knowledgebases".to_string(),
            "KB1".to_string(),
            "datasources".to_string(),
            String::new(),
        ];
        assert_eq!(request_path(&segments), "/knowledgebases/KB1/datasources/");
    }

    #[test]
    fn sorts_and_encodes_query() {
        let query = vec![
            ("prefix".to_string(), "a b".to_string()),
            ("list-type".to_string(), "2".to_string()),
        ];
        assert_eq!(canonical_query(&query), "list-type=2&prefix=a%20b");
    }

    #[test]
    fn signature_header_names_signed_headers_in_order() {
        let credentials = Credentials {
            session_token: Some("token".to_string()),
            ..example_credentials()
        };
        let signer = Signer {
            credentials: &credentials,
            region: "us-east-1",
            service: "bedrock",
            double_encode_path: true,
        };
        let path = vec!["knowledgebases".to_string(), "KB1".to_string()];
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let headers = signer.sign(
            &CanonicalInput {
                method: "GET",
                host: "bedrock-agent.us-east-1.amazonaws.com",
                path: &path,
                query: &[],
                content_type: None,
                payload: b"",
            },
            now,
        );

        let auth = headers
            .iter()
            .find(|(k, _)| k == "authorization")
            .map(|(_, v)| v.as_str())
            .expect("authorization header");
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240501/us-east-1/bedrock/aws4_request"
        ));
        assert!(auth.contains(
            "SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-amz-security-token"
        ));
        assert!(headers.iter().any(|(k, v)| k == "x-amz-date" && v == "20240501T120000Z"));
        assert!(!headers.iter().any(|(k, _)| k == "host"));
    }
}
