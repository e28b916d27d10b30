use core_types::ServiceError;
use serde_json::Value;

const BODY_PREVIEW_CHARS: usize = 500;

/// Builds a [`ServiceError`] from a failed AWS response.
///
/// JSON services put the code in `x-amzn-ErrorType` (optionally suffixed with
/// `:<url>`) or in the body's `__type` (`namespace#Code`); S3 answers with an
/// XML `<Error><Code>` document.
pub fn parse_service_error(status: u16, error_type: Option<&str>, body: &str) -> ServiceError {
    let json: Option<Value> = serde_json::from_str(body).ok();

    let code = error_type
        .and_then(|value| value.split(':').next())
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| {
            json.as_ref().and_then(|v| {
                v.get("__type")
                    .or_else(|| v.get("code"))
                    .and_then(Value::as_str)
                    .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
            })
        })
        .or_else(|| extract_xml_value(body, "Code"))
        .unwrap_or_else(|| format!("Http{status}"));

    let message = json
        .as_ref()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("Message"))
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        })
        .or_else(|| extract_xml_value(body, "Message"))
        .unwrap_or_else(|| body.chars().take(BODY_PREVIEW_CHARS).collect());

    ServiceError::new(code, message).with_status(status)
}

pub(crate) fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_code_from_error_type_header() {
        let err = parse_service_error(
            404,
            Some("ResourceNotFoundException:http://internal.amazon.com/coral/com.amazon.bedrock/"),
            r#"{"message":"Knowledge base KB1 is not found."}"#,
        );
        assert_eq!(err.code, "ResourceNotFoundException");
        assert_eq!(err.message, "Knowledge base KB1 is not found.");
        assert_eq!(err.status, Some(404));
    }

    #[test]
    fn reads_code_from_json_type_field() {
        let err = parse_service_error(
            400,
            None,
            r#"{"__type":"com.amazon.coral.validate#ValidationException","Message":"bad id"}"#,
        );
        assert_eq!(err.code, "ValidationException");
        assert_eq!(err.message, "bad id");
    }

    #[test]
    fn reads_code_from_s3_xml() {
        let body = "<?xml version=\"1.0\"?><Error><Code>NoSuchBucket</Code>\
                    <Message>The specified bucket does not exist</Message></Error>";
        let err = parse_service_error(404, None, body);
        assert_eq!(err.code, "NoSuchBucket");
        assert_eq!(err.message, "The specified bucket does not exist");
    }

    #[test]
    fn falls_back_to_status_code() {
        let err = parse_service_error(502, None, "bad gateway");
        assert_eq!(err.code, "Http502");
        assert_eq!(err.message, "bad gateway");
    }
}
