//! Response envelope decoding
//!
//! Upstream bodies are either `{"data": ...}` or `{"code": n, "message": "..."}`.
//! Decoding goes through a single untagged enum and fails closed: a body that
//! fits neither shape is a validation error.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::error::UpstreamError;

/// Longest body excerpt quoted in error messages
const BODY_EXCERPT_LEN: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Success { data: T },
    Failure { code: i64, message: String },
}

/// Decodes a 2xx body into its payload
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, UpstreamError> {
    let envelope: Envelope<T> = serde_json::from_slice(body).map_err(|e| {
        UpstreamError::Validation(format!("{} (body: {})", e, excerpt(body)))
    })?;

    match envelope {
        Envelope::Success { data } => Ok(data),
        Envelope::Failure { code, message } if code != 200 => {
            Err(UpstreamError::Api { code, message })
        }
        Envelope::Failure { message, .. } => Err(UpstreamError::Validation(format!(
            "error envelope carries success code 200: {}",
            message
        ))),
    }
}

/// Builds the error for a non-2xx response
///
/// The HTTP status is authoritative; the message comes from an error envelope
/// when the body has one.
pub fn status_error(status: u16, body: &[u8]) -> UpstreamError {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            let text = excerpt(body);
            if text.is_empty() {
                format!("HTTP {}", status)
            } else {
                text
            }
        });

    UpstreamError::Api {
        code: i64::from(status),
        message,
    }
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_success_envelope_list() {
        let data: Vec<u32> = decode(br#"{"data": [1, 2, 3]}"#).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn test_success_envelope_object_with_extra_fields() {
        let data: Value = decode(br#"{"code": 200, "message": "ok", "data": {"a": 1}}"#).unwrap();
        assert_eq!(data["a"], 1);
    }

    #[test]
    fn test_error_envelope() {
        let err = decode::<Value>(br#"{"code": 503, "message": "maintenance"}"#).unwrap_err();
        assert!(matches!(err, UpstreamError::Api { code: 503, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_envelope_with_success_code_is_invalid() {
        let err = decode::<Value>(br#"{"code": 200, "message": "ok"}"#).unwrap_err();
        assert!(matches!(err, UpstreamError::Validation(_)));
    }

    #[test]
    fn test_unknown_shapes_fail_closed() {
        for body in [
            &br#"{"items": []}"#[..],
            br#"[1, 2]"#,
            br#"not json"#,
            br#"{"code": "x", "message": 1}"#,
            br#"{"data": null}"#,
        ] {
            let err = decode::<Vec<u32>>(body).unwrap_err();
            assert!(
                matches!(err, UpstreamError::Validation(_)),
                "expected validation error for {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_status_error_prefers_envelope_message() {
        let err = status_error(404, br#"{"code": 404, "message": "no such listing"}"#);
        assert_eq!(err.code(), Some(404));
        assert!(err.to_string().contains("no such listing"));

        let err = status_error(502, b"");
        assert!(err.to_string().contains("HTTP 502"));
    }
}
