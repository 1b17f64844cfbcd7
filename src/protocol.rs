//! Response envelope shared by the HTTP server and client.
//!
//! Every queue endpoint answers `{"message": ..., "error"?: ...}` with
//! status 200; failures are signalled in the body, not the status code.

use serde::{Deserialize, Serialize};

use crate::constants::MSG_ERROR;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: None,
        }
    }

    pub fn error(error: impl ToString) -> Self {
        Self {
            message: MSG_ERROR.to_string(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.message.eq_ignore_ascii_case(MSG_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_field_omitted_when_absent() {
        let json = serde_json::to_string(&Envelope::ok("ok")).unwrap();
        assert_eq!(json, r#"{"message":"ok"}"#);
    }

    #[test]
    fn test_error_envelope() {
        let envelope = Envelope::error("channel not found: x");
        assert!(envelope.is_error());
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["message"], "error");
        assert_eq!(json["error"], "channel not found: x");
    }

    #[test]
    fn test_parse_without_error_field() {
        let envelope: Envelope = serde_json::from_str(r#"{"message": "empty"}"#).unwrap();
        assert_eq!(envelope, Envelope::ok("empty"));
        assert!(!envelope.is_error());
    }
}
