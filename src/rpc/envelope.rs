/// Request and response envelopes exchanged over the bus
///
/// `request_id` is supplied by the caller and is the only correlation token:
/// it is echoed verbatim in the response.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub request_id: String,

    #[serde(default)]
    pub api_key: String,

    /// Platform whose schema the caller speaks; may be filled from the topic
    #[serde(default)]
    pub platform: String,

    #[serde(default)]
    pub shop_id: String,

    /// Action name; falls back to the topic's last segment when empty
    #[serde(default)]
    pub action: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub params: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl RequestEnvelope {
    /// Non-blank string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Object parameter
    pub fn param_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.params.get(key).and_then(Value::as_object)
    }
}

/// Error codes carried in [`ErrorDetail::code`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Body was not a valid request envelope
    ParseError,
    /// No handler registered for the action
    UnknownAction,
    /// Missing, unknown or inactive API key
    Unauthorized,
    /// Key valid but the action is not allowed
    Forbidden,
    /// Required parameter missing or malformed
    BadRequest,
    /// Upstream call failed
    ApiError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "parse_error",
            ErrorCode::UnknownAction => "unknown_action",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::ApiError => "api_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
}

/// Response published to `responses/{request_id}`.
///
/// Exactly one of `data` and `error` is populated; the other serializes as
/// `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

impl ResponseEnvelope {
    pub fn success(request_id: impl Into<String>, data: Value) -> Self {
        Self {
            request_id: request_id.into(),
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(
        request_id: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            success: false,
            data: Value::Null,
            error: Some(ErrorDetail {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}
