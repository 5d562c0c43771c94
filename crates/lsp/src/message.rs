//! The JSON-RPC message model: requests, notifications, responses, and the
//! decode-time classification algorithm that tells them apart.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const JSONRPC_VERSION: &str = "2.0";

/// A request or response id. LSP allows either shape on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Integer(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Integer(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Integer(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

/// Standard JSON-RPC / LSP error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerNotInitialized,
    UnknownErrorCode,
    RequestCancelled,
    ContentModified,
    /// A code the spec doesn't name explicitly, carried through verbatim.
    Other(i32),
}

impl ErrorCode {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ServerNotInitialized => -32002,
            ErrorCode::UnknownErrorCode => -32001,
            ErrorCode::RequestCancelled => -32800,
            ErrorCode::ContentModified => -32801,
            ErrorCode::Other(code) => code,
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> i32 {
        code.code()
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> ErrorCode {
        match code {
            -32700 => ErrorCode::ParseError,
            -32600 => ErrorCode::InvalidRequest,
            -32601 => ErrorCode::MethodNotFound,
            -32602 => ErrorCode::InvalidParams,
            -32603 => ErrorCode::InternalError,
            -32002 => ErrorCode::ServerNotInitialized,
            -32001 => ErrorCode::UnknownErrorCode,
            -32800 => ErrorCode::RequestCancelled,
            -32801 => ErrorCode::ContentModified,
            other => ErrorCode::Other(other),
        }
    }
}

/// The error half of a [`Response`].
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct ResponseError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// An inbound or outbound request: a method call expecting exactly one
/// response.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

/// A fire-and-forget call: no id, no response.
#[derive(Debug, Clone)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

/// A reply to a [`Request`]. `result` is `Ok` for success, `Err` for
/// failure — the wire never carries both, and this shape makes that
/// invariant unrepresentable rather than merely documented.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: Option<RequestId>,
    pub result: Result<Value, ResponseError>,
}

/// One decoded wire message, classified per the JSON-RPC shape rules: a
/// `method` plus `id` is a request, a `method` with no `id` is a
/// notification, and an `id` with `result` or `error` (but no `method`) is a
/// response.
#[derive(Debug, Clone)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

#[derive(Serialize)]
struct WireRequest<'a> {
    jsonrpc: &'a str,
    id: &'a RequestId,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: &'a Option<Value>,
}

#[derive(Serialize)]
struct WireNotification<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: &'a Option<Value>,
}

#[derive(Serialize)]
struct WireResponseOk<'a> {
    jsonrpc: &'a str,
    id: &'a Option<RequestId>,
    result: &'a Value,
}

#[derive(Serialize)]
struct WireResponseErr<'a> {
    jsonrpc: &'a str,
    id: &'a Option<RequestId>,
    error: &'a ResponseError,
}

impl Message {
    /// Encodes this message to the JSON value that goes on the wire.
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which only happens for pathological
    /// `params`/`result` values containing non-finite floats or map keys
    /// that aren't strings — neither of which a well-formed LSP payload
    /// produces.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let value = match self {
            Message::Request(req) => serde_json::to_value(WireRequest {
                jsonrpc: JSONRPC_VERSION,
                id: &req.id,
                method: &req.method,
                params: &req.params,
            }),
            Message::Notification(notif) => serde_json::to_value(WireNotification {
                jsonrpc: JSONRPC_VERSION,
                method: &notif.method,
                params: &notif.params,
            }),
            Message::Response(resp) => match &resp.result {
                Ok(result) => serde_json::to_value(WireResponseOk {
                    jsonrpc: JSONRPC_VERSION,
                    id: &resp.id,
                    result,
                }),
                Err(error) => serde_json::to_value(WireResponseErr {
                    jsonrpc: JSONRPC_VERSION,
                    id: &resp.id,
                    error,
                }),
            },
        };
        value.expect("message fields serialize to JSON")
    }

    /// Classifies and decodes a raw JSON value per the shape rules
    /// documented on [`Message`]. Unknown top-level fields (including a
    /// mismatched or absent `jsonrpc`) are ignored.
    pub fn from_value(value: Value) -> Result<Message, String> {
        let Value::Object(mut obj) = value else {
            return Err("message must be a JSON object".to_string());
        };

        let method = obj.remove("method");
        // A JSON `null` id is the wire's way of saying "no id", used e.g. by
        // a `ParseError` response to a request whose id couldn't be read.
        // Treat it exactly like an absent `id` field rather than trying (and
        // failing) to decode it as a `RequestId`.
        let id = obj.remove("id").filter(|v| !v.is_null());
        let has_result = obj.contains_key("result");
        let has_error = obj.contains_key("error");

        match (method, id) {
            (Some(method), Some(id)) => {
                let method = method
                    .as_str()
                    .ok_or_else(|| "method must be a string".to_string())?
                    .to_string();
                let id: RequestId =
                    serde_json::from_value(id).map_err(|e| format!("invalid request id: {e}"))?;
                Ok(Message::Request(Request {
                    id,
                    method,
                    params: obj.remove("params"),
                }))
            }
            (Some(method), None) => {
                let method = method
                    .as_str()
                    .ok_or_else(|| "method must be a string".to_string())?
                    .to_string();
                Ok(Message::Notification(Notification {
                    method,
                    params: obj.remove("params"),
                }))
            }
            (None, id) if has_result || has_error => {
                let id: Option<RequestId> = id
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| format!("invalid response id: {e}"))?;
                let result = if has_error {
                    let error: ResponseError = serde_json::from_value(obj.remove("error").unwrap())
                        .map_err(|e| format!("invalid error object: {e}"))?;
                    Err(error)
                } else {
                    Ok(obj.remove("result").unwrap())
                };
                Ok(Message::Response(Response { id, result }))
            }
            _ => Err("message has neither a method nor a result/error".to_string()),
        }
    }
}
