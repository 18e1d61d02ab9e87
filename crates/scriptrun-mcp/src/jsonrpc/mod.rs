//! JSON-RPC 2.0 message types.
//!
//! Inbound lines are classified by shape rather than deserialized into one
//! tagged enum, so a malformed message can still be answered with the id it
//! carried:
//!
//! - `method` + non-null `id` → [`Request`]
//! - `method` without `id` → [`Notification`]
//! - `result` or `error` without `method` → [`Response`]

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

pub mod framing;

pub use framing::{FrameError, FrameReader, FrameWriter};

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard and MCP-specific error codes.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const SERVER_NOT_INITIALIZED: i64 = -32002;
}

/// Caller-assigned request id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

/// Id source for requests this side originates.
///
/// Starts at 1 and only ever increases.
#[derive(Debug)]
pub struct RequestIdGenerator {
    next: AtomicI64,
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Error object carried by an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl fmt::Display) -> Self {
        Self::new(codes::PARSE_ERROR, format!("Parse error: {detail}"))
    }

    pub fn invalid_request(detail: impl fmt::Display) -> Self {
        Self::new(codes::INVALID_REQUEST, format!("Invalid request: {detail}"))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(detail: impl fmt::Display) -> Self {
        Self::new(codes::INVALID_PARAMS, format!("Invalid params: {detail}"))
    }

    pub fn internal_error(detail: impl fmt::Display) -> Self {
        Self::new(codes::INTERNAL_ERROR, format!("Internal error: {detail}"))
    }

    pub fn not_initialized() -> Self {
        Self::new(codes::SERVER_NOT_INITIALIZED, "Server not initialized")
    }
}

/// Either half of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(RpcError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// `None` only when answering a line whose id could not be read.
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            id,
            outcome: Outcome::Error(error),
        }
    }

    pub fn from_result(id: RequestId, result: Result<Value, RpcError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(e) => Self::error(Some(id), e),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

/// Adds the `"jsonrpc": "2.0"` member to whatever body it wraps.
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    jsonrpc: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Message::Request(body) => {
                Envelope { jsonrpc: JSONRPC_VERSION, body }.serialize(serializer)
            }
            Message::Response(body) => {
                Envelope { jsonrpc: JSONRPC_VERSION, body }.serialize(serializer)
            }
            Message::Notification(body) => {
                Envelope { jsonrpc: JSONRPC_VERSION, body }.serialize(serializer)
            }
        }
    }
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Message::Request(r)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Message::Response(r)
    }
}

impl From<Notification> for Message {
    fn from(n: Notification) -> Self {
        Message::Notification(n)
    }
}

impl Message {
    /// Classify one decoded JSON line.
    pub fn parse(line: &str) -> Result<Message, FrameError> {
        let value: Value = serde_json::from_str(line).map_err(FrameError::Parse)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Message, FrameError> {
        let Value::Object(mut map) = value else {
            return Err(FrameError::invalid(None, "message must be a JSON object"));
        };

        let id = take_id(&mut map).map_err(|reason| FrameError::invalid(None, reason))?;

        match map.get("jsonrpc") {
            None => {}
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            Some(other) => {
                return Err(FrameError::invalid(
                    id,
                    format!("unsupported jsonrpc version {other}"),
                ));
            }
        }

        let params = match map.remove("params") {
            None | Some(Value::Null) => Value::Null,
            Some(p @ (Value::Object(_) | Value::Array(_))) => p,
            Some(_) => return Err(FrameError::invalid(id, "params must be an object or array")),
        };

        match map.remove("method") {
            Some(Value::String(method)) => Ok(match id {
                Some(id) => Message::Request(Request { id, method, params }),
                None => Message::Notification(Notification { method, params }),
            }),
            Some(_) => Err(FrameError::invalid(id, "method must be a string")),
            None => {
                let outcome = if let Some(result) = map.remove("result") {
                    Outcome::Result(result)
                } else if let Some(error) = map.remove("error") {
                    let error = serde_json::from_value(error)
                        .map_err(|e| FrameError::invalid(id.clone(), format!("bad error object: {e}")))?;
                    Outcome::Error(error)
                } else {
                    return Err(FrameError::invalid(id, "missing method"));
                };
                Ok(Message::Response(Response { id, outcome }))
            }
        }
    }
}

/// Pull a usable id out of the object. Absent and `null` both mean "no id".
fn take_id(map: &mut Map<String, Value>) -> Result<Option<RequestId>, String> {
    match map.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(RequestId::String(s))),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(|n| Some(RequestId::Number(n)))
            .ok_or_else(|| format!("id must be an integer or string, got {n}")),
        Some(other) => Err(format!("id must be an integer or string, got {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(message: &Message) -> Value {
        serde_json::to_value(message).expect("serialize")
    }

    #[test]
    fn request_is_classified() {
        let msg = Message::parse(
            r#"{"jsonrpc":"2.0","id":7,"method":"list_scripts","params":{}}"#,
        )
        .expect("valid");
        assert_eq!(
            msg,
            Message::Request(Request::new(7i64, "list_scripts", json!({})))
        );
    }

    #[test]
    fn string_ids_are_accepted() {
        let msg = Message::parse(r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#).expect("valid");
        let Message::Request(req) = msg else {
            panic!("expected request");
        };
        assert_eq!(req.id, RequestId::String("abc".into()));
        assert!(req.params.is_null());
    }

    #[test]
    fn missing_id_is_a_notification() {
        let msg = Message::parse(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .expect("valid");
        assert!(matches!(msg, Message::Notification(n) if n.method == "notifications/initialized"));
    }

    #[test]
    fn null_id_is_a_notification() {
        let msg = Message::parse(r#"{"jsonrpc":"2.0","id":null,"method":"x"}"#).expect("valid");
        assert!(matches!(msg, Message::Notification(_)));
    }

    #[test]
    fn response_is_classified() {
        let msg = Message::parse(r#"{"jsonrpc":"2.0","id":3,"result":{"ok":true}}"#).expect("valid");
        assert_eq!(
            msg,
            Message::Response(Response::success(RequestId::Number(3), json!({"ok": true})))
        );
    }

    #[test]
    fn missing_method_keeps_the_id() {
        let err = Message::parse(r#"{"jsonrpc":"2.0","id":9,"params":{}}"#).expect_err("invalid");
        match err {
            FrameError::Invalid { id, .. } => assert_eq!(id, Some(RequestId::Number(9))),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_version_is_rejected() {
        let err = Message::parse(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).expect_err("invalid");
        assert!(matches!(err, FrameError::Invalid { .. }));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(matches!(
            Message::parse("[1,2,3]"),
            Err(FrameError::Invalid { id: None, .. })
        ));
    }

    #[test]
    fn fractional_id_is_rejected() {
        assert!(Message::parse(r#"{"jsonrpc":"2.0","id":1.5,"method":"ping"}"#).is_err());
    }

    #[test]
    fn scalar_params_are_rejected() {
        assert!(Message::parse(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":3}"#).is_err());
    }

    #[test]
    fn success_response_encoding() {
        let msg = Message::Response(Response::success(RequestId::Number(1), json!({"a": 1})));
        assert_eq!(encode(&msg), json!({"jsonrpc": "2.0", "id": 1, "result": {"a": 1}}));
    }

    #[test]
    fn error_response_encoding() {
        let msg = Message::Response(Response::error(
            Some(RequestId::Number(2)),
            RpcError::method_not_found("nope"),
        ));
        assert_eq!(
            encode(&msg),
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "error": {"code": -32601, "message": "Method not found: nope"}
            })
        );
    }

    #[test]
    fn unknown_id_encodes_as_null() {
        let msg = Message::Response(Response::error(None, RpcError::parse_error("bad")));
        assert_eq!(encode(&msg)["id"], Value::Null);
    }

    #[test]
    fn notification_encoding_has_no_id() {
        let msg = Message::Notification(Notification::new("notifications/initialized", Value::Null));
        assert_eq!(
            encode(&msg),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
        );
    }

    #[test]
    fn id_generator_is_monotonic_from_one() {
        let ids = RequestIdGenerator::new();
        assert_eq!(ids.next_id(), RequestId::Number(1));
        assert_eq!(ids.next_id(), RequestId::Number(2));
        assert_eq!(ids.next_id(), RequestId::Number(3));
    }
}
