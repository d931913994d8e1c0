use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, RpcError};
use crate::protocol::JSONRPC_VERSION;

/// Identifier correlating a request with its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    /// Integer ids above `i64::MAX`. Smaller values are always `Number`.
    Unsigned(u64),
    String(String),
}

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

impl RequestId {
    /// Read an id from a JSON value.
    ///
    /// Every JSON integer is an id. Floats count only when integral and
    /// within 2^53, where the conversion is exact; anything else that is
    /// not an integer or a string is not an id.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(n) = n.as_i64() {
                    return Some(Self::Number(n));
                }
                if let Some(n) = n.as_u64() {
                    return Some(Self::Unsigned(n));
                }
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT)
                    .map(|f| Self::Number(f as i64))
            }
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    /// Whether a JSON `id` value refers to this id.
    pub fn matches(&self, value: &Value) -> bool {
        RequestId::from_value(value).as_ref() == Some(self)
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::Unsigned(n) => Value::from(*n),
            Self::String(s) => Value::from(s.as_str()),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Unsigned(value),
        }
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Unsigned(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// One JSON-RPC message: a JSON object recognised by the members it has.
///
/// - request: `id` and `method`
/// - notification: `method`, no `id`
/// - response: `result` or `error`, usually echoing `id`
///
/// Unknown members are kept as-is, so a message round-trips unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    /// Build a request.
    pub fn request(id: impl Into<RequestId>, method: &str, params: Option<Value>) -> Self {
        let mut message = Self::notification(method, params);
        message.set_id(&id.into());
        message
    }

    /// Build a notification (no `id`).
    pub fn notification(method: &str, params: Option<Value>) -> Self {
        let mut map = Map::new();
        map.insert("jsonrpc".to_string(), Value::from(JSONRPC_VERSION));
        map.insert("method".to_string(), Value::from(method));
        if let Some(params) = params {
            map.insert("params".to_string(), params);
        }
        Self(map)
    }

    /// Wrap a parsed JSON value. Returns `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Parse one line of text. Returns `None` for anything but a JSON object.
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok().and_then(Self::from_value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    /// The `id` member as a [`RequestId`], if it is a usable id.
    pub fn request_id(&self) -> Option<RequestId> {
        self.id().and_then(RequestId::from_value)
    }

    pub fn set_id(&mut self, id: &RequestId) {
        self.0.insert("id".to_string(), id.to_value());
    }

    pub fn method(&self) -> Option<&str> {
        self.0.get("method").and_then(Value::as_str)
    }

    pub fn params(&self) -> Option<&Value> {
        self.0.get("params")
    }

    pub fn result(&self) -> Option<&Value> {
        self.0.get("result")
    }

    pub fn error(&self) -> Option<&Value> {
        self.0.get("error")
    }

    /// Whether this message carries `result` or `error`.
    pub fn is_response(&self) -> bool {
        self.0.contains_key("result") || self.0.contains_key("error")
    }

    /// Whether `method` starts with the given notification prefix.
    pub fn is_notification(&self, prefix: &str) -> bool {
        self.method().is_some_and(|method| method.starts_with(prefix))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Compact single-line JSON. Non-ASCII text is written as-is.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Convert a matched response into its `result`, or the remote error.
    ///
    /// A response with neither member yields `Value::Null`.
    pub fn into_result(mut self) -> Result<Value> {
        if let Some(error) = self.0.remove("error") {
            return Err(remote_error(error));
        }
        Ok(self.0.remove("result").unwrap_or(Value::Null))
    }
}

impl From<Map<String, Value>> for Message {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(line) => f.write_str(&line),
            Err(_) => Err(fmt::Error),
        }
    }
}

fn remote_error(error: Value) -> RpcError {
    match error {
        Value::Object(mut fields) => RpcError::Remote {
            code: fields.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: match fields.remove("message") {
                Some(Value::String(message)) => message,
                Some(other) => other.to_string(),
                None => String::new(),
            },
            data: fields.remove("data"),
        },
        Value::String(message) => RpcError::Remote {
            code: 0,
            message,
            data: None,
        },
        other => RpcError::Remote {
            code: 0,
            message: other.to_string(),
            data: None,
        },
    }
}
