//! Control frames: classification of inbound payloads and the JSON shapes of
//! the admin commands the client sends.
//!
//! A payload is a control frame only when it parses as exactly one JSON value
//! that ends at the last byte. Binary node frames can start with bytes that
//! look like JSON, so a partial parse falls back to binary.

use serde_json::{json, Map, Value};

use crate::error::{constants, ProtocolError, Result};

/// Version triple announced in `admin init`.
pub const CLIENT_VERSION: [u32; 3] = [0, 3, 2390];

/// Browser description announced in `admin init`.
pub const CLIENT_NAME: [&str; 2] = ["Chatwire", "Chatwire"];

/// Status the peer returns for an accepted admin command.
pub const STATUS_OK: i64 = 200;

/// Result of classifying an inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Control(Value),
    Binary,
}

/// Decide whether `payload` is a structured-text control value or binary data.
pub fn classify(payload: &[u8]) -> Frame {
    let mut values = serde_json::Deserializer::from_slice(payload).into_iter::<Value>();
    match values.next() {
        Some(Ok(value)) if values.byte_offset() == payload.len() => Frame::Control(value),
        _ => Frame::Binary,
    }
}

/// Action named by the first element of a control array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Conn,
    Cmd,
    Other(String),
}

impl Action {
    fn from_name(name: &str) -> Self {
        match name {
            "Conn" => Action::Conn,
            "Cmd" => Action::Cmd,
            other => Action::Other(other.to_owned()),
        }
    }
}

/// `[action, payload, ...]` with the payload left unchecked until a handler
/// needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlFrame {
    pub action: Action,
    payload: Option<Value>,
}

impl ControlFrame {
    /// `Ok(None)` for JSON values that are not arrays.
    pub fn parse(value: Value) -> Result<Option<Self>> {
        let Value::Array(items) = value else {
            return Ok(None);
        };
        let mut items = items.into_iter();
        let action = match items.next() {
            Some(Value::String(name)) => Action::from_name(&name),
            _ => return Err(ProtocolError::violation(constants::ERR_NOT_AN_ACTION)),
        };
        Ok(Some(Self {
            action,
            payload: items.next(),
        }))
    }

    pub fn payload_object(&self) -> Result<&Map<String, Value>> {
        match &self.payload {
            Some(Value::Object(map)) => Ok(map),
            _ => Err(ProtocolError::violation(constants::ERR_PAYLOAD_NOT_OBJECT)),
        }
    }
}

/// String field of a control payload, if present.
pub fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

/// String field whose absence is a protocol violation.
pub fn required_str<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    missing: &'static str,
) -> Result<&'a str> {
    str_field(obj, key).ok_or_else(|| ProtocolError::violation(missing))
}

/// Parse a response body and return its object.
pub fn response_object(payload: &[u8]) -> Result<Map<String, Value>> {
    match serde_json::from_slice::<Value>(payload)? {
        Value::Object(map) => Ok(map),
        _ => Err(ProtocolError::violation(constants::ERR_PAYLOAD_NOT_OBJECT)),
    }
}

/// Numeric `status` of a response body.
pub fn response_status(payload: &[u8]) -> Result<i64> {
    let obj = response_object(payload)?;
    obj.get("status")
        .and_then(Value::as_i64)
        .ok_or_else(|| ProtocolError::violation(constants::ERR_MISSING_STATUS))
}

/// Fail with `ProtocolViolation` unless the response carries status 200.
pub fn expect_ok(obj: &Map<String, Value>) -> Result<()> {
    match obj.get("status").and_then(Value::as_i64) {
        Some(STATUS_OK) => Ok(()),
        Some(status) => Err(ProtocolError::ProtocolViolation(format!(
            "Unexpected status {status}"
        ))),
        None => Err(ProtocolError::violation(constants::ERR_MISSING_STATUS)),
    }
}

pub fn init_request(client_id: &str) -> Value {
    json!(["admin", "init", CLIENT_VERSION, CLIENT_NAME, client_id, true])
}

pub fn login_request(client_token: &str, server_token: &str, client_id: &str) -> Value {
    json!([
        "admin",
        "login",
        client_token,
        server_token,
        client_id,
        "takeover"
    ])
}

pub fn challenge_request(solution: &str, server_token: &str, client_id: &str) -> Value {
    json!(["admin", "challenge", solution, server_token, client_id])
}
