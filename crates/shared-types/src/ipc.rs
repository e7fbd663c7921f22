//! # Wire Messages
//!
//! Request/response types exchanged between an RPC client and a dispatcher,
//! plus the call-scoped result types handed back to the gateway.
//!
//! ## Wire Shape
//!
//! ```text
//! request  = { "tag": { "cmd": "ping" }, "payload": {} }
//! response = { "result": <value> }
//!          | { "error": { "kind": "unknown_tag", "message": "..." } }
//! ```
//!
//! There is no correlation id on the wire: a connection carries at most one
//! outstanding request, so the next frame read is the answer to the last one
//! written.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Index;
use std::time::Duration;

/// Command name of the ping request.
pub const PING_COMMAND: &str = "ping";

/// Structured routing key of a request, e.g. `{cmd: "ping"}`.
///
/// Any JSON value decodes as a tag, so a well-formed request whose tag
/// matches no handler is routed to the `unknown_tag` answer rather than
/// rejected as malformed. Two tags match only if they are the same JSON
/// value: same keys, same values, same value types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(Value);

impl Tag {
    /// Key used by command-style tags.
    pub const CMD_KEY: &'static str = "cmd";

    /// Empty tag.
    pub fn new() -> Self {
        Self::default()
    }

    /// `{cmd: <command>}`
    pub fn cmd(command: impl Into<String>) -> Self {
        let command: String = command.into();
        Self::new().with(Self::CMD_KEY, command)
    }

    /// `{cmd: "ping"}`
    pub fn ping() -> Self {
        Self::cmd(PING_COMMAND)
    }

    /// Wrap an arbitrary JSON pattern.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Add or replace a key. A non-object tag is replaced by an object.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if !self.0.is_object() {
            self.0 = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = &mut self.0 {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// String value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// The tag as JSON.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Number of keys; zero for non-object tags.
    pub fn len(&self) -> usize {
        self.0.as_object().map_or(0, serde_json::Map::len)
    }

    /// True if the tag has no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }
}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

/// Hash consistent with `Value` equality: object keys are visited in
/// sorted order whatever the map's iteration order.
fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Number(n) => {
            2u8.hash(state);
            n.to_string().hash(state);
        }
        Value::String(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        Value::Array(items) => {
            4u8.hash(state);
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            5u8.hash(state);
            map.len().hash(state);
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                key.hash(state);
                hash_value(&map[key.as_str()], state);
            }
        }
    }
}

impl From<Value> for Tag {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tagged request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Selects the handler on the receiving side.
    pub tag: Tag,
    /// Opaque handler input.
    #[serde(default)]
    pub payload: Value,
}

impl Request {
    /// Create a request.
    pub fn new(tag: Tag, payload: Value) -> Self {
        Self { tag, payload }
    }

    /// The ping request: tag `{cmd: "ping"}`, empty payload.
    pub fn ping() -> Self {
        Self::new(Tag::ping(), Value::Object(serde_json::Map::new()))
    }
}

/// Category of an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireErrorKind {
    /// No handler registered for the request tag.
    UnknownTag,
    /// The handler ran and failed.
    HandlerFailed,
    /// The frame could not be decoded into a `Request`.
    MalformedRequest,
}

impl fmt::Display for WireErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTag => write!(f, "unknown_tag"),
            Self::HandlerFailed => write!(f, "handler_failed"),
            Self::MalformedRequest => write!(f, "malformed_request"),
        }
    }
}

/// Body of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: WireErrorKind,
    pub message: String,
}

/// A dispatcher's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    /// Handler output.
    Result(Value),
    /// Request could not be served.
    Error(WireError),
}

impl Response {
    /// Successful response.
    pub fn ok(result: Value) -> Self {
        Self::Result(result)
    }

    /// Error response.
    pub fn error(kind: WireErrorKind, message: impl Into<String>) -> Self {
        Self::Error(WireError {
            kind,
            message: message.into(),
        })
    }

    /// Error response for a tag nobody handles.
    pub fn unknown_tag(tag: &Tag) -> Self {
        Self::error(
            WireErrorKind::UnknownTag,
            format!("no handler registered for tag {}", tag),
        )
    }

    /// True for error responses.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Split into the handler output or the wire error.
    pub fn into_result(self) -> Result<Value, WireError> {
        match self {
            Self::Result(value) => Ok(value),
            Self::Error(error) => Err(error),
        }
    }
}

/// A response body together with the client-measured latency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedResult {
    /// Handler output.
    pub message: Value,
    /// Wall-clock time from send to receive, in milliseconds.
    pub duration_ms: u64,
}

impl TimedResult {
    /// Wrap a message with the elapsed time of its call.
    pub fn new(message: Value, elapsed: Duration) -> Self {
        Self {
            message,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// The message as text, if it is a JSON string.
    pub fn message_str(&self) -> Option<&str> {
        self.message.as_str()
    }
}

/// Results of one fan-out, one entry per requested service, in request order.
///
/// Serialises as a JSON object keyed by service name with keys in request
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedResult {
    entries: Vec<(String, TimedResult)>,
}

impl AggregatedResult {
    /// Empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries already in request order.
    pub fn from_entries(entries: Vec<(String, TimedResult)>) -> Self {
        Self { entries }
    }

    /// Number of services in the result.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no service was requested.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at request position `index`.
    pub fn get(&self, index: usize) -> Option<(&str, &TimedResult)> {
        self.entries
            .get(index)
            .map(|(name, result)| (name.as_str(), result))
    }

    /// Result for the named service.
    pub fn by_name(&self, name: &str) -> Option<&TimedResult> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, result)| result)
    }

    /// Service names in request order.
    pub fn service_names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Iterate entries in request order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TimedResult)> {
        self.entries
            .iter()
            .map(|(name, result)| (name.as_str(), result))
    }

    /// Consume into the ordered entries.
    pub fn into_entries(self) -> Vec<(String, TimedResult)> {
        self.entries
    }
}

impl Index<usize> for AggregatedResult {
    type Output = TimedResult;

    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index].1
    }
}

impl Serialize for AggregatedResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, result) in &self.entries {
            map.serialize_entry(name, result)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tag_exact_match() {
        assert_eq!(Tag::ping(), Tag::cmd("ping"));
        assert_ne!(Tag::ping(), Tag::cmd("pong"));
        // Same value under a different key is a different tag
        assert_ne!(Tag::ping(), Tag::new().with("op", "ping"));
        // Extra keys break the match
        assert_ne!(Tag::ping(), Tag::ping().with("version", "2"));
    }

    #[test]
    fn test_tag_values_keep_their_type() {
        assert_ne!(Tag::cmd("42"), Tag::new().with("cmd", 42));
        assert_eq!(Tag::new().with("cmd", 42), Tag::from_value(json!({ "cmd": 42 })));
        assert_eq!(Tag::new().with("cmd", 42).get("cmd"), None);
    }

    #[test]
    fn test_tag_decodes_any_json_pattern() {
        let request: Request =
            serde_json::from_value(json!({ "tag": "ping", "payload": null })).unwrap();
        assert_eq!(request.tag, Tag::from_value(json!("ping")));
        assert_ne!(request.tag, Tag::ping());
        assert!(request.tag.is_empty());

        let request: Request = serde_json::from_value(json!({ "tag": { "cmd": 42 } })).unwrap();
        assert_eq!(request.tag.to_string(), r#"{"cmd":42}"#);
    }

    #[test]
    fn test_equal_tags_hash_equal() {
        use std::collections::HashSet;

        let built = Tag::cmd("echo").with("v", "1");
        let decoded: Tag = serde_json::from_str(r#"{"v":"1","cmd":"echo"}"#).unwrap();
        assert_eq!(built, decoded);

        let set: HashSet<Tag> = [built].into_iter().collect();
        assert!(set.contains(&decoded));
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(Tag::ping().to_string(), r#"{"cmd":"ping"}"#);
    }

    #[test]
    fn test_request_wire_shape() {
        let value = serde_json::to_value(Request::ping()).unwrap();
        assert_eq!(value, json!({ "tag": { "cmd": "ping" }, "payload": {} }));
    }

    #[test]
    fn test_request_payload_defaults_to_null() {
        let request: Request = serde_json::from_value(json!({ "tag": { "cmd": "ping" } })).unwrap();
        assert_eq!(request.tag, Tag::ping());
        assert_eq!(request.payload, Value::Null);
    }

    #[test]
    fn test_response_wire_shape() {
        let ok = serde_json::to_value(Response::ok(json!("pong"))).unwrap();
        assert_eq!(ok, json!({ "result": "pong" }));

        let err = serde_json::to_value(Response::unknown_tag(&Tag::cmd("nope"))).unwrap();
        assert_eq!(err["error"]["kind"], "unknown_tag");
        assert!(err["error"]["message"].as_str().unwrap().contains("nope"));
    }

    #[test]
    fn test_response_into_result() {
        assert_eq!(Response::ok(json!(1)).into_result().unwrap(), json!(1));
        let err = Response::error(WireErrorKind::HandlerFailed, "boom")
            .into_result()
            .unwrap_err();
        assert_eq!(err.kind, WireErrorKind::HandlerFailed);
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn test_timed_result_millis() {
        let result = TimedResult::new(json!("pong"), Duration::from_micros(1_500_900));
        assert_eq!(result.duration_ms, 1500);
        assert_eq!(result.message_str(), Some("pong"));
    }

    #[test]
    fn test_aggregated_result_keeps_request_order() {
        let result = AggregatedResult::from_entries(vec![
            ("SERVICE_B".to_string(), TimedResult::new(json!("b"), Duration::from_millis(5))),
            ("SERVICE_A".to_string(), TimedResult::new(json!("a"), Duration::from_millis(9))),
        ]);

        assert_eq!(result.service_names(), vec!["SERVICE_B", "SERVICE_A"]);
        assert_eq!(result[0].message, json!("b"));
        assert_eq!(result.by_name("SERVICE_A").unwrap().duration_ms, 9);

        let json = serde_json::to_string(&result).unwrap();
        let b = json.find("SERVICE_B").unwrap();
        let a = json.find("SERVICE_A").unwrap();
        assert!(b < a, "keys must follow request order: {}", json);
    }
}
