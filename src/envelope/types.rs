//! Typed envelope model shared by the codec and the pipeline.

use serde_json::{Map, Value};

// ── Raw payload ─────────────────────────────────────────────────────

/// A transport payload before decoding.
///
/// Transports either hand over an already-deserialized record or plain text;
/// the codec handles both through a single match.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// A record whose fields are already available.
    Structured(Map<String, Value>),
    /// Unstructured text that may or may not contain JSON.
    Text(String),
}

impl RawPayload {
    /// Interpret a byte payload the way a JSON-deserializing consumer would.
    ///
    /// Returns `None` for an empty payload or a JSON `null` (tombstones).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Null) => None,
            Ok(Value::Object(map)) => Some(Self::Structured(map)),
            Ok(Value::String(text)) => Some(Self::Text(text)),
            _ => Some(Self::Text(String::from_utf8_lossy(bytes).into_owned())),
        }
    }

    /// True when there is nothing to process.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Structured(map) => map.is_empty(),
            Self::Text(text) => text.trim().is_empty(),
        }
    }

    /// Serialize for byte-oriented transports.
    pub fn to_json_string(&self) -> String {
        match self {
            Self::Structured(map) => Value::Object(map.clone()).to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

impl From<Value> for RawPayload {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Structured(map),
            Value::String(text) => Self::Text(text),
            other => Self::Text(other.to_string()),
        }
    }
}

// ── Message kind ────────────────────────────────────────────────────

/// The `type` tag carried by a record on the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    UserMessage,
    StudentMessage,
    User,
    /// Replies published by this relay.
    AssistantMessage,
    /// Missing, unrecognised, or unparseable.
    Unknown,
}

impl MessageKind {
    /// Map a wire tag to a kind. Unrecognised tags are `Unknown`.
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "user_message" => Self::UserMessage,
            "student_message" => Self::StudentMessage,
            "user" => Self::User,
            "assistant_message" => Self::AssistantMessage,
            _ => Self::Unknown,
        }
    }

    /// Wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserMessage => "user_message",
            Self::StudentMessage => "student_message",
            Self::User => "user",
            Self::AssistantMessage => "assistant_message",
            Self::Unknown => "unknown",
        }
    }

    /// Kinds whose records carry a conversational `content` field.
    pub fn carries_content(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Envelope ────────────────────────────────────────────────────────

/// Reply metadata, present only on records this relay published.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvelopeMeta {
    pub filtered: Option<bool>,
    pub filter_reason: Option<String>,
    pub message_id: Option<String>,
    pub timestamp_ms: Option<i64>,
}

/// One decoded message unit.
///
/// Built once by the codec and never mutated afterwards; replies are new
/// `OutboundReply` values.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    raw: RawPayload,
    kind: MessageKind,
    content: Option<String>,
    meta: EnvelopeMeta,
}

impl Envelope {
    pub fn new(raw: RawPayload, kind: MessageKind, content: Option<String>) -> Self {
        Self {
            raw,
            kind,
            content,
            meta: EnvelopeMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: EnvelopeMeta) -> Self {
        self.meta = meta;
        self
    }

    /// The payload as received, kept for fallback and logging.
    pub fn raw(&self) -> &RawPayload {
        &self.raw
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Content, but only if it has something other than whitespace.
    pub fn non_blank_content(&self) -> Option<&str> {
        self.content().filter(|c| !c.trim().is_empty())
    }

    pub fn meta(&self) -> &EnvelopeMeta {
        &self.meta
    }
}

// ── Outbound reply ──────────────────────────────────────────────────

/// A reply ready for encoding and publication.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundReply {
    pub content: String,
    pub filtered: bool,
    pub filter_reason: Option<String>,
    pub message_id: String,
    /// Wall-clock epoch milliseconds at composition time.
    pub timestamp_ms: i64,
}
