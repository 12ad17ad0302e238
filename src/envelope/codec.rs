//! Envelope codec — wire payloads to typed envelopes and back.

use serde_json::{Map, Value};

use crate::envelope::types::{Envelope, EnvelopeMeta, MessageKind, OutboundReply, RawPayload};

/// Decode a transport payload into an envelope. Never fails.
pub fn decode(raw: RawPayload) -> Envelope {
    match &raw {
        RawPayload::Structured(map) => {
            let (kind, content, meta) = read_record(map);
            Envelope::new(raw, kind, content).with_meta(meta)
        }
        RawPayload::Text(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => {
                let (kind, content, meta) = read_record(&map);
                // A JSON record without usable content is forwarded verbatim.
                let content = match (kind, content) {
                    (MessageKind::AssistantMessage, content) => content,
                    (_, Some(content)) => Some(content),
                    (_, None) => Some(text.clone()),
                };
                Envelope::new(raw, kind, content).with_meta(meta)
            }
            Ok(Value::String(inner)) => Envelope::new(raw, MessageKind::Unknown, Some(inner)),
            _ => {
                let content = Some(text.clone());
                Envelope::new(raw, MessageKind::Unknown, content)
            }
        },
    }
}

/// Read `type`, `content`, and reply metadata from a record.
fn read_record(map: &Map<String, Value>) -> (MessageKind, Option<String>, EnvelopeMeta) {
    let kind = map
        .get("type")
        .and_then(Value::as_str)
        .map(MessageKind::from_wire)
        .unwrap_or(MessageKind::Unknown);

    let content = if kind.carries_content() {
        map.get("content").and_then(Value::as_str).map(String::from)
    } else {
        None
    };

    let meta = if kind == MessageKind::AssistantMessage {
        EnvelopeMeta {
            filtered: map.get("filtered").and_then(Value::as_bool),
            filter_reason: map
                .get("filter_reason")
                .and_then(Value::as_str)
                .map(String::from),
            message_id: map
                .get("messageId")
                .and_then(Value::as_str)
                .map(String::from),
            timestamp_ms: map.get("timestamp").and_then(read_millis),
        }
    } else {
        EnvelopeMeta::default()
    };

    (kind, content, meta)
}

/// Epoch milliseconds from an integer or floating-point number.
fn read_millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|ms| ms.trunc() as i64))
}

/// Encode a reply as a structured wire record.
///
/// `filter_reason` is omitted unless set.
pub fn encode(reply: &OutboundReply) -> RawPayload {
    let mut map = Map::new();
    map.insert(
        "type".into(),
        Value::from(MessageKind::AssistantMessage.as_str()),
    );
    map.insert("content".into(), Value::from(reply.content.as_str()));
    map.insert("filtered".into(), Value::from(reply.filtered));
    if let Some(ref reason) = reply.filter_reason {
        map.insert("filter_reason".into(), Value::from(reason.as_str()));
    }
    map.insert("timestamp".into(), Value::from(reply.timestamp_ms));
    map.insert("messageId".into(), Value::from(reply.message_id.as_str()));
    RawPayload::Structured(map)
}
