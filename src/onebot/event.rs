//! OneBot v11 event payloads.

use serde::Deserialize;
use serde_json::Value;

use crate::error::AdapterError;
use crate::event::{MessageEvent, MessageSegment, json_id};

/// A decoded post from the OneBot implementation.
#[derive(Debug)]
pub enum OneBotPost {
    Message(MessageEvent),
    /// Notices, requests, meta events: nothing to audit.
    Ignored { post_type: String },
}

#[derive(Debug, Deserialize)]
struct RawPost {
    post_type: String,
    #[serde(default)]
    message_type: Option<String>,
    #[serde(default)]
    message_id: Option<Value>,
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    group_id: Option<Value>,
    #[serde(default)]
    sender: Option<RawSender>,
    #[serde(default)]
    message: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSender {
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    card: Option<String>,
}

/// Decode a posted event body.
///
/// Message posts become `MessageEvent`s without an action invoker; the caller
/// attaches one. String-form messages (CQ codes) carry no segments.
pub fn parse_post(body: Value) -> Result<OneBotPost, AdapterError> {
    let raw: RawPost =
        serde_json::from_value(body).map_err(|e| AdapterError::InvalidEvent(e.to_string()))?;

    if raw.post_type != "message" {
        return Ok(OneBotPost::Ignored {
            post_type: raw.post_type,
        });
    }

    let sender_id = raw
        .user_id
        .as_ref()
        .and_then(json_id)
        .ok_or_else(|| AdapterError::MissingField("user_id".into()))?;

    let group_id = match raw.message_type.as_deref() {
        Some("group") => Some(
            raw.group_id
                .as_ref()
                .and_then(json_id)
                .ok_or_else(|| AdapterError::MissingField("group_id".into()))?,
        ),
        _ => None,
    };

    let sender = raw.sender.unwrap_or_default();
    let sender_name = [sender.card, sender.nickname]
        .into_iter()
        .flatten()
        .find(|name| !name.trim().is_empty())
        .unwrap_or_else(|| sender_id.clone());

    let segments = match &raw.message {
        Some(Value::Array(items)) => items.iter().map(parse_segment).collect(),
        _ => Vec::new(),
    };

    let mut event = MessageEvent::new(group_id, sender_id, sender_name, segments);
    if let Some(message) = raw.message {
        event = event.with_raw_segments(message);
    }
    if let Some(id) = raw.message_id.as_ref().and_then(json_id) {
        event = event.with_message_id(id);
    }

    Ok(OneBotPost::Message(event))
}

fn parse_segment(segment: &Value) -> MessageSegment {
    if segment.get("type").and_then(Value::as_str) != Some("image") {
        return MessageSegment::Other;
    }

    let data = segment.get("data");
    let field = |key: &str| {
        data.and_then(|d| d.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let url = field("url").or_else(|| {
        field("file").filter(|f| f.starts_with("http://") || f.starts_with("https://"))
    });

    MessageSegment::Image {
        url: url.map(String::from),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn message(post: Value) -> MessageEvent {
        match parse_post(post).unwrap() {
            OneBotPost::Message(event) => event,
            other => panic!("Expected message, got {:?}", other),
        }
    }

    #[test]
    fn parses_group_message() {
        let event = message(json!({
            "post_type": "message",
            "message_type": "group",
            "message_id": 123456,
            "user_id": 3001,
            "group_id": 2001,
            "sender": {"nickname": "mallory", "card": "Mal"},
            "message": [
                {"type": "text", "data": {"text": "look"}},
                {"type": "image", "data": {"file": "abc.image", "url": "https://cdn.example.com/a.png", "sub_type": 0}}
            ]
        }));

        assert_eq!(event.group_id.as_deref(), Some("2001"));
        assert_eq!(event.sender_id, "3001");
        assert_eq!(event.sender_name, "Mal");
        assert_eq!(event.message_id(), Some("123456"));
        assert_eq!(
            event.segments,
            vec![
                MessageSegment::Other,
                MessageSegment::image("https://cdn.example.com/a.png")
            ]
        );
        assert_eq!(event.raw_segment_list().len(), 2);
        assert!(event.action_invoker().is_none());
    }

    #[test]
    fn private_message_uses_nickname_when_card_empty() {
        let event = message(json!({
            "post_type": "message",
            "message_type": "private",
            "message_id": 1,
            "user_id": "42",
            "sender": {"nickname": "alice", "card": ""},
            "message": []
        }));
        assert!(!event.is_group());
        assert_eq!(event.sender_name, "alice");
    }

    #[test]
    fn sender_name_falls_back_to_user_id() {
        let event = message(json!({
            "post_type": "message",
            "message_type": "private",
            "user_id": 42,
            "message": []
        }));
        assert_eq!(event.sender_name, "42");
        assert!(event.message_id().is_none());
    }

    #[test]
    fn file_url_used_when_url_missing() {
        let event = message(json!({
            "post_type": "message",
            "message_type": "group",
            "user_id": 1,
            "group_id": 2,
            "message": [
                {"type": "image", "data": {"file": "https://x/b.jpg"}},
                {"type": "image", "data": {"file": "local.image"}}
            ]
        }));
        assert_eq!(
            event.segments,
            vec![
                MessageSegment::image("https://x/b.jpg"),
                MessageSegment::Image { url: None }
            ]
        );
    }

    #[test]
    fn string_message_has_no_segments() {
        let event = message(json!({
            "post_type": "message",
            "message_type": "group",
            "user_id": 1,
            "group_id": 2,
            "message": "[CQ:image,file=abc.image]"
        }));
        assert!(event.segments.is_empty());
        assert!(event.raw_segment_list().is_empty());
    }

    #[test]
    fn non_message_posts_are_ignored() {
        let post = parse_post(json!({"post_type": "meta_event", "meta_event_type": "heartbeat"}))
            .unwrap();
        assert!(matches!(post, OneBotPost::Ignored { post_type } if post_type == "meta_event"));
    }

    #[test]
    fn group_message_without_group_id_is_rejected() {
        let err = parse_post(json!({
            "post_type": "message",
            "message_type": "group",
            "user_id": 1,
            "message": []
        }))
        .unwrap_err();
        assert!(matches!(err, AdapterError::MissingField(field) if field == "group_id"));
    }

    #[test]
    fn missing_post_type_is_invalid() {
        assert!(matches!(
            parse_post(json!({"foo": 1})),
            Err(AdapterError::InvalidEvent(_))
        ));
    }
}
