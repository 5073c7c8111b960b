//! Typed inbound message event and the outbound action capability.
//!
//! Adapters (see `onebot`) convert their native payloads into `MessageEvent`.
//! Optional capabilities are plain `Option`s: a missing message id or action
//! invoker is a normal branch, never an error.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ActionError;

/// One component of a message, in message order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSegment {
    /// A picture. `url` is absent when the backend did not resolve one.
    Image { url: Option<String> },
    /// Anything else (text, at, reply, face...).
    Other,
}

impl MessageSegment {
    pub fn image(url: impl Into<String>) -> Self {
        Self::Image {
            url: Some(url.into()),
        }
    }
}

/// Remote procedure call into the messaging backend.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    /// Invoke `action` with JSON `params`, returning the backend's data payload.
    async fn call_action(&self, action: &str, params: Value) -> Result<Value, ActionError>;
}

/// A message received from the messaging backend.
#[derive(Clone)]
pub struct MessageEvent {
    /// Group the message was posted in. `None` for private chats.
    pub group_id: Option<String>,
    pub sender_id: String,
    pub sender_name: String,
    pub segments: Vec<MessageSegment>,
    /// Protocol-level segment array, kept for sticker probing.
    pub raw_segments: Option<Value>,
    pub message_id: Option<String>,
    invoker: Option<Arc<dyn ActionInvoker>>,
}

impl std::fmt::Debug for MessageEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageEvent")
            .field("group_id", &self.group_id)
            .field("sender_id", &self.sender_id)
            .field("sender_name", &self.sender_name)
            .field("segments", &self.segments)
            .field("message_id", &self.message_id)
            .field("has_invoker", &self.invoker.is_some())
            .finish()
    }
}

impl MessageEvent {
    pub fn new(
        group_id: Option<String>,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        segments: Vec<MessageSegment>,
    ) -> Self {
        Self {
            group_id: group_id.filter(|g| !g.is_empty()),
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            segments,
            raw_segments: None,
            message_id: None,
            invoker: None,
        }
    }

    pub fn with_raw_segments(mut self, raw: Value) -> Self {
        self.raw_segments = Some(raw);
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        let id: String = id.into();
        self.message_id = (!id.is_empty()).then_some(id);
        self
    }

    pub fn with_invoker(mut self, invoker: Arc<dyn ActionInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn is_group(&self) -> bool {
        self.group_id.is_some()
    }

    /// Group id, or empty for private chats.
    pub fn group_id_or_empty(&self) -> &str {
        self.group_id.as_deref().unwrap_or("")
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn action_invoker(&self) -> Option<&Arc<dyn ActionInvoker>> {
        self.invoker.as_ref()
    }

    /// Raw protocol segments as a slice, if the raw form is a segment array.
    pub fn raw_segment_list(&self) -> &[Value] {
        match &self.raw_segments {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }
}

/// Sticker sub-type of a raw `image` segment.
///
/// Returns `None` for non-image segments and for anything whose shape cannot
/// be read. A missing `sub_type` on an image segment reads as `0`.
pub fn sticker_sub_type(segment: &Value) -> Option<i64> {
    let obj = segment.as_object()?;
    if obj.get("type")?.as_str()? != "image" {
        return None;
    }
    let data = match obj.get("data") {
        None | Some(Value::Null) => return Some(0),
        Some(data) => data.as_object()?,
    };
    match data.get("sub_type") {
        None | Some(Value::Null) => Some(0),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    }
}

/// Read an id that may arrive as a JSON string or number.
pub fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Encode an id for a backend action: numeric ids go out as JSON integers.
pub fn id_param(id: &str) -> Value {
    match id.trim().parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(id),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_group_id_means_private() {
        let event = MessageEvent::new(Some(String::new()), "1", "alice", vec![]);
        assert!(!event.is_group());
        assert_eq!(event.group_id_or_empty(), "");
    }

    #[test]
    fn empty_message_id_is_absent() {
        let event = MessageEvent::new(None, "1", "alice", vec![]).with_message_id("");
        assert!(event.message_id().is_none());
    }

    #[test]
    fn sticker_sub_type_reads_int_and_string() {
        assert_eq!(
            sticker_sub_type(&json!({"type": "image", "data": {"sub_type": 1}})),
            Some(1)
        );
        assert_eq!(
            sticker_sub_type(&json!({"type": "image", "data": {"sub_type": "0"}})),
            Some(0)
        );
        assert_eq!(
            sticker_sub_type(&json!({"type": "image", "data": {"file": "a.png"}})),
            Some(0)
        );
    }

    #[test]
    fn sticker_sub_type_unreadable_is_none() {
        assert_eq!(sticker_sub_type(&json!("image")), None);
        assert_eq!(sticker_sub_type(&json!({"type": "text", "data": {}})), None);
        assert_eq!(
            sticker_sub_type(&json!({"type": "image", "data": {"sub_type": "abc"}})),
            None
        );
        assert_eq!(
            sticker_sub_type(&json!({"type": "image", "data": "oops"})),
            None
        );
    }

    #[test]
    fn id_param_prefers_integers() {
        assert_eq!(id_param("123"), json!(123));
        assert_eq!(id_param("abc"), json!("abc"));
    }

    #[test]
    fn raw_segment_list_ignores_non_arrays() {
        let event = MessageEvent::new(None, "1", "a", vec![]).with_raw_segments(json!("[CQ:image]"));
        assert!(event.raw_segment_list().is_empty());
    }
}
