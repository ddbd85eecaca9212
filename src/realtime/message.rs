use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message sent or received over the realtime websocket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub event: ChannelEvent,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub message_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl RealtimeMessage {
    pub fn new(topic: &str, event: ChannelEvent, payload: Value, message_ref: Option<String>) -> Self {
        Self {
            topic: topic.to_string(),
            event,
            payload,
            message_ref,
            join_ref: None,
        }
    }
}

/// Channel events, including the Phoenix protocol ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEvent {
    PostgresChanges,

    #[serde(rename = "phx_join")]
    PhoenixJoin,
    #[serde(rename = "phx_reply")]
    PhoenixReply,
    #[serde(rename = "phx_error")]
    PhoenixError,
    #[serde(rename = "phx_close")]
    PhoenixClose,
    #[serde(rename = "phx_leave")]
    PhoenixLeave,

    Heartbeat,
    System,
    PresenceState,

    #[serde(other)]
    Unknown,
}

/// Payload of a `phx_reply`
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyPayload {
    pub status: String,
    #[serde(default)]
    pub response: Value,
}

impl ReplyPayload {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Payload of a `postgres_changes` event
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePayload {
    pub data: PostgresChange,
}

/// A single row change on a watched table
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub schema: Option<String>,
    pub table: String,
    #[serde(default)]
    pub record: Value,
    #[serde(default)]
    pub old_record: Value,
    pub commit_timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_change_message() {
        let msg: RealtimeMessage = serde_json::from_value(json!({
            "topic": "realtime:recipes",
            "event": "postgres_changes",
            "payload": {
                "ids": [1],
                "data": {
                    "type": "INSERT",
                    "schema": "public",
                    "table": "recipes",
                    "record": { "id": "r1", "title": "Pasta" },
                    "commit_timestamp": "2024-01-01T00:00:00Z"
                }
            },
            "ref": null
        }))
        .unwrap();

        assert_eq!(msg.event, ChannelEvent::PostgresChanges);
        let payload: ChangePayload = serde_json::from_value(msg.payload).unwrap();
        assert_eq!(payload.data.kind, ChangeKind::Insert);
        assert_eq!(payload.data.record["title"], "Pasta");
        assert!(payload.data.old_record.is_null());
    }

    #[test]
    fn test_unknown_event_is_tolerated() {
        let msg: RealtimeMessage = serde_json::from_value(json!({
            "topic": "realtime:recipes",
            "event": "presence_diff",
            "payload": {},
            "ref": "4"
        }))
        .unwrap();
        assert_eq!(msg.event, ChannelEvent::Unknown);
        assert_eq!(msg.message_ref.as_deref(), Some("4"));
    }

    #[test]
    fn test_serialize_join() {
        let msg = RealtimeMessage::new(
            "realtime:recipes",
            ChannelEvent::PhoenixJoin,
            json!({}),
            Some("1".to_string()),
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "phx_join");
        assert_eq!(value["ref"], "1");
        assert!(value.get("join_ref").is_none());
    }
}
