use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::actors::projection_engine::EngineMessage;
use crate::auth::ChannelAuthorization;
use crate::conversation::{ConversationSummary, MessageSummary, MessageType, flexible_id};

pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
pub const SUBSCRIBE: &str = "pusher:subscribe";
pub const UNSUBSCRIBE: &str = "pusher:unsubscribe";
pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
pub const PING: &str = "pusher:ping";
pub const PONG: &str = "pusher:pong";
pub const PROTOCOL_ERROR: &str = "pusher:error";

pub const NEW_MESSAGE: &str = "new-message-notification";
pub const NEW_CONVERSATION: &str = "new-conversation";

#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    // the data field arrives either inline or as a JSON-encoded string
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.data {
            Some(serde_json::Value::String(inner)) => serde_json::from_str(inner),
            Some(value) => serde_json::from_value(value.clone()),
            None => serde_json::from_value(serde_json::Value::Null),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectionEstablished {
    pub socket_id: String,
    #[serde(default)]
    pub activity_timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
}

pub fn error_detail(envelope: &Envelope) -> String {
    match envelope.data_as::<ErrorPayload>() {
        Ok(payload) => format!(
            "{} (code {})",
            payload.message.unwrap_or_else(|| "unspecified".to_string()),
            payload.code.unwrap_or(-1)
        ),
        Err(_) => "unparseable error payload".to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct SubscribeFrame<'a> {
    pub event: &'static str,
    pub data: SubscribeData<'a>,
}

#[derive(Debug, Serialize)]
pub struct SubscribeData<'a> {
    pub channel: &'a str,
    pub auth: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<&'a str>,
}

pub fn subscribe<'a>(
    channel: &'a str,
    authorization: &'a ChannelAuthorization,
) -> SubscribeFrame<'a> {
    SubscribeFrame {
        event: SUBSCRIBE,
        data: SubscribeData {
            channel,
            auth: &authorization.auth,
            channel_data: authorization.channel_data.as_deref(),
        },
    }
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeFrame<'a> {
    pub event: &'static str,
    pub data: UnsubscribeData<'a>,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeData<'a> {
    pub channel: &'a str,
}

pub fn unsubscribe(channel: &str) -> UnsubscribeFrame<'_> {
    UnsubscribeFrame {
        event: UNSUBSCRIBE,
        data: UnsubscribeData { channel },
    }
}

#[derive(Debug, Serialize)]
pub struct PongFrame {
    pub event: &'static str,
    pub data: EmptyData,
}

#[derive(Debug, Serialize)]
pub struct EmptyData {}

pub fn pong() -> PongFrame {
    PongFrame {
        event: PONG,
        data: EmptyData {},
    }
}

#[derive(Debug, Deserialize)]
pub struct NewMessageNotification {
    #[serde(deserialize_with = "flexible_id")]
    pub conversation_id: String,
    pub sender_id: i64,
    pub message: MessageBody,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub deleted: bool,
}

// Translates an application event into an engine message. Infrastructure
// frames and unrecognized events map to None.
pub fn map_event(
    envelope: &Envelope,
    now: DateTime<Utc>,
) -> Result<Option<EngineMessage>, serde_json::Error> {
    match envelope.event.as_str() {
        NEW_MESSAGE => {
            let notification: NewMessageNotification = envelope.data_as()?;
            let message = MessageSummary {
                content: notification.message.content,
                sender_id: notification.sender_id,
                message_type: notification.message.message_type,
                created_at: notification.created_at.unwrap_or(now),
                deleted: notification.message.deleted,
            };
            Ok(Some(EngineMessage::MessageReceived {
                conversation_id: notification.conversation_id,
                message,
            }))
        }
        NEW_CONVERSATION => {
            let conversation: ConversationSummary = envelope.data_as()?;
            Ok(Some(EngineMessage::ConversationCreated { conversation }))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_714_000_000, 0).unwrap()
    }

    #[test]
    fn parses_connection_established() {
        let text = r#"{
            "event": "pusher:connection_established",
            "data": "{\"socket_id\":\"123.456\",\"activity_timeout\":120}"
        }"#;
        let envelope = Envelope::parse(text).unwrap();
        assert_eq!(envelope.event, CONNECTION_ESTABLISHED);
        let established: ConnectionEstablished = envelope.data_as().unwrap();
        assert_eq!(established.socket_id, "123.456");
        assert_eq!(established.activity_timeout, Some(120));
    }

    #[test]
    fn maps_new_message_with_inline_data() {
        let text = r#"{
            "event": "new-message-notification",
            "channel": "private-user-7",
            "data": {
                "conversation_id": "c-9",
                "sender_id": 12,
                "message": {"content": "hi there", "message_type": "text"},
                "created_at": "2024-05-01T10:00:00Z"
            }
        }"#;
        let envelope = Envelope::parse(text).unwrap();
        let mapped = map_event(&envelope, now()).unwrap().unwrap();
        let EngineMessage::MessageReceived {
            conversation_id,
            message,
        } = mapped
        else {
            panic!("expected message event");
        };
        assert_eq!(conversation_id, "c-9");
        assert_eq!(message.sender_id, 12);
        assert_eq!(message.content, "hi there");
    }

    #[test]
    fn maps_new_message_with_string_encoded_data() {
        let text = r#"{
            "event": "new-message-notification",
            "data": "{\"conversation_id\":5,\"sender_id\":12,\"message\":{\"content\":\"yo\"}}"
        }"#;
        let envelope = Envelope::parse(text).unwrap();
        let mapped = map_event(&envelope, now()).unwrap().unwrap();
        let EngineMessage::MessageReceived {
            conversation_id,
            message,
        } = mapped
        else {
            panic!("expected message event");
        };
        // numeric ids normalize to strings, missing created_at falls back
        assert_eq!(conversation_id, "5");
        assert_eq!(message.created_at, now());
        assert_eq!(message.message_type, MessageType::Text);
    }

    #[test]
    fn maps_new_conversation() {
        let text = r#"{
            "event": "new-conversation",
            "data": {
                "id": "c-50",
                "unread_count": 1,
                "updated_at": "2024-05-01T10:00:00Z"
            }
        }"#;
        let envelope = Envelope::parse(text).unwrap();
        let mapped = map_event(&envelope, now()).unwrap().unwrap();
        let EngineMessage::ConversationCreated { conversation } = mapped else {
            panic!("expected conversation event");
        };
        assert_eq!(conversation.id, "c-50");
        assert_eq!(conversation.unread_count, 1);
    }

    #[test]
    fn unrecognized_events_map_to_none() {
        let envelope = Envelope::parse(r#"{"event": "typing-indicator", "data": {}}"#).unwrap();
        assert!(map_event(&envelope, now()).unwrap().is_none());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let envelope =
            Envelope::parse(r#"{"event": "new-message-notification", "data": {"bogus": 1}}"#)
                .unwrap();
        assert!(map_event(&envelope, now()).is_err());
    }

    #[test]
    fn subscribe_frame_serializes_expected_shape() {
        let authorization = ChannelAuthorization {
            auth: "key:sig".to_string(),
            channel_data: None,
        };
        let json = serde_json::to_string(&subscribe("private-user-7", &authorization)).unwrap();
        assert_eq!(
            json,
            r#"{"event":"pusher:subscribe","data":{"channel":"private-user-7","auth":"key:sig"}}"#
        );
    }

    #[test]
    fn pong_frame_serializes_expected_shape() {
        let json = serde_json::to_string(&pong()).unwrap();
        assert_eq!(json, r#"{"event":"pusher:pong","data":{}}"#);
    }

    #[test]
    fn error_detail_reads_message_and_code() {
        let envelope = Envelope::parse(
            r#"{"event": "pusher:error", "data": {"message": "no auth", "code": 4009}}"#,
        )
        .unwrap();
        assert_eq!(error_detail(&envelope), "no auth (code 4009)");
    }
}
