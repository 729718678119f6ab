//! Push events carried over `GET /api/chat/sse/`
use crate::error::{ChatError, Result};
use crate::models::{AckStatus, ConversationId, Direction, Message, MessageId};
use crate::wire::{WireAckUpdate, WireMessage};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One decoded server push
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// The gateway confirmed the subscription
    Connected,
    /// A message arrived (or was sent from another device)
    NewMessage(Message),
    /// Delivery status changed
    MessageAck {
        message_id: MessageId,
        conversation_id: Option<ConversationId>,
        status: AckStatus,
    },
    /// The gateway accepted one of our sends
    MessageSent(Message),
    /// Something about the chat list changed; re-fetch it
    ChatUpdate,
    /// A type we do not know yet
    Unknown { kind: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl PushEvent {
    /// Decode the `data:` payload of one SSE frame (`{ "type", "data" }`)
    pub fn parse(payload: &str, now: DateTime<Utc>) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(payload)
            .map_err(|e| ChatError::Protocol(format!("invalid push envelope: {}", e)))?;

        let event = match envelope.kind.as_str() {
            "connected" => PushEvent::Connected,
            "new_message" => {
                PushEvent::NewMessage(decode_message(envelope.data, Direction::Inbound, now)?)
            }
            "message_sent" => {
                PushEvent::MessageSent(decode_message(envelope.data, Direction::Outbound, now)?)
            }
            "message_ack" => {
                let update: WireAckUpdate = serde_json::from_value(envelope.data)
                    .map_err(|e| ChatError::Protocol(format!("invalid message_ack: {}", e)))?;
                PushEvent::MessageAck {
                    message_id: MessageId::new(update.id.into_string()),
                    conversation_id: update
                        .chat_id
                        .map(|c| ConversationId::new(c.into_string())),
                    status: update.ack.to_status(),
                }
            }
            "chat_update" => PushEvent::ChatUpdate,
            other => PushEvent::Unknown {
                kind: other.to_string(),
            },
        };
        Ok(event)
    }

    /// Event name for logs
    pub fn kind(&self) -> &str {
        match self {
            PushEvent::Connected => "connected",
            PushEvent::NewMessage(_) => "new_message",
            PushEvent::MessageAck { .. } => "message_ack",
            PushEvent::MessageSent(_) => "message_sent",
            PushEvent::ChatUpdate => "chat_update",
            PushEvent::Unknown { kind } => kind,
        }
    }
}

/// Messages come either directly as `data` or nested as `data.message`
fn decode_message(
    data: serde_json::Value,
    default_direction: Direction,
    now: DateTime<Utc>,
) -> Result<Message> {
    let inner = match data {
        serde_json::Value::Object(mut map) if map.get("message").is_some_and(|m| m.is_object()) => {
            map.remove("message").unwrap_or_default()
        }
        other => other,
    };
    let wire: WireMessage = serde_json::from_value(inner)
        .map_err(|e| ChatError::Protocol(format!("invalid message payload: {}", e)))?;
    wire.into_message(None, default_direction, now)
}
