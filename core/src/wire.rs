//! Gateway JSON shapes and their conversion into domain types
//!
//! The WhatsApp gateway is loose about field names and formats, so these DTOs
//! accept the handful of variants seen in the wild and normalise them.
use crate::error::{ChatError, Result};
use crate::models::{
    AckStatus, ConversationId, ConversationSummary, Direction, MediaType, Message, MessageContent,
    MessageId,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// Ids arrive either as plain strings or as `{ "_serialized": "..." }`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Plain(String),
    Serialized {
        #[serde(rename = "_serialized")]
        serialized: String,
    },
}

impl WireId {
    pub fn into_string(self) -> String {
        match self {
            WireId::Plain(s) => s,
            WireId::Serialized { serialized } => serialized,
        }
    }
}

/// Epoch seconds, epoch milliseconds or an RFC 3339 string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Number(f64),
    Text(String),
}

impl WireTimestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            WireTimestamp::Number(n) if n.is_finite() && *n >= 0.0 => {
                let millis = if *n > 1e12 { *n } else { *n * 1000.0 };
                Utc.timestamp_millis_opt(millis as i64).single()
            }
            WireTimestamp::Number(_) => None,
            WireTimestamp::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(|n| WireTimestamp::Number(n).to_datetime())),
        }
    }
}

/// Ack as a number or a name
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireAck {
    Level(i64),
    Name(String),
}

impl WireAck {
    pub fn to_status(&self) -> AckStatus {
        match self {
            WireAck::Level(level) => AckStatus::from_level(*level),
            WireAck::Name(name) => AckStatus::from_name(name).unwrap_or(AckStatus::Pending),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: Option<WireId>,
    #[serde(default, alias = "chat_id", alias = "phone")]
    pub chat_id: Option<WireId>,
    #[serde(default)]
    pub from: Option<WireId>,
    #[serde(default)]
    pub to: Option<WireId>,
    #[serde(default, alias = "from_me")]
    pub from_me: Option<bool>,
    #[serde(default, alias = "text", alias = "message")]
    pub body: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub timestamp: Option<WireTimestamp>,
    #[serde(default)]
    pub ack: Option<WireAck>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default, alias = "reply_to", alias = "quotedMsgId")]
    pub reply_to: Option<WireId>,
}

impl WireMessage {
    /// Convert into a [`Message`].
    ///
    /// `conversation` fills in the chat id when the payload omits it;
    /// `default_direction` applies when `fromMe` is absent (send echoes are
    /// outbound, pushed messages inbound).
    pub fn into_message(
        self,
        conversation: Option<&ConversationId>,
        default_direction: Direction,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        let id = self
            .id
            .map(WireId::into_string)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ChatError::Protocol("message without id".to_string()))?;

        let direction = match self.from_me {
            Some(true) => Direction::Outbound,
            Some(false) => Direction::Inbound,
            None => default_direction,
        };

        let counterpart = match direction {
            Direction::Outbound => self.to,
            Direction::Inbound => self.from,
        };
        let conversation_id = self
            .chat_id
            .or(counterpart)
            .map(|w| ConversationId::new(w.into_string()))
            .or_else(|| conversation.cloned())
            .ok_or_else(|| ChatError::Protocol(format!("message {} without chat id", id)))?;

        let kind = self.kind.as_deref().unwrap_or("chat");
        let content = match kind {
            "chat" | "text" => MessageContent::Text {
                body: self.body.unwrap_or_default(),
            },
            "location" => MessageContent::Location {
                latitude: self.lat.unwrap_or_default(),
                longitude: self.lng.unwrap_or_default(),
                description: self.body.filter(|b| !b.is_empty()),
            },
            other => match MediaType::from_wire(other) {
                Some(media_type) => MessageContent::Media {
                    media_type,
                    caption: self.caption.or(self.body).filter(|c| !c.is_empty()),
                    filename: self.filename,
                    mimetype: self.mimetype,
                },
                None => MessageContent::Other {
                    kind: other.to_string(),
                },
            },
        };

        Ok(Message {
            id: MessageId::new(id),
            conversation_id,
            direction,
            content,
            status: self
                .ack
                .map(|a| a.to_status())
                .unwrap_or(AckStatus::Pending),
            timestamp: self
                .timestamp
                .and_then(|t| t.to_datetime())
                .unwrap_or(now),
            reply_to: self.reply_to.map(|w| MessageId::new(w.into_string())),
            send_failed: false,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConversation {
    #[serde(alias = "phone")]
    pub id: WireId,
    #[serde(default, alias = "formattedTitle", alias = "pushname")]
    pub name: Option<String>,
    #[serde(default, alias = "unread", alias = "unread_count")]
    pub unread_count: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<WireTimestamp>,
    #[serde(default, alias = "last_message")]
    pub last_message: Option<WireMessage>,
}

impl WireConversation {
    pub fn into_summary(self, now: DateTime<Utc>) -> ConversationSummary {
        let id = ConversationId::new(self.id.into_string());
        let last_message = self.last_message.and_then(|m| {
            m.into_message(Some(&id), Direction::Inbound, now)
                .map_err(|e| tracing::debug!("Dropping last message preview for {}: {}", id, e))
                .ok()
        });
        let timestamp = self
            .timestamp
            .and_then(|t| t.to_datetime())
            .or_else(|| last_message.as_ref().map(|m| m.timestamp))
            .unwrap_or_default();

        ConversationSummary {
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| id.phone().to_string()),
            unread: self.unread_count.unwrap_or(0).clamp(0, u32::MAX as i64) as u32,
            timestamp,
            last_message,
            id,
        }
    }
}

/// List bodies come bare or wrapped
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListBody<T> {
    Bare(Vec<T>),
    Chats { chats: Vec<T> },
    Messages { messages: Vec<T> },
}

impl<T> ListBody<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListBody::Bare(v) | ListBody::Chats { chats: v } | ListBody::Messages { messages: v } => v,
        }
    }
}

/// `GET /api/chat/profile-pic/{id}/`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePicBody {
    #[serde(default)]
    pub profile_pic_url: Option<String>,
    #[serde(default)]
    pub eurl: Option<String>,
}

impl ProfilePicBody {
    pub fn into_url(self) -> Option<String> {
        self.profile_pic_url
            .or(self.eurl)
            .filter(|u| !u.trim().is_empty())
    }
}

/// `message_ack` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAckUpdate {
    #[serde(alias = "messageId", alias = "message_id")]
    pub id: WireId,
    pub ack: WireAck,
    #[serde(default, alias = "chat_id", alias = "phone")]
    pub chat_id: Option<WireId>,
}

/// Parse a list of chats, dropping rows that fail to decode
pub fn parse_chat_list(body: serde_json::Value, now: DateTime<Utc>) -> Result<Vec<ConversationSummary>> {
    let rows: ListBody<serde_json::Value> = serde_json::from_value(body)?;
    Ok(rows
        .into_vec()
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<WireConversation>(row) {
            Ok(c) => Some(c.into_summary(now)),
            Err(e) => {
                tracing::warn!("Skipping malformed chat row: {}", e);
                None
            }
        })
        .collect())
}

/// Parse a message list for `conversation`, dropping rows that fail to decode
pub fn parse_message_list(
    body: serde_json::Value,
    conversation: &ConversationId,
    now: DateTime<Utc>,
) -> Result<Vec<Message>> {
    let rows: ListBody<serde_json::Value> = serde_json::from_value(body)?;
    Ok(rows
        .into_vec()
        .into_iter()
        .filter_map(|row| {
            serde_json::from_value::<WireMessage>(row)
                .map_err(ChatError::from)
                .and_then(|m| m.into_message(Some(conversation), Direction::Inbound, now))
                .map_err(|e| tracing::warn!("Skipping malformed message in {}: {}", conversation, e))
                .ok()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_message_from_gateway_shape() {
        let wire: WireMessage = serde_json::from_value(json!({
            "id": { "_serialized": "false_5511999@c.us_ABC" },
            "from": "5511999@c.us",
            "fromMe": false,
            "body": "oi",
            "type": "chat",
            "timestamp": 1700000100,
            "ack": 1
        }))
        .unwrap();
        let msg = wire.into_message(None, Direction::Inbound, now()).unwrap();
        assert_eq!(msg.id.as_str(), "false_5511999@c.us_ABC");
        assert_eq!(msg.conversation_id.as_str(), "5511999@c.us");
        assert_eq!(msg.direction, Direction::Inbound);
        assert_eq!(msg.content, MessageContent::text("oi"));
        assert_eq!(msg.status, AckStatus::Sent);
        assert_eq!(msg.timestamp.timestamp(), 1_700_000_100);
    }

    #[test]
    fn test_outbound_uses_recipient_as_chat() {
        let wire: WireMessage = serde_json::from_value(json!({
            "id": "true_5511999@c.us_XYZ",
            "from": "me@c.us",
            "to": "5511999@c.us",
            "fromMe": true,
            "type": "image",
            "caption": "comprovante",
            "timestamp": 1700000100123u64
        }))
        .unwrap();
        let msg = wire.into_message(None, Direction::Inbound, now()).unwrap();
        assert_eq!(msg.conversation_id.as_str(), "5511999@c.us");
        assert!(msg.is_outbound());
        assert_eq!(msg.timestamp.timestamp_millis(), 1_700_000_100_123);
        assert!(matches!(
            msg.content,
            MessageContent::Media { media_type: MediaType::Image, .. }
        ));
    }

    #[test]
    fn test_message_without_id_is_rejected() {
        let wire: WireMessage = serde_json::from_value(json!({ "body": "x" })).unwrap();
        assert!(wire.into_message(Some(&"a".into()), Direction::Inbound, now()).is_err());
    }

    #[test]
    fn test_chat_list_wrapped_and_bare() {
        let bare = json!([{ "id": "1@c.us", "name": "Ana", "unreadCount": 2, "timestamp": 1000 }]);
        let wrapped = json!({ "chats": [{ "phone": "2@c.us", "unread": 1 }, { "bogus": true }] });
        let a = parse_chat_list(bare, now()).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].name, "Ana");
        assert_eq!(a[0].unread, 2);
        let b = parse_chat_list(wrapped, now()).unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].name, "2");
    }

    #[test]
    fn test_profile_pic_fallback_field() {
        let body: ProfilePicBody = serde_json::from_value(json!({ "eurl": "https://x/y.jpg" })).unwrap();
        assert_eq!(body.into_url().as_deref(), Some("https://x/y.jpg"));
        let empty: ProfilePicBody = serde_json::from_value(json!({ "profilePicUrl": "" })).unwrap();
        assert_eq!(empty.into_url(), None);
    }

    #[test]
    fn test_timestamp_formats() {
        let iso = WireTimestamp::Text("2024-05-01T12:00:00Z".to_string());
        assert_eq!(iso.to_datetime().unwrap().timestamp(), 1_714_564_800);
        assert!(WireTimestamp::Number(-5.0).to_datetime().is_none());
    }
}
