//! Domain types shared by the stores, the dispatcher and the HTTP layer
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const LOCAL_ID_PREFIX: &str = "local-";

/// Origin-qualified conversation key, e.g. `5511999999999@c.us`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `@`, which is what the gateway expects as `phone`
    pub fn phone(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Message identifier; either assigned by the gateway or synthesized locally
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id for an optimistic message
    pub fn local() -> Self {
        Self(format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Delivery progress of a message. Ordering is meaningful: a status only
/// ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Pending,
    Sent,
    Delivered,
    Read,
}

impl AckStatus {
    /// Map the gateway's numeric ack (-1 error, 0 pending, 1 server,
    /// 2 device, 3 read, 4 played)
    pub fn from_level(level: i64) -> Self {
        match level {
            i64::MIN..=0 => AckStatus::Pending,
            1 => AckStatus::Sent,
            2 => AckStatus::Delivered,
            _ => AckStatus::Read,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pending" | "error" => Some(AckStatus::Pending),
            "sent" | "server" => Some(AckStatus::Sent),
            "delivered" | "device" => Some(AckStatus::Delivered),
            "read" | "played" => Some(AckStatus::Read),
            _ => None,
        }
    }

    /// Raise `self` to `incoming` if that is further along. Returns whether
    /// anything changed.
    pub fn advance(&mut self, incoming: AckStatus) -> bool {
        if incoming > *self {
            *self = incoming;
            true
        } else {
            false
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            AckStatus::Pending => "🕓",
            AckStatus::Sent => "✓",
            AckStatus::Delivered => "✓✓",
            AckStatus::Read => "👁",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Voice,
    Document,
    Sticker,
}

impl MediaType {
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "image" => Some(MediaType::Image),
            "video" | "gif" => Some(MediaType::Video),
            "audio" => Some(MediaType::Audio),
            "ptt" | "voice" => Some(MediaType::Voice),
            "document" | "file" => Some(MediaType::Document),
            "sticker" => Some(MediaType::Sticker),
            _ => None,
        }
    }

    /// Value of the `type` field for `send-file`
    pub fn as_wire(self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Voice => "ptt",
            MediaType::Document => "document",
            MediaType::Sticker => "sticker",
        }
    }

    /// Guess from a MIME type, falling back to a document
    pub fn from_mime(mime: &str) -> Self {
        match mime.split('/').next().unwrap_or("") {
            "image" if mime == "image/webp" => MediaType::Sticker,
            "image" => MediaType::Image,
            "video" => MediaType::Video,
            "audio" => MediaType::Audio,
            _ => MediaType::Document,
        }
    }

    fn label(self) -> &'static str {
        match self {
            MediaType::Image => "📷 Photo",
            MediaType::Video => "🎥 Video",
            MediaType::Audio => "🎵 Audio",
            MediaType::Voice => "🎤 Voice message",
            MediaType::Document => "📄 Document",
            MediaType::Sticker => "Sticker",
        }
    }
}

/// Message payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        body: String,
    },
    Media {
        media_type: MediaType,
        caption: Option<String>,
        filename: Option<String>,
        mimetype: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        description: Option<String>,
    },
    /// Anything the gateway sends that we do not render specially
    Other {
        kind: String,
    },
}

impl MessageContent {
    pub fn text(body: impl Into<String>) -> Self {
        MessageContent::Text { body: body.into() }
    }

    /// Short kind tag used in previews
    pub fn kind(&self) -> &str {
        match self {
            MessageContent::Text { .. } => "text",
            MessageContent::Media { media_type, .. } => media_type.as_wire(),
            MessageContent::Location { .. } => "location",
            MessageContent::Other { kind } => kind,
        }
    }

    /// One-line rendering for the chat list
    pub fn preview_text(&self) -> String {
        match self {
            MessageContent::Text { body } => body.lines().next().unwrap_or("").to_string(),
            MessageContent::Media {
                media_type,
                caption,
                filename,
                ..
            } => match (caption.as_deref(), filename.as_deref()) {
                (Some(c), _) if !c.is_empty() => format!("{} {}", media_type.label(), c),
                (_, Some(f)) if *media_type == MediaType::Document => {
                    format!("{} {}", media_type.label(), f)
                }
                _ => media_type.label().to_string(),
            },
            MessageContent::Location { description, .. } => match description {
                Some(d) if !d.is_empty() => format!("📍 {}", d),
                _ => "📍 Location".to_string(),
            },
            MessageContent::Other { kind } if kind == "revoked" => {
                "🚫 This message was deleted".to_string()
            }
            MessageContent::Other { kind } => format!("[{}]", kind),
        }
    }

    /// Text used to pair an optimistic send with its echo
    pub fn match_key(&self) -> Option<&str> {
        match self {
            MessageContent::Text { body } => Some(body.trim()),
            MessageContent::Media { caption, .. } => caption.as_deref().map(str::trim),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub direction: Direction,
    pub content: MessageContent,
    pub status: AckStatus,
    pub timestamp: DateTime<Utc>,
    pub reply_to: Option<MessageId>,
    /// Set when the POST for an optimistic message failed
    #[serde(default)]
    pub send_failed: bool,
}

impl Message {
    pub fn is_optimistic(&self) -> bool {
        self.id.is_local()
    }

    pub fn is_outbound(&self) -> bool {
        self.direction == Direction::Outbound
    }
}

/// What the chat list shows under a conversation name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    pub message_id: MessageId,
    pub kind: String,
    pub text: String,
    /// Only outbound messages carry a delivery icon
    pub status: Option<AckStatus>,
}

impl Preview {
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            kind: message.content.kind().to_string(),
            text: message.content.preview_text(),
            status: message.is_outbound().then_some(message.status),
        }
    }

    pub fn status_icon(&self) -> Option<&'static str> {
        self.status.map(AckStatus::icon)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub name: String,
    pub last_activity: DateTime<Utc>,
    pub unread: u32,
    pub preview: Option<Preview>,
    pub profile_pic_url: Option<String>,
}

impl Conversation {
    /// Placeholder for a conversation first seen through a push event
    pub fn discovered(id: ConversationId, at: DateTime<Utc>) -> Self {
        Self {
            name: id.phone().to_string(),
            id,
            last_activity: at,
            unread: 0,
            preview: None,
            profile_pic_url: None,
        }
    }
}

/// One row of `GET /api/chat/list/`
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub name: String,
    pub unread: u32,
    pub timestamp: DateTime<Utc>,
    pub last_message: Option<Message>,
}

/// Attachment for `POST /api/chat/send-file/`
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub file_name: String,
    pub mime_type: String,
    pub media_type: MediaType,
    pub bytes: Bytes,
}

impl OutgoingFile {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Bytes) -> Self {
        let mime_type = mime_type.into();
        Self {
            file_name: file_name.into(),
            media_type: MediaType::from_mime(&mime_type),
            mime_type,
            bytes,
        }
    }
}
