//! REST client for the chat gateway
//!
//! Endpoints:
//!   GET  /api/chat/list/
//!   GET  /api/chat/messages/{id}/
//!   GET  /api/chat/profile-pic/{id}/
//!   POST /api/chat/mark-as-read/      body: {"phone":"..."}
//!   POST /api/chat/send-message/      body: {"phone":"...","message":"...","replyTo":null}
//!   POST /api/chat/send-file/         multipart: phone, file, type
//!   GET  /api/chat/download/{messageId}/
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::models::{ConversationId, ConversationSummary, Direction, Message, MessageId, OutgoingFile};
use crate::wire::{self, ProfilePicBody, WireMessage};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::debug;

/// Everything the sync engine needs from the gateway
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_chats(&self) -> Result<Vec<ConversationSummary>>;

    async fn fetch_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>>;

    async fn profile_pic(&self, conversation: &ConversationId) -> Result<Option<String>>;

    async fn mark_as_read(&self, conversation: &ConversationId) -> Result<()>;

    /// Returns the gateway's echo of the message when it sends one
    async fn send_message(
        &self,
        conversation: &ConversationId,
        text: &str,
        reply_to: Option<&MessageId>,
    ) -> Result<Option<Message>>;

    async fn send_file(&self, conversation: &ConversationId, file: OutgoingFile) -> Result<()>;

    async fn download(&self, message: &MessageId) -> Result<Bytes>;
}

pub struct HttpChatApi {
    client: reqwest::Client,
    config: Config,
}

impl HttpChatApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        self.config.endpoint(path)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let builder = self.client.post(self.url(path));
        match &self.config.csrf_token {
            Some(token) => builder.header("X-CSRFToken", token),
            None => builder,
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let resp = self.client.get(self.url(path)).send().await?;
        read_json(resp).await
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_chats(&self) -> Result<Vec<ConversationSummary>> {
        let body = self.get_json("/api/chat/list/").await?;
        wire::parse_chat_list(body, Utc::now())
    }

    async fn fetch_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>> {
        let path = format!("/api/chat/messages/{}/", urlencoding::encode(conversation.as_str()));
        let body = self.get_json(&path).await?;
        wire::parse_message_list(body, conversation, Utc::now())
    }

    async fn profile_pic(&self, conversation: &ConversationId) -> Result<Option<String>> {
        let path = format!(
            "/api/chat/profile-pic/{}/",
            urlencoding::encode(conversation.as_str())
        );
        let body: ProfilePicBody = serde_json::from_value(self.get_json(&path).await?)?;
        Ok(body.into_url())
    }

    async fn mark_as_read(&self, conversation: &ConversationId) -> Result<()> {
        let resp = self
            .post("/api/chat/mark-as-read/")
            .json(&json!({ "phone": conversation.phone() }))
            .send()
            .await?;
        ensure_success(resp).await
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        text: &str,
        reply_to: Option<&MessageId>,
    ) -> Result<Option<Message>> {
        let resp = self
            .post("/api/chat/send-message/")
            .json(&json!({
                "phone": conversation.phone(),
                "message": text,
                "replyTo": reply_to.map(MessageId::as_str),
            }))
            .send()
            .await?;
        let body = read_lenient_json(resp).await?;
        if let Some(err) = body.get("error").and_then(Value::as_str) {
            return Err(ChatError::Send(err.to_string()));
        }
        Ok(parse_echo(body, conversation))
    }

    async fn send_file(&self, conversation: &ConversationId, file: OutgoingFile) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)?;
        let form = reqwest::multipart::Form::new()
            .text("phone", conversation.phone().to_string())
            .text("type", file.media_type.as_wire())
            .part("file", part);
        let resp = self.post("/api/chat/send-file/").multipart(form).send().await?;
        let body = read_lenient_json(resp).await?;
        if let Some(err) = body.get("error").and_then(Value::as_str) {
            return Err(ChatError::Send(err.to_string()));
        }
        Ok(())
    }

    async fn download(&self, message: &MessageId) -> Result<Bytes> {
        let path = format!("/api/chat/download/{}/", urlencoding::encode(message.as_str()));
        let resp = self.client.get(self.url(&path)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &text));
        }
        Ok(resp.bytes().await?)
    }
}

/// Decode a JSON body, mapping non-2xx answers to [`ChatError::Status`].
/// An empty 2xx body reads as `null`.
async fn read_json(resp: Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(status_error(status.as_u16(), &text));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Like [`read_json`] but a 2xx body that is not JSON reads as `null`
async fn read_lenient_json(resp: Response) -> Result<Value> {
    match read_json(resp).await {
        Err(ChatError::Serialization(e)) => {
            debug!("Ignoring non-JSON success body: {}", e);
            Ok(Value::Null)
        }
        other => other,
    }
}

/// Status-only check for endpoints whose body carries nothing we need
async fn ensure_success(resp: Response) -> Result<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let text = resp.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), &text))
}

fn status_error(status: u16, body: &str) -> ChatError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect());
    ChatError::Status { status, message }
}

/// The send echo is either the message itself or wraps it in `message`/`data`
fn parse_echo(body: Value, conversation: &ConversationId) -> Option<Message> {
    let candidate = match body {
        Value::Object(mut map) => {
            if let Some(inner) = ["message", "data"]
                .iter()
                .find_map(|k| map.get(*k).filter(|v| v.is_object()).map(|_| *k))
            {
                map.remove(inner).unwrap_or_default()
            } else {
                Value::Object(map)
            }
        }
        _ => return None,
    };
    serde_json::from_value::<WireMessage>(candidate)
        .map_err(ChatError::from)
        .and_then(|m| m.into_message(Some(conversation), Direction::Outbound, Utc::now()))
        .map_err(|e| debug!("Send echo without usable message: {}", e))
        .ok()
}
