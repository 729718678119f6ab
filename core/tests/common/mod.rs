#![allow(dead_code)]
//! Shared fakes for the engine tests: an in-memory gateway and a scripted
//! push transport
use async_trait::async_trait;
use bytes::Bytes;
use chat_sync_core::error::{ChatError, Result};
use chat_sync_core::models::{ConversationSummary, Direction};
use chat_sync_core::transport::{FrameStream, PushFrame};
use chat_sync_core::{
    AckStatus, ChatApi, ChatSyncHandle, ChatView, ConversationId, Message, MessageContent, MessageId,
    OutgoingFile, PushTransport,
};
use chrono::{DateTime, TimeZone, Utc};
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct GatewayState {
    pub chats: Vec<ConversationSummary>,
    pub messages: HashMap<ConversationId, Vec<Message>>,
    pub fail_sends: bool,
    pub fail_list: bool,
    /// Answer sends with an echo of the stored message
    pub echo_sends: bool,
    /// Latency of the mark-as-read call
    pub read_delay: Duration,
    /// Latency of the send call
    pub send_delay: Duration,

    pub list_calls: u32,
    pub message_calls: Vec<ConversationId>,
    pub read_calls: Vec<ConversationId>,
    pub sent: Vec<(ConversationId, String)>,
    pub files: Vec<(ConversationId, String)>,
    pub pic_calls: Vec<ConversationId>,
}

#[derive(Default)]
pub struct FakeApi {
    pub state: Mutex<GatewayState>,
}

impl FakeApi {
    pub fn with_chats(chats: Vec<ConversationSummary>) -> Self {
        let api = Self::default();
        api.state.lock().unwrap().chats = chats;
        api
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut GatewayState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_chats(&self) -> Result<Vec<ConversationSummary>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.fail_list {
            return Err(ChatError::Status {
                status: 502,
                message: "gateway offline".into(),
            });
        }
        Ok(state.chats.clone())
    }

    async fn fetch_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>> {
        let mut state = self.state.lock().unwrap();
        state.message_calls.push(conversation.clone());
        Ok(state.messages.get(conversation).cloned().unwrap_or_default())
    }

    async fn profile_pic(&self, conversation: &ConversationId) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.pic_calls.push(conversation.clone());
        Ok(Some(format!("https://pics.example/{}.jpg", conversation.phone())))
    }

    async fn mark_as_read(&self, conversation: &ConversationId) -> Result<()> {
        let delay = self.with(|s| {
            s.read_calls.push(conversation.clone());
            s.read_delay
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        text: &str,
        _reply_to: Option<&MessageId>,
    ) -> Result<Option<Message>> {
        let delay = self.with(|s| s.send_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(ChatError::Send("number is not on WhatsApp".into()));
        }
        state.sent.push((conversation.clone(), text.to_string()));
        if !state.echo_sends {
            return Ok(None);
        }
        let mut echo = message(&format!("srv-{}", state.sent.len()), conversation.as_str(), Utc::now());
        echo.direction = Direction::Outbound;
        echo.content = MessageContent::text(text);
        Ok(Some(echo))
    }

    async fn send_file(&self, conversation: &ConversationId, file: OutgoingFile) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .files
            .push((conversation.clone(), file.file_name));
        Ok(())
    }

    async fn download(&self, message: &MessageId) -> Result<Bytes> {
        Ok(Bytes::from(format!("media:{}", message)))
    }
}

pub enum Step {
    Fail,
    Open(mpsc::UnboundedReceiver<String>),
}

/// Plays back connect outcomes in order; once the script runs out every
/// connect opens a silent session
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    pub connects: AtomicU32,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            connects: AtomicU32::new(0),
        }
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

/// A session the test pushes event payloads into
pub fn push_session() -> (mpsc::UnboundedSender<String>, Step) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Step::Open(rx))
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn connect(&self) -> Result<FrameStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Fail) => Err(ChatError::Transport("connection refused".into())),
            Some(Step::Open(rx)) => Ok(stream::unfold(rx, |mut rx| async move {
                let payload = rx.recv().await?;
                Some((Ok(PushFrame::Data(payload)), rx))
            })
            .boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn message(id: &str, conversation: &str, timestamp: DateTime<Utc>) -> Message {
    Message {
        id: id.into(),
        conversation_id: conversation.into(),
        direction: Direction::Inbound,
        content: MessageContent::text("olá"),
        status: AckStatus::Sent,
        timestamp,
        reply_to: None,
        send_failed: false,
    }
}

pub fn summary(id: &str, name: &str, unread: u32, secs: i64) -> ConversationSummary {
    ConversationSummary {
        id: id.into(),
        name: name.into(),
        unread,
        timestamp: at(secs),
        last_message: None,
    }
}

/// `{type, data}` envelope as the gateway pushes it
pub fn event(kind: &str, data: Value) -> String {
    json!({ "type": kind, "data": data }).to_string()
}

/// Poll the engine until `check` holds. Spawned calls against the fakes
/// finish within a few scheduler turns, so this never needs the clock.
pub async fn wait_for(chat: &ChatSyncHandle, check: impl Fn(&ChatView) -> bool) -> ChatView {
    for _ in 0..500 {
        let view = chat.snapshot().await.expect("engine running");
        if check(&view) {
            return view;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached; last view: {:#?}", chat.snapshot().await.ok());
}
