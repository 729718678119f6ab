//! The sync engine
//!
//! One task owns the stores, the dispatcher, the read-state coordinator and
//! the connection manager. User actions, push traffic, timer fires and the
//! results of network calls all arrive as [`Command`]s on a single channel
//! and are applied one at a time, so every handler leaves the stores
//! consistent before the next one runs. Network calls are spawned on their
//! own and report back through the same channel.
use crate::api::ChatApi;
use crate::chat_list::{ChatListStore, FetchTicket, ReadStamp};
use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionStatus, LinkEvent, LinkSink};
use crate::conversation::{ConversationStore, MessageTicket, Reconciled};
use crate::dispatcher::{DispatchOutcome, EventDispatcher};
use crate::error::{ChatError, Result};
use crate::models::{
    Conversation, ConversationId, ConversationSummary, Message, MessageContent, MessageId, OutgoingFile,
};
use crate::read_state::ReadStateCoordinator;
use crate::transport::PushTransport;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Transient, non-blocking notification for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// Render notification: which part of the view to redraw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    ChatList,
    Conversation(ConversationId),
    Connection(ConnectionStatus),
    Notice(Notice),
}

/// Point-in-time copy of everything the UI renders
#[derive(Debug, Clone, Serialize)]
pub struct ChatView {
    pub conversations: Vec<Conversation>,
    pub open: Option<ConversationId>,
    pub messages: Vec<Message>,
    /// False until the open conversation's first fetch has been applied
    pub messages_loaded: bool,
    pub total_unread: u32,
    pub connection: ConnectionStatus,
}

impl ChatView {
    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }
}

pub(crate) enum Command {
    // User actions
    OpenConversation(ConversationId),
    CloseConversation,
    SendText {
        text: String,
        reply_to: Option<MessageId>,
        reply: oneshot::Sender<Result<MessageId>>,
    },
    RetrySend {
        local_id: MessageId,
        reply: oneshot::Sender<Result<()>>,
    },
    SendFile {
        file: OutgoingFile,
        reply: oneshot::Sender<Result<()>>,
    },
    SetVisible(bool),
    Refresh,
    LoadProfilePic(ConversationId),
    Snapshot(oneshot::Sender<ChatView>),
    Shutdown(oneshot::Sender<()>),

    // Push connection and timers
    Link(LinkEvent),
    ReadAckDue {
        generation: u64,
    },

    // Completed network calls
    ChatListFetched {
        ticket: FetchTicket,
        result: Result<Vec<ConversationSummary>>,
    },
    MessagesFetched {
        conversation_id: ConversationId,
        ticket: MessageTicket,
        silent: bool,
        result: Result<Vec<Message>>,
    },
    ReadAckSent {
        conversation_id: ConversationId,
        stamp: ReadStamp,
        result: Result<()>,
    },
    SendCompleted {
        conversation_id: ConversationId,
        local_id: MessageId,
        result: Result<Option<Message>>,
    },
    FileSent {
        conversation_id: ConversationId,
        file_name: String,
        result: Result<()>,
        reply: oneshot::Sender<Result<()>>,
    },
    ProfilePicFetched {
        conversation_id: ConversationId,
        result: Result<Option<String>>,
    },
}

/// Cloneable front door to a running engine
#[derive(Clone)]
pub struct ChatSyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    updates: broadcast::Sender<ViewUpdate>,
    api: Arc<dyn ChatApi>,
}

impl ChatSyncHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| ChatError::Closed)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx))?;
        rx.await.map_err(|_| ChatError::Closed)
    }

    /// Show `id`: cancels any pending read ack, loads its messages and
    /// schedules an ack once they are in
    pub fn open_conversation(&self, id: impl Into<ConversationId>) -> Result<()> {
        self.send(Command::OpenConversation(id.into()))
    }

    pub fn close_conversation(&self) -> Result<()> {
        self.send(Command::CloseConversation)
    }

    /// Append an optimistic message to the open conversation and post it.
    /// Resolves with the local id as soon as the message is shown; a failed
    /// post is reported as a notice and marks the message.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<MessageId> {
        let text = text.into();
        self.request(|reply| Command::SendText {
            text,
            reply_to: None,
            reply,
        })
        .await?
    }

    pub async fn send_reply(&self, text: impl Into<String>, reply_to: MessageId) -> Result<MessageId> {
        let text = text.into();
        self.request(|reply| Command::SendText {
            text,
            reply_to: Some(reply_to),
            reply,
        })
        .await?
    }

    /// Post a failed optimistic message again
    pub async fn retry_send(&self, local_id: MessageId) -> Result<()> {
        self.request(|reply| Command::RetrySend { local_id, reply }).await?
    }

    /// Upload an attachment to the open conversation; resolves when the
    /// gateway has answered
    pub async fn send_file(&self, file: OutgoingFile) -> Result<()> {
        self.request(|reply| Command::SendFile { file, reply }).await?
    }

    pub fn set_visible(&self, visible: bool) -> Result<()> {
        self.send(Command::SetVisible(visible))
    }

    /// Silent re-fetch of the chat list and the open conversation
    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    pub fn request_profile_pic(&self, id: impl Into<ConversationId>) -> Result<()> {
        self.send(Command::LoadProfilePic(id.into()))
    }

    pub async fn snapshot(&self) -> Result<ChatView> {
        self.request(Command::Snapshot).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewUpdate> {
        self.updates.subscribe()
    }

    /// Fetch a message's media. Runs outside the engine.
    pub async fn download(&self, message: &MessageId) -> Result<Bytes> {
        self.api.download(message).await
    }

    /// Cancel every timer, close the push session and stop the engine
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }
}

pub struct ChatSync {
    api: Arc<dyn ChatApi>,
    commands: mpsc::WeakUnboundedSender<Command>,
    updates: broadcast::Sender<ViewUpdate>,

    chats: ChatListStore,
    conversation: ConversationStore,
    dispatcher: EventDispatcher,
    read_state: ReadStateCoordinator,
    /// Conversation whose acknowledgement was skipped while hidden
    owed_read_ack: Option<ConversationId>,
    connection: ConnectionManager,

    list_in_flight: bool,
    list_queued: bool,
    profile_pics: HashMap<ConversationId, Option<String>>,
    pics_in_flight: HashSet<ConversationId>,
}

impl ChatSync {
    /// Start the engine on the current tokio runtime. It fetches the chat
    /// list, opens the push connection and runs until shut down or until
    /// every handle is dropped.
    pub fn spawn(config: Config, api: Arc<dyn ChatApi>, transport: Arc<dyn PushTransport>) -> ChatSyncHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let weak = tx.downgrade();
        let link_tx = tx.downgrade();
        let sink: LinkSink = Arc::new(move |event| {
            if let Some(tx) = link_tx.upgrade() {
                let _ = tx.send(Command::Link(event));
            }
        });

        let engine = ChatSync {
            api: Arc::clone(&api),
            commands: weak,
            updates: updates.clone(),
            chats: ChatListStore::new(),
            conversation: ConversationStore::new(config.optimistic_match_window),
            dispatcher: EventDispatcher::new(config.seen_capacity),
            read_state: ReadStateCoordinator::new(config.read_ack_delay),
            owed_read_ack: None,
            connection: ConnectionManager::new(&config, transport, sink),
            list_in_flight: false,
            list_queued: false,
            profile_pics: HashMap::new(),
            pics_in_flight: HashSet::new(),
        };
        info!("Chat sync starting against {}", config.base_url);
        tokio::spawn(engine.run(rx));

        ChatSyncHandle {
            commands: tx,
            updates,
            api,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        self.refresh_chat_list();
        self.connection.connect();
        self.publish_connection();

        loop {
            let Some(command) = rx.recv().await else {
                debug!("All handles dropped");
                self.teardown();
                break;
            };
            if let Command::Shutdown(reply) = command {
                self.teardown();
                let _ = reply.send(());
                break;
            }
            self.handle(command);
        }
        info!("Chat sync stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::OpenConversation(id) => self.open_conversation(id),
            Command::CloseConversation => self.close_conversation(),
            Command::SendText { text, reply_to, reply } => {
                let _ = reply.send(self.send_text(text, reply_to));
            }
            Command::RetrySend { local_id, reply } => {
                let _ = reply.send(self.retry_send(&local_id));
            }
            Command::SendFile { file, reply } => self.send_file(file, reply),
            Command::SetVisible(visible) => self.set_visible(visible),
            Command::Refresh => self.resync(),
            Command::LoadProfilePic(id) => self.load_profile_pic(id),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown(reply) => {
                self.teardown();
                let _ = reply.send(());
            }
            Command::Link(event) => self.on_link(event),
            Command::ReadAckDue { generation } => self.on_read_ack_due(generation),
            Command::ChatListFetched { ticket, result } => self.on_chat_list(ticket, result),
            Command::MessagesFetched {
                conversation_id,
                ticket,
                silent,
                result,
            } => self.on_messages(conversation_id, ticket, silent, result),
            Command::ReadAckSent {
                conversation_id,
                stamp,
                result,
            } => match result {
                Ok(()) => {
                    if self.chats.mark_read(&conversation_id, stamp) {
                        self.publish(ViewUpdate::ChatList);
                    }
                }
                Err(e) => warn!("Failed to mark {} as read: {}", conversation_id, e),
            },
            Command::SendCompleted {
                conversation_id,
                local_id,
                result,
            } => self.on_send_completed(conversation_id, local_id, result),
            Command::FileSent {
                conversation_id,
                file_name,
                result,
                reply,
            } => {
                if let Err(e) = &result {
                    warn!("Upload of {} to {} failed: {}", file_name, conversation_id, e);
                    self.publish(ViewUpdate::Notice(Notice::error(format!(
                        "File not sent: {}",
                        e
                    ))));
                } else {
                    self.refresh_chat_list();
                    if self.conversation.is_open(&conversation_id) {
                        self.fetch_messages(conversation_id, true);
                    }
                }
                let _ = reply.send(result);
            }
            Command::ProfilePicFetched {
                conversation_id,
                result,
            } => {
                self.pics_in_flight.remove(&conversation_id);
                let url = result.unwrap_or_else(|e| {
                    debug!("No profile picture for {}: {}", conversation_id, e);
                    None
                });
                self.profile_pics.insert(conversation_id.clone(), url.clone());
                if self.chats.set_profile_pic(&conversation_id, url) {
                    self.publish(ViewUpdate::ChatList);
                }
            }
        }
    }

    fn publish(&self, update: ViewUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }

    fn publish_connection(&self) {
        self.publish(ViewUpdate::Connection(self.connection.status()));
    }

    fn publish_conversation(&self) {
        if let Some(id) = self.conversation.active_id() {
            self.publish(ViewUpdate::Conversation(id.clone()));
        }
    }

    /// Run `call` on its own task and feed its result back as a command
    fn spawn_call<F>(&self, call: F)
    where
        F: Future<Output = Command> + Send + 'static,
    {
        let Some(tx) = self.commands.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let _ = tx.send(call.await);
        });
    }

    fn refresh_chat_list(&mut self) {
        if self.list_in_flight {
            self.list_queued = true;
            return;
        }
        self.list_in_flight = true;
        let ticket = self.chats.begin_fetch();
        let api = Arc::clone(&self.api);
        self.spawn_call(async move {
            Command::ChatListFetched {
                ticket,
                result: api.list_chats().await,
            }
        });
    }

    fn fetch_messages(&mut self, conversation_id: ConversationId, silent: bool) {
        let ticket = self.conversation.begin_fetch();
        let api = Arc::clone(&self.api);
        self.spawn_call(async move {
            let result = api.fetch_messages(&conversation_id).await;
            Command::MessagesFetched {
                conversation_id,
                ticket,
                silent,
                result,
            }
        });
    }

    /// Silent re-fetch of everything on screen
    fn resync(&mut self) {
        self.refresh_chat_list();
        if let Some(id) = self.conversation.active_id().cloned() {
            self.fetch_messages(id, true);
        }
    }

    fn on_chat_list(&mut self, ticket: FetchTicket, result: Result<Vec<ConversationSummary>>) {
        self.list_in_flight = false;
        match result {
            Ok(list) => {
                debug!("Fetched {} conversations", list.len());
                self.chats.upsert_from_fetch(ticket, list);
                for (id, url) in &self.profile_pics {
                    self.chats.set_profile_pic(id, url.clone());
                }
                self.publish(ViewUpdate::ChatList);
            }
            Err(e) => warn!("Chat list fetch failed: {}", e),
        }
        if self.list_queued {
            self.list_queued = false;
            self.refresh_chat_list();
        }
    }

    fn on_messages(
        &mut self,
        conversation_id: ConversationId,
        ticket: MessageTicket,
        silent: bool,
        result: Result<Vec<Message>>,
    ) {
        let messages = match result {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Message fetch for {} failed: {}", conversation_id, e);
                if !silent && self.conversation.is_open(&conversation_id) {
                    self.publish(ViewUpdate::Notice(Notice::warning("Could not load messages")));
                }
                return;
            }
        };
        if !self.conversation.is_open(&conversation_id) {
            debug!("Discarding messages for {} - conversation switched", conversation_id);
            return;
        }
        for message in &messages {
            self.dispatcher.remember(&message.id);
        }
        self.conversation.refresh(conversation_id.clone(), ticket, messages);
        self.publish(ViewUpdate::Conversation(conversation_id.clone()));

        let unread = self.chats.get(&conversation_id).map_or(0, |c| c.unread);
        if unread > 0 {
            self.schedule_read_ack(conversation_id);
        }
    }

    fn open_conversation(&mut self, id: ConversationId) {
        if self.conversation.is_open(&id) {
            self.fetch_messages(id, true);
            return;
        }
        self.read_state.cancel();
        self.owed_read_ack = None;
        info!("Opening conversation {}", id);
        self.conversation.open(id.clone());
        self.publish(ViewUpdate::Conversation(id.clone()));
        self.fetch_messages(id.clone(), false);
        self.load_profile_pic(id);
    }

    fn close_conversation(&mut self) {
        self.read_state.cancel();
        self.owed_read_ack = None;
        if let Some(id) = self.conversation.active_id().cloned() {
            debug!("Closing conversation {}", id);
            self.conversation.close();
            self.publish(ViewUpdate::Conversation(id));
        }
    }

    fn schedule_read_ack(&mut self, id: ConversationId) {
        if !self.connection.is_visible() {
            self.owed_read_ack = Some(id);
            return;
        }
        self.owed_read_ack = None;
        let commands = self.commands.clone();
        self.read_state.schedule_mark_read(id, move |generation| {
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::ReadAckDue { generation });
            }
        });
    }

    fn on_read_ack_due(&mut self, generation: u64) {
        let Some(conversation_id) = self
            .read_state
            .take_due(generation, self.conversation.active_id())
        else {
            return;
        };
        let stamp = self.chats.begin_read();
        let api = Arc::clone(&self.api);
        self.spawn_call(async move {
            let result = api.mark_as_read(&conversation_id).await;
            Command::ReadAckSent {
                conversation_id,
                stamp,
                result,
            }
        });
    }

    fn send_text(&mut self, text: String, reply_to: Option<MessageId>) -> Result<MessageId> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Send("message is empty".to_string()));
        }
        let handle = self
            .conversation
            .append_optimistic(text, reply_to.clone())
            .ok_or_else(|| ChatError::Send("no conversation is open".to_string()))?;

        if let Some(optimistic) = self.conversation.get(&handle.local_id) {
            self.chats
                .bump_for_incoming_message(&handle.conversation_id, optimistic, true);
        }
        self.publish(ViewUpdate::Conversation(handle.conversation_id.clone()));
        self.publish(ViewUpdate::ChatList);

        self.post_message(handle.conversation_id, handle.local_id.clone(), handle.text, reply_to);
        Ok(handle.local_id)
    }

    fn post_message(
        &self,
        conversation_id: ConversationId,
        local_id: MessageId,
        text: String,
        reply_to: Option<MessageId>,
    ) {
        let api = Arc::clone(&self.api);
        self.spawn_call(async move {
            let result = api
                .send_message(&conversation_id, &text, reply_to.as_ref())
                .await;
            Command::SendCompleted {
                conversation_id,
                local_id,
                result,
            }
        });
    }

    fn retry_send(&mut self, local_id: &MessageId) -> Result<()> {
        let message = self
            .conversation
            .get(local_id)
            .filter(|m| m.is_optimistic() && m.send_failed)
            .ok_or_else(|| ChatError::Send(format!("nothing to retry for {}", local_id)))?;
        let MessageContent::Text { body } = &message.content else {
            return Err(ChatError::Send(format!("{} is not a text message", local_id)));
        };
        let (conversation_id, text, reply_to) =
            (message.conversation_id.clone(), body.clone(), message.reply_to.clone());

        info!("Retrying send of {}", local_id);
        self.conversation.mark_send_failed(local_id, false);
        self.publish(ViewUpdate::Conversation(conversation_id.clone()));
        self.post_message(conversation_id, local_id.clone(), text, reply_to);
        Ok(())
    }

    fn on_send_completed(
        &mut self,
        conversation_id: ConversationId,
        local_id: MessageId,
        result: Result<Option<Message>>,
    ) {
        let is_open = self.conversation.is_open(&conversation_id);
        match result {
            Ok(Some(echo)) => {
                self.dispatcher.remember(&echo.id);
                if self.chats.replace_preview_message(&local_id, &echo) {
                    self.publish(ViewUpdate::ChatList);
                }
                if !is_open {
                    return;
                }
                match self.conversation.reconcile_with(Some(&local_id), echo.clone()) {
                    Reconciled::Replaced(local) => {
                        if local != local_id && self.chats.replace_preview_message(&local, &echo) {
                            self.publish(ViewUpdate::ChatList);
                        }
                    }
                    Reconciled::Appended => debug!("Send echo {} had no pending match", echo.id),
                    Reconciled::Ignored => {}
                }
                self.publish(ViewUpdate::Conversation(conversation_id));
            }
            Ok(None) => {
                // Confirmation will come as message_sent
                debug!("Send of {} accepted without echo", local_id);
            }
            Err(e) => {
                warn!("Send of {} to {} failed: {}", local_id, conversation_id, e);
                if is_open && self.conversation.mark_send_failed(&local_id, true) {
                    self.publish(ViewUpdate::Conversation(conversation_id));
                }
                self.publish(ViewUpdate::Notice(Notice::error(format!(
                    "Message not sent: {}",
                    e
                ))));
            }
        }
    }

    fn send_file(&mut self, file: OutgoingFile, reply: oneshot::Sender<Result<()>>) {
        let Some(conversation_id) = self.conversation.active_id().cloned() else {
            let _ = reply.send(Err(ChatError::Send("no conversation is open".to_string())));
            return;
        };
        info!(
            "Uploading {} ({} bytes) to {}",
            file.file_name,
            file.bytes.len(),
            conversation_id
        );
        let api = Arc::clone(&self.api);
        self.spawn_call(async move {
            let file_name = file.file_name.clone();
            let result = api.send_file(&conversation_id, file).await;
            Command::FileSent {
                conversation_id,
                file_name,
                result,
                reply,
            }
        });
    }

    fn set_visible(&mut self, visible: bool) {
        if self.connection.set_visible(visible) {
            self.publish_connection();
        }
        if !visible {
            if let Some(id) = self.read_state.pending_target() {
                self.owed_read_ack = Some(id.clone());
            }
            self.read_state.cancel();
            return;
        }
        let owed = self.owed_read_ack.take();
        if let Some(id) = self.conversation.active_id().cloned() {
            if owed.as_ref() == Some(&id) || self.chats.get(&id).is_some_and(|c| c.unread > 0) {
                self.schedule_read_ack(id);
            }
        }
    }

    fn load_profile_pic(&mut self, id: ConversationId) {
        if let Some(cached) = self.profile_pics.get(&id) {
            if self.chats.set_profile_pic(&id, cached.clone()) {
                self.publish(ViewUpdate::ChatList);
            }
            return;
        }
        if !self.pics_in_flight.insert(id.clone()) {
            return;
        }
        let api = Arc::clone(&self.api);
        self.spawn_call(async move {
            let result = api.profile_pic(&id).await;
            Command::ProfilePicFetched {
                conversation_id: id,
                result,
            }
        });
    }

    fn on_link(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened { session } => {
                let Some(outcome) = self.connection.handle_opened(session) else {
                    return;
                };
                self.publish_connection();
                if outcome.resync {
                    info!("Push reconnected, re-fetching to repair missed state");
                    self.resync();
                }
            }
            LinkEvent::Frame { session, payload } => {
                if !self.connection.is_current(session) {
                    debug!("Dropping frame from stale session {}", session);
                    return;
                }
                let outcome = self.dispatcher.dispatch_frame(
                    &payload,
                    Utc::now(),
                    &mut self.chats,
                    &mut self.conversation,
                );
                self.apply_outcome(outcome);
            }
            LinkEvent::Failed { session, reason } => {
                if self.connection.handle_failed(session, &reason).is_some() {
                    self.publish_connection();
                }
            }
            LinkEvent::ReconnectDue { generation } => {
                if self.connection.handle_reconnect_due(generation) {
                    self.publish_connection();
                }
            }
            LinkEvent::PollTick { generation } => {
                if self.connection.handle_poll_tick(generation) {
                    debug!("Fallback poll");
                    self.resync();
                }
            }
        }
    }

    fn apply_outcome(&mut self, outcome: DispatchOutcome) {
        if outcome.chat_list_changed {
            self.publish(ViewUpdate::ChatList);
        }
        if outcome.conversation_changed {
            self.publish_conversation();
        }
        if outcome.refresh_chat_list {
            self.refresh_chat_list();
        }
        if let Some(id) = outcome.mark_read {
            self.schedule_read_ack(id);
        }
    }

    fn snapshot(&self) -> ChatView {
        ChatView {
            conversations: self.chats.conversations().cloned().collect(),
            open: self.conversation.active_id().cloned(),
            messages: self.conversation.messages().to_vec(),
            messages_loaded: self.conversation.is_loaded(),
            total_unread: self.chats.total_unread(),
            connection: self.connection.status(),
        }
    }

    fn teardown(&mut self) {
        self.read_state.cancel();
        self.connection.shutdown();
        self.publish_connection();
    }
}
