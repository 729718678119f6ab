//! Routes push events into the chat list and conversation stores
use crate::chat_list::ChatListStore;
use crate::conversation::{ConversationStore, Reconciled};
use crate::events::PushEvent;
use crate::models::{ConversationId, Message, MessageId};
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

/// What applying one event changed, for the engine to act on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub chat_list_changed: bool,
    pub conversation_changed: bool,
    /// The event asks for a silent chat-list re-fetch
    pub refresh_chat_list: bool,
    /// Activity in the open conversation; schedule a read ack for it
    pub mark_read: Option<ConversationId>,
    /// The event repeated something already applied and was dropped
    pub duplicate: bool,
}

impl DispatchOutcome {
    pub fn is_noop(&self) -> bool {
        *self == DispatchOutcome::default()
    }
}

/// Applies events strictly in the order given
#[derive(Debug)]
pub struct EventDispatcher {
    seen: HashSet<MessageId>,
    order: VecDeque<MessageId>,
    capacity: usize,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record an id that reached the stores by some other route (a send
    /// echo, a fetch)
    pub fn remember(&mut self, id: &MessageId) {
        if !self.seen.insert(id.clone()) {
            return;
        }
        self.order.push_back(id.clone());
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
    }

    pub fn has_seen(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    /// Decode and apply one frame payload. Malformed payloads are logged and
    /// dropped.
    pub fn dispatch_frame(
        &mut self,
        payload: &str,
        now: DateTime<Utc>,
        chats: &mut ChatListStore,
        conversation: &mut ConversationStore,
    ) -> DispatchOutcome {
        match PushEvent::parse(payload, now) {
            Ok(event) => self.dispatch(event, chats, conversation),
            Err(e) => {
                warn!("Dropping malformed push payload: {}", e);
                DispatchOutcome::default()
            }
        }
    }

    pub fn dispatch(
        &mut self,
        event: PushEvent,
        chats: &mut ChatListStore,
        conversation: &mut ConversationStore,
    ) -> DispatchOutcome {
        debug!("Push event: {}", event.kind());
        match event {
            PushEvent::Connected => {
                info!("Push subscription confirmed");
                DispatchOutcome::default()
            }
            PushEvent::NewMessage(message) => self.apply_new_message(message, chats, conversation),
            PushEvent::MessageSent(message) => self.apply_sent(message, chats, conversation),
            PushEvent::MessageAck {
                message_id,
                conversation_id,
                status,
            } => {
                let in_open = conversation_id
                    .as_ref()
                    .map_or(true, |c| conversation.is_open(c));
                DispatchOutcome {
                    conversation_changed: in_open
                        && conversation.update_ack_status(&message_id, status),
                    chat_list_changed: chats.update_preview_status(&message_id, status),
                    ..Default::default()
                }
            }
            PushEvent::ChatUpdate => DispatchOutcome {
                refresh_chat_list: true,
                ..Default::default()
            },
            PushEvent::Unknown { kind } => {
                debug!("Ignoring push event of unknown type '{}'", kind);
                DispatchOutcome::default()
            }
        }
    }

    fn apply_new_message(
        &mut self,
        message: Message,
        chats: &mut ChatListStore,
        conversation: &mut ConversationStore,
    ) -> DispatchOutcome {
        let conversation_id = message.conversation_id.clone();
        let is_open = conversation.is_open(&conversation_id);

        if (is_open && conversation.contains(&message.id)) || self.has_seen(&message.id) {
            debug!("Duplicate new_message {} dropped", message.id);
            return DispatchOutcome {
                duplicate: true,
                ..Default::default()
            };
        }
        self.remember(&message.id);

        chats.bump_for_incoming_message(&conversation_id, &message, is_open);

        let mut outcome = DispatchOutcome {
            chat_list_changed: true,
            ..Default::default()
        };
        if is_open {
            let inbound = !message.is_outbound();
            // An outbound new_message may be the echo of our own optimistic send
            if let Reconciled::Replaced(local) = conversation.reconcile(message.clone()) {
                chats.replace_preview_message(&local, &message);
            }
            outcome.conversation_changed = true;
            if inbound {
                outcome.mark_read = Some(conversation_id);
            }
        }
        outcome
    }

    fn apply_sent(
        &mut self,
        message: Message,
        chats: &mut ChatListStore,
        conversation: &mut ConversationStore,
    ) -> DispatchOutcome {
        let conversation_id = message.conversation_id.clone();
        let is_open = conversation.is_open(&conversation_id);
        let first_sighting = !self.has_seen(&message.id);
        self.remember(&message.id);

        let mut outcome = DispatchOutcome::default();
        if is_open {
            let before = conversation.get(&message.id).map(|m| m.status);
            match conversation.reconcile(message.clone()) {
                Reconciled::Replaced(local) => {
                    chats.replace_preview_message(&local, &message);
                    outcome.conversation_changed = true;
                    outcome.chat_list_changed = true;
                    return outcome;
                }
                Reconciled::Appended => outcome.conversation_changed = true,
                Reconciled::Ignored => {
                    let after = conversation.get(&message.id).map(|m| m.status);
                    outcome.conversation_changed = before.is_some() && after != before;
                }
            }
        }

        if first_sighting {
            chats.bump_for_incoming_message(&conversation_id, &message, is_open);
            outcome.chat_list_changed = true;
        } else {
            outcome.duplicate = !outcome.conversation_changed;
            outcome.chat_list_changed = chats.update_preview_status(&message.id, message.status);
        }
        outcome
    }
}
