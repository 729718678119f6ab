//! The open conversation's message sequence
//!
//! Messages are kept in display order. Fetches replace the sequence;
//! everything else appends at the tail, including late arrivals whose
//! timestamp is older than the tail.
use crate::models::{AckStatus, ConversationId, Direction, Message, MessageContent, MessageId};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Identifies an optimistic message until its echo arrives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticHandle {
    pub local_id: MessageId,
    pub conversation_id: ConversationId,
    pub text: String,
}

/// What `reconcile` did with a server message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// Took the place of the optimistic message with this local id
    Replaced(MessageId),
    Appended,
    /// Already present (status may have advanced) or not for this conversation
    Ignored,
}

/// Logical time at which a message fetch was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MessageTicket(u64);

/// Row of the rendered conversation
#[derive(Debug, Clone, PartialEq)]
pub enum RenderItem<'a> {
    DateSeparator(NaiveDate),
    Message(&'a Message),
}

#[derive(Debug)]
pub struct ConversationStore {
    active: Option<ConversationId>,
    loaded: bool,
    messages: Vec<Message>,
    /// Clock value at which each message entered the store
    inserted_at: HashMap<MessageId, u64>,
    clock: u64,
    match_window: Duration,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

impl ConversationStore {
    pub fn new(match_window: Duration) -> Self {
        Self {
            active: None,
            loaded: false,
            messages: Vec::new(),
            inserted_at: HashMap::new(),
            clock: 0,
            match_window,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub fn active_id(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn is_open(&self, id: &ConversationId) -> bool {
        self.active.as_ref() == Some(id)
    }

    /// Whether a fetch result has been applied since the conversation opened
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Switch to `id` with an empty sequence; the fetch fills it in
    pub fn open(&mut self, id: ConversationId) {
        self.active = Some(id);
        self.loaded = false;
        self.messages.clear();
        self.inserted_at.clear();
    }

    pub fn close(&mut self) {
        self.active = None;
        self.loaded = false;
        self.messages.clear();
        self.inserted_at.clear();
    }

    pub fn begin_fetch(&mut self) -> MessageTicket {
        MessageTicket(self.tick())
    }

    fn push(&mut self, message: Message) {
        let now = self.tick();
        self.inserted_at.insert(message.id.clone(), now);
        self.messages.push(message);
    }

    /// Replace the sequence with `messages`, sorted ascending by timestamp.
    /// Duplicate ids collapse into one entry carrying the furthest status.
    pub fn load(&mut self, id: ConversationId, mut messages: Vec<Message>) {
        self.active = Some(id);
        self.loaded = true;
        self.messages.clear();
        self.inserted_at.clear();

        messages.sort_by_key(|m| m.timestamp);
        let mut index: HashMap<MessageId, usize> = HashMap::new();
        for message in messages {
            match index.get(&message.id) {
                Some(&pos) => {
                    self.messages[pos].status.advance(message.status);
                }
                None => {
                    index.insert(message.id.clone(), self.messages.len());
                    self.push(message);
                }
            }
        }
    }

    /// Apply a fetch issued at `ticket` without losing local state: optimistic
    /// messages and anything that arrived after the ticket are carried over
    /// when the fetch does not contain them, and no status goes backwards.
    pub fn refresh(&mut self, id: ConversationId, ticket: MessageTicket, messages: Vec<Message>) {
        if !self.is_open(&id) {
            debug!("Dropping messages for {} - no longer open", id);
            return;
        }

        let previous = std::mem::take(&mut self.messages);
        let previous_inserted = std::mem::take(&mut self.inserted_at);
        self.load(id, messages);

        for old in previous {
            if let Some(pos) = self.position(&old.id) {
                self.messages[pos].status.advance(old.status);
                continue;
            }
            if old.is_optimistic() {
                if let Some(pos) = self.find_echo_for(&old) {
                    debug!("Fetched history already contains optimistic {}", old.id);
                    self.messages[pos].status.advance(AckStatus::Sent);
                    continue;
                }
                self.push(old);
                continue;
            }
            let arrived_after = previous_inserted
                .get(&old.id)
                .is_some_and(|at| *at > ticket.0);
            if arrived_after {
                self.push(old);
            }
        }
    }

    /// Append an outbound pending message for `text`
    pub fn append_optimistic(&mut self, text: &str, reply_to: Option<MessageId>) -> Option<OptimisticHandle> {
        let conversation_id = self.active.clone()?;
        let local_id = MessageId::local();
        self.push(Message {
            id: local_id.clone(),
            conversation_id: conversation_id.clone(),
            direction: Direction::Outbound,
            content: MessageContent::text(text),
            status: AckStatus::Pending,
            timestamp: Utc::now(),
            reply_to,
            send_failed: false,
        });
        Some(OptimisticHandle {
            local_id,
            conversation_id,
            text: text.to_string(),
        })
    }

    /// Fold a server-confirmed message in, matching optimistic entries by
    /// content and time
    pub fn reconcile(&mut self, server: Message) -> Reconciled {
        self.reconcile_with(None, server)
    }

    /// Like [`reconcile`](Self::reconcile) but tries the optimistic message
    /// `handle` first, as when the send call itself returned the echo
    pub fn reconcile_with(&mut self, handle: Option<&MessageId>, server: Message) -> Reconciled {
        if !self.is_open(&server.conversation_id) {
            return Reconciled::Ignored;
        }

        if let Some(pos) = self.position(&server.id) {
            self.messages[pos].status.advance(server.status);
            return Reconciled::Ignored;
        }

        if server.is_outbound() {
            let slot = handle
                .and_then(|h| self.position(h))
                .filter(|&pos| {
                    let m = &self.messages[pos];
                    m.is_optimistic() && m.status == AckStatus::Pending
                })
                .or_else(|| self.find_optimistic_for(&server));

            if let Some(pos) = slot {
                let local_id = self.messages[pos].id.clone();
                let mut confirmed = server;
                confirmed.status.advance(AckStatus::Sent);
                if confirmed.reply_to.is_none() {
                    confirmed.reply_to = self.messages[pos].reply_to.clone();
                }
                self.inserted_at.remove(&local_id);
                let now = self.tick();
                self.inserted_at.insert(confirmed.id.clone(), now);
                self.messages[pos] = confirmed;
                return Reconciled::Replaced(local_id);
            }
        }

        self.push(server);
        Reconciled::Appended
    }

    /// Advance a message's status; lower levels are ignored
    pub fn update_ack_status(&mut self, id: &MessageId, status: AckStatus) -> bool {
        match self.position(id) {
            Some(pos) => self.messages[pos].status.advance(status),
            None => false,
        }
    }

    pub fn mark_send_failed(&mut self, id: &MessageId, failed: bool) -> bool {
        match self.position(id) {
            Some(pos) if self.messages[pos].is_optimistic() => {
                self.messages[pos].send_failed = failed;
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.position(id).map(|pos| &self.messages[pos])
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages interleaved with a separator wherever the calendar day (in
    /// `tz`) changes
    pub fn render_items<Tz: TimeZone>(&self, tz: &Tz) -> Vec<RenderItem<'_>> {
        render_items(&self.messages, tz)
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    fn within_window(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        (a - b)
            .abs()
            .to_std()
            .map(|d| d <= self.match_window)
            .unwrap_or(false)
    }

    /// Oldest pending optimistic message with the same text as `server`
    fn find_optimistic_for(&self, server: &Message) -> Option<usize> {
        let key = server.content.match_key()?;
        self.messages.iter().position(|m| {
            m.is_optimistic()
                && m.status == AckStatus::Pending
                && m.content.match_key() == Some(key)
                && self.within_window(m.timestamp, server.timestamp)
        })
    }

    /// Confirmed outbound message that `optimistic` turned into
    fn find_echo_for(&self, optimistic: &Message) -> Option<usize> {
        let key = optimistic.content.match_key()?;
        self.messages.iter().position(|m| {
            !m.is_optimistic()
                && m.is_outbound()
                && m.content.match_key() == Some(key)
                && self.within_window(m.timestamp, optimistic.timestamp)
        })
    }
}

/// Interleave `messages` with a [`RenderItem::DateSeparator`] at each change
/// of calendar day in `tz`
pub fn render_items<'a, Tz: TimeZone>(messages: &'a [Message], tz: &Tz) -> Vec<RenderItem<'a>> {
    let mut items = Vec::with_capacity(messages.len() + 4);
    let mut current: Option<NaiveDate> = None;
    for message in messages {
        let day = message.timestamp.with_timezone(tz).date_naive();
        if current != Some(day) {
            items.push(RenderItem::DateSeparator(day));
            current = Some(day);
        }
        items.push(RenderItem::Message(message));
    }
    items
}

/// Label for a date separator relative to `today`
pub fn separator_label(day: NaiveDate, today: NaiveDate) -> String {
    match (today - day).num_days() {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => day.format("%A").to_string(),
        _ => day.format("%d/%m/%Y").to_string(),
    }
}
