//! Chat list: every conversation with its preview, unread count and position
//!
//! Fetch results and push events arrive in no particular order relative to
//! each other. Each fetch is issued under a [`FetchTicket`] from the store's
//! logical clock; local mutations are stamped with the same clock, so a merge
//! can tell which local state is newer than the fetched snapshot.
use std::collections::HashSet;

use crate::models::{AckStatus, Conversation, ConversationId, ConversationSummary, Message, MessageId, Preview};

/// Logical time at which a fetch was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

/// Logical time at which a read acknowledgement was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReadStamp(u64);

#[derive(Debug, Clone)]
struct Entry {
    conversation: Conversation,
    /// Clock value of the last push bump
    bumped_at: u64,
    /// Clock value of the last confirmed read
    read_at: u64,
}

#[derive(Debug, Default)]
pub struct ChatListStore {
    entries: Vec<Entry>,
    clock: u64,
}

impl ChatListStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Stamp a fetch that is about to be issued
    pub fn begin_fetch(&mut self) -> FetchTicket {
        FetchTicket(self.tick())
    }

    /// Stamp a read acknowledgement that is about to be sent
    pub fn begin_read(&mut self) -> ReadStamp {
        ReadStamp(self.tick())
    }

    fn position(&self, id: &ConversationId) -> Option<usize> {
        self.entries.iter().position(|e| &e.conversation.id == id)
    }

    /// Merge a fetched list.
    ///
    /// Known conversations are updated in place: preview and activity come
    /// from whichever side is newer; the unread count keeps a read confirmed
    /// after `ticket`, takes the max with pushes received after `ticket`, and
    /// otherwise follows the server. Unknown ones are appended in fetch
    /// order. Nothing is removed. The list is then re-sorted by activity.
    pub fn upsert_from_fetch(&mut self, ticket: FetchTicket, list: Vec<ConversationSummary>) {
        let mut seen = HashSet::new();
        for summary in list {
            if !seen.insert(summary.id.clone()) {
                continue;
            }
            match self.position(&summary.id) {
                Some(idx) => {
                    let entry = &mut self.entries[idx];
                    let conv = &mut entry.conversation;

                    conv.unread = if entry.read_at > ticket.0 {
                        conv.unread
                    } else if entry.bumped_at > ticket.0 {
                        conv.unread.max(summary.unread)
                    } else {
                        summary.unread
                    };

                    if !summary.name.is_empty() {
                        conv.name = summary.name;
                    }
                    if summary.timestamp >= conv.last_activity {
                        conv.last_activity = summary.timestamp;
                        if let Some(msg) = &summary.last_message {
                            conv.preview = Some(Preview::from_message(msg));
                        }
                    }
                }
                None => {
                    self.entries.push(Entry {
                        conversation: Conversation {
                            preview: summary.last_message.as_ref().map(Preview::from_message),
                            id: summary.id,
                            name: summary.name,
                            last_activity: summary.timestamp,
                            unread: summary.unread,
                            profile_pic_url: None,
                        },
                        bumped_at: 0,
                        read_at: 0,
                    });
                }
            }
        }

        // Stable: equal timestamps keep their current relative order
        self.entries
            .sort_by(|a, b| b.conversation.last_activity.cmp(&a.conversation.last_activity));
    }

    /// Apply a pushed or sent message: refresh the preview and activity, move
    /// the conversation to the head, and count it as unread unless the
    /// conversation is open or the message is our own.
    pub fn bump_for_incoming_message(&mut self, id: &ConversationId, message: &Message, is_open: bool) {
        let now = self.tick();
        let mut entry = match self.position(id) {
            Some(idx) => self.entries.remove(idx),
            None => Entry {
                conversation: Conversation::discovered(id.clone(), message.timestamp),
                bumped_at: 0,
                read_at: 0,
            },
        };

        let conv = &mut entry.conversation;
        conv.preview = Some(Preview::from_message(message));
        if message.timestamp > conv.last_activity {
            conv.last_activity = message.timestamp;
        }
        if !is_open && !message.is_outbound() {
            conv.unread = conv.unread.saturating_add(1);
            entry.bumped_at = now;
        }

        self.entries.insert(0, entry);
    }

    /// Zero the unread count after a read acknowledgement went through.
    ///
    /// Messages pushed after `stamp` were not covered by the acknowledgement,
    /// so a bump newer than the stamp leaves the count alone.
    pub fn mark_read(&mut self, id: &ConversationId, stamp: ReadStamp) -> bool {
        let now = self.tick();
        match self.position(id) {
            Some(idx) => {
                let entry = &mut self.entries[idx];
                if entry.bumped_at > stamp.0 {
                    return false;
                }
                entry.read_at = now;
                let changed = entry.conversation.unread != 0;
                entry.conversation.unread = 0;
                changed
            }
            None => false,
        }
    }

    /// Advance the preview icon of whichever conversation previews `message`
    pub fn update_preview_status(&mut self, message: &MessageId, status: AckStatus) -> bool {
        self.entries
            .iter_mut()
            .filter_map(|e| e.conversation.preview.as_mut())
            .filter(|p| &p.message_id == message)
            .any(|p| match p.status.as_mut() {
                Some(current) => current.advance(status),
                None => false,
            })
    }

    /// Swap an optimistic id in the preview for the confirmed one
    pub fn replace_preview_message(&mut self, local: &MessageId, confirmed: &Message) -> bool {
        for entry in &mut self.entries {
            if let Some(preview) = entry.conversation.preview.as_mut() {
                if &preview.message_id == local {
                    *preview = Preview::from_message(confirmed);
                    return true;
                }
            }
        }
        false
    }

    pub fn set_profile_pic(&mut self, id: &ConversationId, url: Option<String>) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.entries[idx].conversation.profile_pic_url = url;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.entries
            .iter()
            .map(|e| &e.conversation)
            .find(|c| &c.id == id)
    }

    /// Conversations in display order
    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.entries.iter().map(|e| &e.conversation)
    }

    pub fn total_unread(&self) -> u32 {
        self.entries
            .iter()
            .fold(0u32, |acc, e| acc.saturating_add(e.conversation.unread))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
