//! Chat Sync Core - real-time chat synchronization for the reseller console
//!
//! Keeps a chat list and the open conversation consistent across an initial
//! REST fetch, Server-Sent Events pushed by the WhatsApp gateway, and local
//! optimistic sends. Survives push failures with exponential backoff and
//! falls back to polling when the push channel stays down.

pub mod error;
pub mod config;
pub mod models;
pub mod wire;
pub mod events;
pub mod sse;
pub mod timer;
pub mod transport;
pub mod api;
pub mod chat_list;
pub mod conversation;
pub mod read_state;
pub mod dispatcher;
pub mod connection;
pub mod sync;

pub use api::{ChatApi, HttpChatApi};
pub use config::Config;
pub use connection::{ConnectionStatus, LinkState};
pub use error::{ChatError, Result};
pub use events::PushEvent;
pub use models::{AckStatus, Conversation, ConversationId, Direction, Message, MessageContent, MessageId, OutgoingFile};
pub use sync::{ChatSync, ChatSyncHandle, ChatView, Notice, NoticeLevel, ViewUpdate};
pub use transport::{PushTransport, SseTransport};
