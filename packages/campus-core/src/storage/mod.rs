//! # Storage Module
//!
//! Persistent message store for direct messages, chat groups and group
//! messages.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │  MessageStore (trait)                                           │    │
//! │  │  ────────────────────                                           │    │
//! │  │  What the relay's session handler and REST layer depend on.     │    │
//! │  │  Injected as Arc<dyn MessageStore>; tests swap in fakes.        │    │
//! │  └───────────────────────────────┬─────────────────────────────────┘    │
//! │                                  │                                      │
//! │  ┌───────────────────────────────▼─────────────────────────────────┐    │
//! │  │  Database (SQLite via rusqlite)                                 │    │
//! │  │  ──────────────────────────────                                 │    │
//! │  │  • direct_messages                                              │    │
//! │  │  • chat_groups / chat_group_members                             │    │
//! │  │  • group_messages / group_message_reads                         │    │
//! │  │                                                                 │    │
//! │  │  File-backed in production, in-memory for tests.                │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Methods are synchronous. Async callers run them on a blocking thread.

mod database;
mod schema;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

pub use database::Database;
pub use schema::SCHEMA_VERSION;

use crate::error::Result;
use crate::models::{
    ChatGroup, DirectMessage, GroupId, GroupMessage, MessageId, PostedGroupMessage, StoreStats,
    UnreadSummary, UserId,
};

/// Persistence operations the messaging service needs.
pub trait MessageStore: Send + Sync {
    // ── Direct messages ──────────────────────────────────────────────────

    /// Store a direct message. The returned row has its id assigned and
    /// `read = false`.
    fn insert_direct_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<DirectMessage>;

    /// Messages exchanged between two users in either direction, oldest
    /// first. With a limit, the most recent `limit` of them.
    fn get_messages_between_users(
        &self,
        a: UserId,
        b: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<DirectMessage>>;

    /// The recipient's view of a conversation: the same page as
    /// [`get_messages_between_users`](Self::get_messages_between_users),
    /// with the peer's messages on that page marked read in the same
    /// transaction. Rows are returned as they were before marking.
    fn read_conversation(
        &self,
        reader: UserId,
        peer: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<DirectMessage>>;

    /// Mark one message read. Returns false if it already was.
    fn mark_message_as_read(&self, message_id: MessageId) -> Result<bool>;

    /// Mark every unread message from `peer` to `reader` as read.
    fn mark_conversation_read(&self, reader: UserId, peer: UserId) -> Result<usize>;

    fn unread_summary(&self, user_id: UserId) -> Result<UnreadSummary>;

    // ── Groups ───────────────────────────────────────────────────────────

    /// Create a group. The creator is always added to the member set.
    fn create_chat_group(
        &self,
        name: &str,
        creator_id: UserId,
        members: &BTreeSet<UserId>,
        created_at: DateTime<Utc>,
    ) -> Result<ChatGroup>;

    fn get_chat_group(&self, group_id: GroupId) -> Result<Option<ChatGroup>>;

    fn groups_for_user(&self, user_id: UserId) -> Result<Vec<ChatGroup>>;

    fn add_group_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<ChatGroup>;

    fn remove_group_member(&self, group_id: GroupId, user_id: UserId) -> Result<ChatGroup>;

    // ── Group messages ───────────────────────────────────────────────────

    /// Check membership, store the message with `readBy = {sender}`, and
    /// snapshot the member set, all under one transaction.
    fn post_group_message(
        &self,
        group_id: GroupId,
        sender_id: UserId,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<PostedGroupMessage>;

    /// Group messages oldest first. With a limit, the most recent `limit`.
    fn get_messages_by_chat_group(
        &self,
        group_id: GroupId,
        limit: Option<usize>,
    ) -> Result<Vec<GroupMessage>>;

    /// Add `user_id` to `readBy` of every message in the group.
    fn mark_group_read(
        &self,
        group_id: GroupId,
        user_id: UserId,
        read_at: DateTime<Utc>,
    ) -> Result<usize>;

    fn stats(&self) -> Result<StoreStats>;
}
